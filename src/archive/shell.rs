//! Shells are copies of packages without their audiovisual objects. Logs, metadata and manifests
//! are copied, so a shell records everything about a package except the media itself.

use std::path::{Path, PathBuf};

use log::info;
use snafu::ResultExt;
use walkdir::WalkDir;

use crate::archive::consts::*;
use crate::archive::error::*;
use crate::archive::io::{copy, create_dir_all, file_name_str};

const MXF_EXTENSION: &str = "mxf";

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ShellOptions {
    /// Copy the objects that are not MXF files. AS-11 and DCP packages need these.
    pub keep_non_mxf: bool,
    /// Name the shell after the package instead of appending `_shell`
    pub copy_name: bool,
}

/// The directories at or beneath `input` whose name contains `prefix`. Directories beneath a match
/// are not searched.
pub fn shell_sources<P: AsRef<Path>>(input: P, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    let mut walker = WalkDir::new(input.as_ref()).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.context(WalkFileSnafu {})?;
        if entry.file_type().is_dir() && file_name_str(entry.path()).contains(prefix) {
            sources.push(entry.into_path());
            walker.skip_current_dir();
        }
    }

    Ok(sources)
}

/// Recreates the directory tree of `package` in `output` and copies every file except the ones in
/// an `objects` directory. Returns the path of the shell.
pub fn make_shell<P, O>(package: P, output: O, options: &ShellOptions) -> Result<PathBuf>
where
    P: AsRef<Path>,
    O: AsRef<Path>,
{
    let package = package.as_ref();
    let output = output.as_ref();
    if !output.is_dir() {
        return Err(Error::NotADirectory {
            path: output.into(),
        });
    }

    let name = file_name_str(package);
    let shell = if options.copy_name {
        output.join(name)
    } else {
        output.join(format!("{}{}", name, SHELL_SUFFIX))
    };
    if shell.exists() {
        return Err(Error::AlreadyExists { path: shell });
    }

    let mut skipped = 0;
    for entry in WalkDir::new(package).sort_by_file_name() {
        let entry = entry.context(WalkFileSnafu {})?;
        let relative = entry
            .path()
            .strip_prefix(package)
            .map_err(|_| Error::PathOutsideBase {
                path: entry.path().into(),
                base: package.into(),
            })?;
        let target = shell.join(relative);

        if entry.file_type().is_dir() {
            create_dir_all(&target)?;
        } else if keep_in_shell(relative, options) {
            copy(entry.path(), &target)?;
        } else {
            info!("Skipping {}", entry.path().display());
            skipped += 1;
        }
    }

    info!(
        "Created {} without {} object file(s)",
        shell.display(),
        skipped
    );
    Ok(shell)
}

fn keep_in_shell(relative: &Path, options: &ShellOptions) -> bool {
    let in_objects = relative.components().any(|c| c.as_os_str() == OBJECTS);
    if !in_objects {
        return true;
    }
    options.keep_non_mxf && !is_mxf(relative)
}

fn is_mxf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(MXF_EXTENSION))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::archive::error::Error;
    use crate::archive::shell::*;

    const UUID: &str = "0c2b3d1e-7b6c-4a55-9a2a-4f1b0a3c9d10";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn aip(root: &Path, name: &str) -> PathBuf {
        let container = root.join(name);
        let uuid_dir = container.join(UUID);
        write(&container.join(format!("{}_manifest.md5", UUID)), "md5");
        write(&container.join(format!("{}_manifest-sha512.txt", UUID)), "sha512");
        write(&uuid_dir.join("logs").join(format!("{}_sip_log.log", UUID)), "log");
        write(&uuid_dir.join("metadata/reel.mxf_mediainfo.xml"), "xml");
        write(&uuid_dir.join("objects/reel.mxf"), "video");
        write(&uuid_dir.join("objects/dcp/CPL.xml"), "cpl");
        fs::create_dir_all(uuid_dir.join("objects/empty")).unwrap();
        container
    }

    #[test]
    fn shell_drops_objects_and_keeps_everything_else() {
        let temp = TempDir::new().unwrap();
        let package = aip(&temp.path().join("in"), "aaa0001");
        let output = temp.path().join("out");
        fs::create_dir_all(&output).unwrap();

        let shell = make_shell(&package, &output, &ShellOptions::default()).unwrap();

        assert_eq!(output.join("aaa0001_shell"), shell);
        let uuid_dir = shell.join(UUID);
        assert!(shell.join(format!("{}_manifest.md5", UUID)).is_file());
        assert!(shell.join(format!("{}_manifest-sha512.txt", UUID)).is_file());
        assert!(uuid_dir.join("logs").join(format!("{}_sip_log.log", UUID)).is_file());
        assert!(uuid_dir.join("metadata/reel.mxf_mediainfo.xml").is_file());
        assert!(uuid_dir.join("objects/dcp").is_dir());
        assert!(uuid_dir.join("objects/empty").is_dir());
        assert!(!uuid_dir.join("objects/reel.mxf").exists());
        assert!(!uuid_dir.join("objects/dcp/CPL.xml").exists());
        assert!(package.join(UUID).join("objects/reel.mxf").is_file());
    }

    #[test]
    fn shell_keeps_non_mxf_objects_when_asked() {
        let temp = TempDir::new().unwrap();
        let package = aip(&temp.path().join("in"), "aaa0001");
        let output = temp.path().join("out");
        fs::create_dir_all(&output).unwrap();

        let shell = make_shell(
            &package,
            &output,
            &ShellOptions {
                keep_non_mxf: true,
                copy_name: true,
            },
        )
        .unwrap();

        assert_eq!(output.join("aaa0001"), shell);
        assert_eq!(
            "cpl",
            fs::read_to_string(shell.join(UUID).join("objects/dcp/CPL.xml")).unwrap()
        );
        assert!(!shell.join(UUID).join("objects/reel.mxf").exists());
    }

    #[test]
    fn shell_refuses_existing_destination() {
        let temp = TempDir::new().unwrap();
        let package = aip(&temp.path().join("in"), "aaa0001");
        let output = temp.path().join("out");
        fs::create_dir_all(output.join("aaa0001_shell")).unwrap();

        match make_shell(&package, &output, &ShellOptions::default()) {
            Err(Error::AlreadyExists { path }) => assert_eq!(output.join("aaa0001_shell"), path),
            other => panic!("expected an existing shell, got {:?}", other),
        }

        let missing = temp.path().join("missing");
        match make_shell(&package, &missing, &ShellOptions::default()) {
            Err(Error::NotADirectory { path }) => assert_eq!(missing, path),
            other => panic!("expected a missing output directory, got {:?}", other),
        }
    }

    #[test]
    fn sources_stop_at_matching_directories() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        aip(&root.join("batch"), "aaa0002");
        aip(&root.join("batch/nested"), "aaa0001");
        write(&root.join("batch/oe1234/objects/a.mov"), "a");

        let sources = shell_sources(root.join("batch"), "aaa").unwrap();

        assert_eq!(
            vec![root.join("batch/aaa0002"), root.join("batch/nested/aaa0001")],
            sources
        );
        assert_eq!(
            vec![root.join("batch/oe1234")],
            shell_sources(root.join("batch"), "oe").unwrap()
        );
    }
}
