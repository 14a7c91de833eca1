use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;
use snafu::ResultExt;
use walkdir::WalkDir;

use crate::archive::error::*;

/// Reads every line of a text file with its LF or CRLF terminator removed
pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path).context(IoReadSnafu { path })?);
    let mut lines = Vec::new();

    for line in reader.split(b'\n') {
        let mut line = line.context(IoReadSnafu { path })?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        lines.push(String::from_utf8(line).context(InvalidStringSnafu { path })?);
    }

    Ok(lines)
}

/// Replaces the contents of a file with the given lines, each terminated with LF
pub fn write_lines<P, S>(path: P, lines: &[S]) -> Result<()>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    let file = File::create(path).context(IoCreateSnafu { path })?;
    write_all(path, file, lines)
}

/// Appends lines to the end of a file, creating it if it does not exist
pub fn append_lines<P, S>(path: P, lines: &[S]) -> Result<()>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(IoCreateSnafu { path })?;
    write_all(path, file, lines)
}

pub fn append_line<P: AsRef<Path>>(path: P, line: &str) -> Result<()> {
    append_lines(path, &[line])
}

/// Moves a file or directory, failing if the destination already exists
pub fn rename<F: AsRef<Path>, T: AsRef<Path>>(from: F, to: T) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();
    if to.exists() {
        return Err(Error::AlreadyExists { path: to.into() });
    }
    info!("Moving {} to {}", from.display(), to.display());
    fs::rename(from, to).context(IoMoveSnafu { from, to })
}

pub fn copy<F: AsRef<Path>, T: AsRef<Path>>(from: F, to: T) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();
    info!("Copying {} to {}", from.display(), to.display());
    fs::copy(from, to)
        .map(|_| ())
        .context(IoCopySnafu { from, to })
}

/// Recursively copies the contents of `src_dir` into `dst_dir`, skipping hidden files
pub fn copy_dir<S: AsRef<Path>, D: AsRef<Path>>(src_dir: S, dst_dir: D) -> Result<()> {
    let src_dir = src_dir.as_ref();
    let dst_dir = dst_dir.as_ref();

    for file in WalkDir::new(src_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|f| f.depth() == 0 || !is_hidden_file(f.file_name()))
    {
        let file = file.context(WalkFileSnafu {})?;
        let relative = file
            .path()
            .strip_prefix(src_dir)
            .map_err(|_| Error::PathOutsideBase {
                path: file.path().into(),
                base: src_dir.into(),
            })?;
        let target = dst_dir.join(relative);

        if file.file_type().is_dir() {
            fs::create_dir_all(&target).context(IoCreateSnafu { path: &target })?;
        } else if file.file_type().is_file() {
            copy(file.path(), &target)?;
        } else {
            return Err(Error::UnsupportedFile {
                path: file.path().into(),
            });
        }
    }

    Ok(())
}

pub fn create_dir_all<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).context(IoCreateSnafu { path })
}

pub fn remove_dir_all<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Deleting {}", path.display());
    fs::remove_dir_all(path).context(IoDeleteSnafu { path })
}

pub fn remove_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Deleting {}", path.display());
    fs::remove_file(path).context(IoDeleteSnafu { path })
}

pub fn is_hidden_file(name: &OsStr) -> bool {
    name.to_str()
        .map(|name| name.starts_with('.') && name != "." && name != "..")
        .unwrap_or(false)
}

/// Returns the UTF-8 file name of the path, or an empty string if it has none
pub fn file_name_str(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Lists the immediate children of a directory, sorted by name
pub fn sorted_children<P: AsRef<Path>>(dir: P) -> Result<Vec<std::path::PathBuf>> {
    let dir = dir.as_ref();
    let mut children = Vec::new();
    for entry in fs::read_dir(dir).context(IoReadDirSnafu { path: dir })? {
        let entry = entry.context(IoReadDirSnafu { path: dir })?;
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}

fn write_all<S: AsRef<str>>(path: &Path, file: File, lines: &[S]) -> Result<()> {
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line.as_ref()).context(IoWriteSnafu { path })?;
    }
    writer.flush().context(IoWriteSnafu { path })
}
