//! Tidying of special collections deposits. A raw package is a deposited directory that has not
//! been packaged yet, so it has no UUID directory.

use std::path::{Path, PathBuf};

use log::{info, warn};
use snafu::ResultExt;
use walkdir::WalkDir;

use crate::archive::consts::*;
use crate::archive::encoding::clean_name;
use crate::archive::error::*;
use crate::archive::io::{file_name_str, remove_dir_all, remove_file, rename, sorted_children};
use crate::archive::manifest::remove_lines_containing;
use crate::archive::package::find_uuid_dir;
use crate::archive::validate::validate_manifest;

/// The directories in `source` that do not contain a UUID length entry
pub fn raw_packages<P: AsRef<Path>>(source: P) -> Result<Vec<PathBuf>> {
    let mut raw = Vec::new();
    for package in sorted_children(source)? {
        if !package.is_dir() {
            continue;
        }
        let has_uuid = sorted_children(&package)?
            .iter()
            .any(|child| file_name_str(child).len() == UUID_LEN);
        if has_uuid {
            info!("{} includes a UUID, skipping", package.display());
        } else {
            raw.push(package);
        }
    }
    info!("Found {} raw packages", raw.len());
    Ok(raw)
}

/// The directories in `source` that contain a UUID directory
pub fn aip_packages<P: AsRef<Path>>(source: P) -> Result<Vec<PathBuf>> {
    let mut aips = Vec::new();
    for package in sorted_children(source)? {
        if package.is_dir() && find_uuid_dir(&package)?.is_some() {
            aips.push(package);
        }
    }
    Ok(aips)
}

/// Moves each package into `output`, returning the new locations
pub fn move_packages<P: AsRef<Path>, O: AsRef<Path>>(packages: &[P], output: O) -> Result<Vec<PathBuf>> {
    let output = output.as_ref();
    let mut moved = Vec::with_capacity(packages.len());
    for package in packages {
        let package = package.as_ref();
        let target = output.join(file_name_str(package));
        rename(package, &target)?;
        moved.push(target);
    }
    Ok(moved)
}

/// Deletes `.DS_Store`, `Thumbs.db` and `desktop.ini` files. Returns the number deleted.
pub fn remove_junk_files<P: AsRef<Path>>(packages: &[P]) -> Result<usize> {
    let mut count = 0;
    for package in packages {
        for file in files_where(package.as_ref(), |name| JUNK_FILES.contains(&name))? {
            remove_file(&file)?;
            count += 1;
        }
    }
    info!("Removed {} junk files", count);
    Ok(count)
}

/// Strips junk file entries from every `_manifest.md5` in each package, then validates them.
/// Packages with at least one manifest and no failures are moved into `output`. Returns the
/// moved packages.
pub fn validate_raw_packages<P: AsRef<Path>, O: AsRef<Path>>(
    packages: &[P],
    output: O,
) -> Result<Vec<PathBuf>> {
    let output = output.as_ref();
    let mut moved = Vec::new();

    for package in packages {
        let package = package.as_ref();
        let manifests = files_where(package, |name| name.ends_with(MD5_MANIFEST_SUFFIX))?;

        let mut valid = !manifests.is_empty();
        for manifest in &manifests {
            remove_lines_containing(manifest, &JUNK_FILES)?;
            if !validate_manifest(manifest)?.is_valid() {
                warn!("{} failed validation", manifest.display());
                valid = false;
            }
        }

        if valid {
            let target = output.join(file_name_str(package));
            rename(package, &target)?;
            moved.push(target);
        } else if manifests.is_empty() {
            warn!("{} has no manifest to validate", package.display());
        }
    }

    Ok(moved)
}

/// Deletes every `_manifest.md5` and `.log` file beneath `dir`. Returns the number deleted.
pub fn remove_logs_and_manifests<P: AsRef<Path>>(dir: P) -> Result<usize> {
    let files = files_where(dir.as_ref(), |name| {
        name.ends_with(MD5_MANIFEST_SUFFIX) || name.ends_with(".log")
    })?;
    for file in &files {
        remove_file(file)?;
    }
    Ok(files.len())
}

/// Replaces special characters and spaces in the names of everything inside `pack` with `_`.
/// File extensions are kept. Returns the number of entries renamed.
pub fn sanitize_names<P: AsRef<Path>>(pack: P) -> Result<usize> {
    let mut entries = Vec::new();
    // Children come before their parents so that earlier renames do not invalidate later paths
    for entry in WalkDir::new(pack.as_ref())
        .min_depth(1)
        .contents_first(true)
        .sort_by_file_name()
    {
        let entry = entry.context(WalkFileSnafu {})?;
        entries.push((entry.file_type().is_dir(), entry.into_path()));
    }

    let mut count = 0;
    for (is_dir, path) in entries {
        if let Some(new_name) = clean_name(file_name_str(&path), &SANITIZE_TRIGGERS, !is_dir) {
            rename(&path, path.with_file_name(new_name))?;
            count += 1;
        }
    }
    Ok(count)
}

/// Drops special characters, replaces spaces with `_`, collapses runs of `_` and lower cases
pub fn sanitize_package_name(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| !PACKAGE_NAME_TRIGGERS.contains(c))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    UNDERSCORE_RUN.replace_all(&stripped, "_").to_lowercase()
}

/// Renames each package directory with `sanitize_package_name`. Returns the new paths.
pub fn rename_packages<P: AsRef<Path>>(packages: &[P]) -> Result<Vec<PathBuf>> {
    let mut renamed = Vec::with_capacity(packages.len());
    for package in packages {
        let package = package.as_ref();
        let name = sanitize_package_name(file_name_str(package));
        if name == file_name_str(package) {
            renamed.push(package.to_path_buf());
        } else {
            let target = package.with_file_name(name);
            rename(package, &target)?;
            renamed.push(target);
        }
    }
    Ok(renamed)
}

/// Moves every file in a subdirectory of `pack` to its root as `<n>_<name>`, where `n` starts at
/// 1 and increases each time the files come from a different directory. Returns the number of
/// files moved.
pub fn flatten_to_root<P: AsRef<Path>>(pack: P) -> Result<usize> {
    let pack = pack.as_ref();
    let mut moves = Vec::new();
    let mut n = 0;
    let mut last_dir: Option<PathBuf> = None;

    for entry in WalkDir::new(pack).min_depth(2).sort_by(|a, b| {
        a.file_type()
            .is_dir()
            .cmp(&b.file_type().is_dir())
            .then_with(|| a.file_name().cmp(b.file_name()))
    }) {
        let entry = entry.context(WalkFileSnafu {})?;
        if !entry.file_type().is_file() {
            continue;
        }

        let dir = entry.path().parent().map(Path::to_path_buf);
        if dir != last_dir {
            n += 1;
            last_dir = dir;
        }

        let target = pack.join(format!("{}_{}", n, file_name_str(entry.path())));
        moves.push((entry.into_path(), target));
    }

    for (from, to) in &moves {
        rename(from, to)?;
    }
    Ok(moves.len())
}

/// Deletes every subdirectory of `pack`, regardless of its contents. Returns the number deleted.
pub fn delete_subfolders<P: AsRef<Path>>(pack: P) -> Result<usize> {
    let mut count = 0;
    for child in sorted_children(pack)? {
        if child.is_dir() {
            remove_dir_all(&child)?;
            count += 1;
        }
    }
    Ok(count)
}

fn files_where<F>(dir: &Path, predicate: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.context(WalkFileSnafu {})?;
        if entry.file_type().is_file() && predicate(file_name_str(entry.path())) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
