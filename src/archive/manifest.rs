//! Checksum manifests: flat text files of `<hex digest><two spaces><relative path>` lines.
//!
//! Every function in this module that touches disk rewrites the manifest in place. Entries are
//! kept sorted by path and written in Unicode NFC.

use std::collections::HashSet;
use std::path::{Component, Path};

use log::{debug, info};
use snafu::ResultExt;
use walkdir::WalkDir;

use crate::archive::consts::*;
use crate::archive::digest::{digest_file, digest_file_multi, DigestAlgorithm, HexDigest};
use crate::archive::encoding::{normalize_nfc, to_manifest_path};
use crate::archive::error::*;
use crate::archive::io::{append_lines, is_hidden_file, read_lines, write_lines};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ManifestEntry {
    pub digest: HexDigest,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    algorithm: DigestAlgorithm,
    entries: Vec<ManifestEntry>,
}

/// Lines found in only one of two manifests
#[derive(Debug, Default, Eq, PartialEq)]
pub struct ManifestDiff {
    pub only_left: Vec<String>,
    pub only_right: Vec<String>,
}

impl ManifestEntry {
    pub fn new<S: Into<String>>(digest: HexDigest, path: S) -> Self {
        Self {
            digest,
            path: path.into(),
        }
    }

    /// Parses a manifest line. `file` and `num` only feed the error message.
    pub fn parse(line: &str, file: &Path, num: usize) -> Result<Self> {
        let invalid = || Error::InvalidManifestLine {
            path: file.into(),
            num,
            line: line.into(),
        };

        let (digest, path) = line.split_once(MANIFEST_SEPARATOR).ok_or_else(invalid)?;

        if digest.is_empty() || path.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(invalid());
        }

        Ok(Self::new(digest.into(), path))
    }

    pub fn to_line(&self) -> String {
        format!("{}{}{}", self.digest, MANIFEST_SEPARATOR, self.path)
    }

    /// The final component of the entry's path
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl Manifest {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            entries: Vec::new(),
        }
    }

    /// Digests every non-hidden file beneath `dir`. Entry paths are relative to `base`, which
    /// must be `dir` or one of its ancestors.
    pub fn generate<D, B>(dir: D, base: B, algorithm: DigestAlgorithm) -> Result<Self>
    where
        D: AsRef<Path>,
        B: AsRef<Path>,
    {
        Ok(Self::generate_all(dir, base, &[algorithm])?
            .pop()
            .unwrap_or_else(|| Self::new(algorithm)))
    }

    /// Like `generate`, but produces one manifest per algorithm while reading each file once.
    /// The manifests are returned in the order of `algorithms`.
    pub fn generate_all<D, B>(dir: D, base: B, algorithms: &[DigestAlgorithm]) -> Result<Vec<Self>>
    where
        D: AsRef<Path>,
        B: AsRef<Path>,
    {
        let dir = dir.as_ref();
        let base = base.as_ref();
        let mut manifests: Vec<Self> = algorithms.iter().map(|a| Self::new(*a)).collect();

        info!("Generating manifests for {}", dir.display());

        for file in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|f| f.depth() == 0 || !is_hidden_file(f.file_name()))
        {
            let file = file.context(WalkFileSnafu {})?;

            if !file.file_type().is_file() {
                continue;
            }

            let relative =
                file.path()
                    .strip_prefix(base)
                    .map_err(|_| Error::PathOutsideBase {
                        path: file.path().into(),
                        base: base.into(),
                    })?;
            let relative = to_manifest_path(relative)?;

            debug!("Calculating digests for {}", file.path().display());

            let mut digests = digest_file_multi(file.path(), algorithms)?;
            for manifest in &mut manifests {
                if let Some(digest) = digests.remove(&manifest.algorithm) {
                    manifest
                        .entries
                        .push(ManifestEntry::new(digest, relative.clone()));
                }
            }
        }

        for manifest in &mut manifests {
            manifest.sort();
        }
        Ok(manifests)
    }

    /// Reads a manifest from disk. The algorithm is taken from the file name when it identifies
    /// one, and otherwise inferred from the length of the first digest.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut entries = Vec::new();

        for (i, line) in read_lines(path)?.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(ManifestEntry::parse(line, path, i + 1)?);
        }

        let algorithm = algorithm_from_name(path)
            .or_else(|| {
                entries
                    .first()
                    .and_then(|e| DigestAlgorithm::from_hex_len(e.digest.len()))
            })
            .ok_or_else(|| Error::UnknownAlgorithm { path: path.into() })?;

        Ok(Self { algorithm, entries })
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!("Writing manifest {}", path.display());
        write_lines(path, &self.lines())
    }

    /// Every entry as an NFC normalized manifest line
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| normalize_nfc(&e.to_line()).into_owned())
            .collect()
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable sort by path
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Replaces the entry with the same path, or adds it. Returns true if an entry was replaced.
    pub fn upsert(&mut self, entry: ManifestEntry) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.path == entry.path) {
            *existing = entry;
            true
        } else {
            self.entries.push(entry);
            false
        }
    }

    /// Line level set difference in both directions
    pub fn diff(&self, other: &Manifest) -> ManifestDiff {
        let left = self.lines();
        let right = other.lines();
        let left_set: HashSet<&String> = left.iter().collect();
        let right_set: HashSet<&String> = right.iter().collect();

        ManifestDiff {
            only_left: left
                .iter()
                .filter(|l| !right_set.contains(l))
                .cloned()
                .collect(),
            only_right: right
                .iter()
                .filter(|l| !left_set.contains(l))
                .cloned()
                .collect(),
        }
    }
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.only_left.is_empty() && self.only_right.is_empty()
    }
}

/// Generates digests for `dir` and appends them after the existing lines of `manifest_file`.
/// Returns the number of lines appended.
pub fn append_manifest<M, D, B>(
    manifest_file: M,
    dir: D,
    base: B,
    algorithm: DigestAlgorithm,
) -> Result<usize>
where
    M: AsRef<Path>,
    D: AsRef<Path>,
    B: AsRef<Path>,
{
    let generated = Manifest::generate(dir, base, algorithm)?;
    let manifest_file = manifest_file.as_ref();
    info!("Appending to manifest {}", manifest_file.display());
    append_lines(manifest_file, &generated.lines())?;
    Ok(generated.len())
}

pub fn sort_manifest<P: AsRef<Path>>(manifest_file: P) -> Result<()> {
    let manifest_file = manifest_file.as_ref();
    let mut manifest = Manifest::read(manifest_file)?;
    manifest.sort();
    manifest.write(manifest_file)
}

/// Plain text substitution on every line of the file
pub fn manifest_replace<P: AsRef<Path>>(manifest_file: P, from: &str, to: &str) -> Result<()> {
    let manifest_file = manifest_file.as_ref();
    let lines: Vec<String> = read_lines(manifest_file)?
        .iter()
        .map(|l| l.replace(from, to))
        .collect();
    write_lines(manifest_file, &lines)
}

/// Adds `file` to the manifest under its last three path components, which is its path relative
/// to the package container when the file is in one of the package's top level directories.
pub fn add_file<M: AsRef<Path>, F: AsRef<Path>>(manifest_file: M, file: F) -> Result<()> {
    let file = file.as_ref();
    let parts: Vec<&str> = file
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<&str>>>()
        .ok_or_else(|| Error::InvalidUtf8Path { path: file.into() })?;

    let start = parts.len().saturating_sub(3);
    add_file_as(manifest_file, file, &parts[start..].join("/"))
}

/// Adds `file` to the manifest under the given relative path, replacing any entry with that path
pub fn add_file_as<M: AsRef<Path>, F: AsRef<Path>>(
    manifest_file: M,
    file: F,
    relative: &str,
) -> Result<()> {
    let manifest_file = manifest_file.as_ref();
    let mut manifest = Manifest::read(manifest_file)?;

    info!("Adding {} to {}", relative, manifest_file.display());

    let digest = digest_file(file, manifest.algorithm)?;
    manifest.upsert(ManifestEntry::new(digest, relative));
    manifest.sort();
    manifest.write(manifest_file)
}

/// Rewrites every entry whose path is `old`, or lies beneath `old`, to the same location under
/// `new`. Returns true if any entry changed.
pub fn rename_path<P: AsRef<Path>>(manifest_file: P, old: &str, new: &str) -> Result<bool> {
    let manifest_file = manifest_file.as_ref();
    let mut manifest = Manifest::read(manifest_file)?;
    let dir_prefix = format!("{}/", old.trim_end_matches('/'));
    let mut changed = false;

    for entry in &mut manifest.entries {
        if entry.path == old {
            entry.path = new.into();
            changed = true;
        } else if let Some(rest) = entry.path.strip_prefix(&dir_prefix) {
            entry.path = format!("{}/{}", new.trim_end_matches('/'), rest);
            changed = true;
        }
    }

    if changed {
        info!("Updating {} to {} in {}", old, new, manifest_file.display());
        manifest.sort();
        manifest.write(manifest_file)?;
    }

    Ok(changed)
}

/// Recalculates the digest of `file` and stores it on every entry with the same file name.
/// Returns true if any entry changed.
pub fn refresh_digest<M: AsRef<Path>, F: AsRef<Path>>(manifest_file: M, file: F) -> Result<bool> {
    let manifest_file = manifest_file.as_ref();
    let file = file.as_ref();
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidUtf8Path { path: file.into() })?;

    let mut manifest = Manifest::read(manifest_file)?;
    let digest = digest_file(file, manifest.algorithm)?;
    let mut changed = false;

    for entry in &mut manifest.entries {
        if entry.file_name() == name && entry.digest != digest {
            entry.digest = digest.clone();
            changed = true;
        }
    }

    if changed {
        info!("Updating digest of {} in {}", name, manifest_file.display());
        manifest.write(manifest_file)?;
    }

    Ok(changed)
}

/// Drops every line containing any of the needles. Returns the number of lines removed.
pub fn remove_lines_containing<P: AsRef<Path>>(manifest_file: P, needles: &[&str]) -> Result<usize> {
    let manifest_file = manifest_file.as_ref();
    let lines = read_lines(manifest_file)?;
    let before = lines.len();
    let kept: Vec<String> = lines
        .into_iter()
        .filter(|l| !needles.iter().any(|n| l.contains(n)))
        .collect();
    let removed = before - kept.len();

    if removed > 0 {
        info!("Removing {} lines from {}", removed, manifest_file.display());
        write_lines(manifest_file, &kept)?;
    }

    Ok(removed)
}

/// True for the sidecar MD5 manifests packages carry, excluding hidden and modified manifests
pub fn is_package_manifest_name(name: &str) -> bool {
    name.contains("_manifest")
        && name.ends_with(".md5")
        && !name.starts_with('.')
        && !name.ends_with(MODIFIED_MANIFEST_SUFFIX)
}

fn algorithm_from_name(path: &Path) -> Option<DigestAlgorithm> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".md5") {
        Some(DigestAlgorithm::Md5)
    } else if name.contains("sha512") {
        Some(DigestAlgorithm::Sha512)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::archive::digest::DigestAlgorithm;
    use crate::archive::error::Error;
    use crate::archive::manifest::*;

    const HELLO_MD5: &str = "b1946ac92492d2347c6235b4d2611184";
    const WORLD_MD5: &str = "591785b794601e212b260e25925636fd";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn generate_relative_sorted_manifest() {
        let temp = TempDir::new().unwrap();
        let container = temp.path().join("oe1234");
        write(&container.join("uuid/objects/b.mov"), "world\n");
        write(&container.join("uuid/logs/a.log"), "hello\n");
        write(&container.join("uuid/objects/.DS_Store"), "junk");
        write(&container.join("uuid/.hidden/c.txt"), "junk");

        let manifest =
            Manifest::generate(container.join("uuid"), &container, DigestAlgorithm::Md5).unwrap();

        assert_eq!(
            vec![
                format!("{HELLO_MD5}  uuid/logs/a.log"),
                format!("{WORLD_MD5}  uuid/objects/b.mov"),
            ],
            manifest.lines()
        );
    }

    #[test]
    fn generate_all_matches_single_algorithm_manifests() {
        let temp = TempDir::new().unwrap();
        let container = temp.path().join("oe1234");
        write(&container.join("uuid/objects/b.mov"), "world\n");
        write(&container.join("uuid/logs/a.log"), "hello\n");
        let uuid_dir = container.join("uuid");

        let both = Manifest::generate_all(
            &uuid_dir,
            &container,
            &[DigestAlgorithm::Md5, DigestAlgorithm::Sha512],
        )
        .unwrap();

        assert_eq!(2, both.len());
        assert_eq!(DigestAlgorithm::Md5, both[0].algorithm());
        assert_eq!(DigestAlgorithm::Sha512, both[1].algorithm());
        assert!(both[0]
            .diff(&Manifest::generate(&uuid_dir, &container, DigestAlgorithm::Md5).unwrap())
            .is_empty());
        assert_eq!(
            Manifest::generate(&uuid_dir, &container, DigestAlgorithm::Sha512)
                .unwrap()
                .lines(),
            both[1].lines()
        );
        assert_eq!(128, both[1].entries()[0].digest.len());
    }

    #[test]
    fn read_detects_algorithm() {
        let temp = TempDir::new().unwrap();
        let sha = temp.path().join("uuid_manifest-sha512.txt");
        write(&sha, "");
        assert_eq!(
            DigestAlgorithm::Sha512,
            Manifest::read(&sha).unwrap().algorithm()
        );

        let other = temp.path().join("checksums.txt");
        write(&other, &format!("{HELLO_MD5}  a.txt\r\n\n"));
        let manifest = Manifest::read(&other).unwrap();
        assert_eq!(DigestAlgorithm::Md5, manifest.algorithm());
        assert_eq!(1, manifest.len());
    }

    #[test]
    fn read_rejects_lines_without_separator() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("bad_manifest.md5");
        write(&file, &format!("{HELLO_MD5}  a.txt\n{HELLO_MD5} b.txt\n"));

        match Manifest::read(&file) {
            Err(Error::InvalidManifestLine { num, .. }) => assert_eq!(2, num),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn append_leaves_existing_lines_untouched() {
        let temp = TempDir::new().unwrap();
        let manifest_file = temp.path().join("uuid_manifest.md5");
        write(&manifest_file, &format!("{WORLD_MD5}  z.txt\n"));
        write(&temp.path().join("extra/a.txt"), "hello\n");

        let appended = append_manifest(
            &manifest_file,
            temp.path().join("extra"),
            temp.path(),
            DigestAlgorithm::Md5,
        )
        .unwrap();

        assert_eq!(1, appended);
        assert_eq!(
            format!("{WORLD_MD5}  z.txt\n{HELLO_MD5}  extra/a.txt\n"),
            fs::read_to_string(&manifest_file).unwrap()
        );

        sort_manifest(&manifest_file).unwrap();
        assert_eq!(
            format!("{HELLO_MD5}  extra/a.txt\n{WORLD_MD5}  z.txt\n"),
            fs::read_to_string(&manifest_file).unwrap()
        );
    }

    #[test]
    fn add_file_uses_last_three_components_and_replaces() {
        let temp = TempDir::new().unwrap();
        let manifest_file = temp.path().join("uuid_manifest.md5");
        let file = temp.path().join("oe1234/uuid/metadata/notes.txt");
        write(&file, "hello\n");
        write(
            &manifest_file,
            &format!("{WORLD_MD5}  uuid/metadata/notes.txt\n{WORLD_MD5}  uuid/objects/a.mov\n"),
        );

        add_file(&manifest_file, &file).unwrap();

        let manifest = Manifest::read(&manifest_file).unwrap();
        assert_eq!(2, manifest.len());
        assert_eq!(
            HELLO_MD5,
            manifest.get("uuid/metadata/notes.txt").unwrap().digest.as_str()
        );
    }

    #[test]
    fn rename_path_matches_whole_components() {
        let temp = TempDir::new().unwrap();
        let manifest_file = temp.path().join("uuid_manifest.md5");
        write(
            &manifest_file,
            &format!(
                "{HELLO_MD5}  uuid/objects/a.mov\n{HELLO_MD5}  uuid/objects/a.mov.bak\n{WORLD_MD5}  uuid/objects/sub/b.mov\n"
            ),
        );

        assert!(rename_path(&manifest_file, "uuid/objects/a.mov", "uuid/objects/c.mov").unwrap());
        assert!(rename_path(&manifest_file, "uuid/objects/sub", "uuid/objects/renamed").unwrap());
        assert!(!rename_path(&manifest_file, "uuid/missing", "uuid/other").unwrap());

        let paths: Vec<String> = Manifest::read(&manifest_file)
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.path.clone())
            .collect();
        assert_eq!(
            vec![
                "uuid/objects/a.mov.bak",
                "uuid/objects/c.mov",
                "uuid/objects/renamed/b.mov"
            ],
            paths
        );
    }

    #[test]
    fn refresh_digest_by_file_name() {
        let temp = TempDir::new().unwrap();
        let manifest_file = temp.path().join("uuid_manifest.md5");
        let log = temp.path().join("uuid/logs/uuid_sip_log.log");
        write(&log, "world\n");
        write(
            &manifest_file,
            &format!("{HELLO_MD5}  uuid/logs/uuid_sip_log.log\n{HELLO_MD5}  uuid/objects/a.mov\n"),
        );

        assert!(refresh_digest(&manifest_file, &log).unwrap());
        assert!(!refresh_digest(&manifest_file, &log).unwrap());
        assert_eq!(
            format!("{WORLD_MD5}  uuid/logs/uuid_sip_log.log\n{HELLO_MD5}  uuid/objects/a.mov\n"),
            fs::read_to_string(&manifest_file).unwrap()
        );
    }

    #[test]
    fn replace_and_remove_lines() {
        let temp = TempDir::new().unwrap();
        let manifest_file = temp.path().join("uuid_manifest.md5");
        write(
            &manifest_file,
            &format!("{HELLO_MD5}  oe1234/a.mov\n{HELLO_MD5}  oe1234/.DS_Store\n{HELLO_MD5}  oe1234/Thumbs.db\n"),
        );

        assert_eq!(
            2,
            remove_lines_containing(&manifest_file, &[".DS_Store", "Thumbs.db"]).unwrap()
        );
        manifest_replace(&manifest_file, "oe1234", "aaa0001").unwrap();

        assert_eq!(
            format!("{HELLO_MD5}  aaa0001/a.mov\n"),
            fs::read_to_string(&manifest_file).unwrap()
        );
    }

    #[test]
    fn diff_both_ways() {
        let mut left = Manifest::new(DigestAlgorithm::Md5);
        left.upsert(ManifestEntry::new(HELLO_MD5.into(), "a"));
        left.upsert(ManifestEntry::new(HELLO_MD5.into(), "b"));
        let mut right = Manifest::new(DigestAlgorithm::Md5);
        right.upsert(ManifestEntry::new(HELLO_MD5.into(), "a"));
        right.upsert(ManifestEntry::new(WORLD_MD5.into(), "b"));

        let diff = left.diff(&right);

        assert_eq!(vec![format!("{HELLO_MD5}  b")], diff.only_left);
        assert_eq!(vec![format!("{WORLD_MD5}  b")], diff.only_right);
        assert!(left.diff(&left).is_empty());
    }

    #[test]
    fn package_manifest_names() {
        assert!(is_package_manifest_name("uuid_manifest.md5"));
        assert!(!is_package_manifest_name("uuid_modified_manifest.md5"));
        assert!(!is_package_manifest_name("._uuid_manifest.md5"));
        assert!(!is_package_manifest_name("uuid_manifest-sha512.txt"));
    }
}
