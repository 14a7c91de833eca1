use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::path::Path;

use log::info;
use snafu::ResultExt;
use walkdir::WalkDir;

use crate::archive::consts::*;
use crate::archive::digest::digest_file;
use crate::archive::encoding::{normalize_nfc, to_manifest_path};
use crate::archive::error::*;
use crate::archive::io::is_hidden_file;
use crate::archive::manifest::{is_package_manifest_name, Manifest};

#[derive(Debug)]
pub struct ValidationResult {
    verdict: ValidationVerdict,
    issues: Vec<ValidationIssue>,
    checked: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ValidationVerdict {
    Valid,
    Invalid,
}

#[derive(Debug)]
pub struct ValidationIssue {
    level: IssueLevel,
    message: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IssueLevel {
    Error,
    Warn,
}

/// Verifies every entry in the manifest against the files on disk. Paths are resolved relative
/// to the directory the manifest is in. Missing files and digest mismatches are errors. Files
/// that exist beneath the directories the manifest covers but are not listed are warnings.
pub fn validate_manifest<P: AsRef<Path>>(manifest_file: P) -> Result<ValidationResult> {
    let manifest_file = manifest_file.as_ref();
    let base = manifest_file.parent().unwrap_or_else(|| Path::new(""));
    let manifest = Manifest::read(manifest_file)?;
    let mut result = ValidationResult::new();

    info!("Validating {}", manifest_file.display());

    for entry in manifest.entries() {
        let path = base.join(&entry.path);

        if !path.is_file() {
            result.error(format!("{} does not exist", entry.path));
            continue;
        }

        let actual = digest_file(&path, manifest.algorithm())?;
        result.checked += 1;

        if actual != entry.digest {
            result.error(format!(
                "{} has {} digest {} but the manifest records {}",
                entry.path,
                manifest.algorithm(),
                actual,
                entry.digest
            ));
        }
    }

    check_unlisted_files(base, &manifest, &mut result)?;

    Ok(result)
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            verdict: ValidationVerdict::Valid,
            issues: Vec::new(),
            checked: 0,
        }
    }

    pub fn error<S: AsRef<str>>(&mut self, message: S) {
        self.verdict = ValidationVerdict::Invalid;
        self.issues.push(ValidationIssue::error(message));
    }

    pub fn warn<S: AsRef<str>>(&mut self, message: S) {
        self.issues.push(ValidationIssue::warn(message));
    }

    pub fn is_valid(&self) -> bool {
        self.verdict == ValidationVerdict::Valid
    }

    pub fn verdict(&self) -> ValidationVerdict {
        self.verdict
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// The number of files whose digests were calculated
    pub fn checked(&self) -> usize {
        self.checked
    }

    pub fn error_count(&self) -> usize {
        self.count(IssueLevel::Error)
    }

    pub fn warn_count(&self) -> usize {
        self.count(IssueLevel::Warn)
    }

    fn count(&self, level: IssueLevel) -> usize {
        self.issues.iter().filter(|i| i.level == level).count()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationIssue {
    pub fn error<S: AsRef<str>>(message: S) -> Self {
        Self {
            level: IssueLevel::Error,
            message: message.as_ref().into(),
        }
    }

    pub fn warn<S: AsRef<str>>(message: S) -> Self {
        Self {
            level: IssueLevel::Warn,
            message: message.as_ref().into(),
        }
    }

    pub fn level(&self) -> IssueLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.level {
            IssueLevel::Error => write!(f, "ERROR: {}", self.message),
            IssueLevel::Warn => write!(f, "WARN: {}", self.message),
        }
    }
}

fn check_unlisted_files(base: &Path, manifest: &Manifest, result: &mut ValidationResult) -> Result<()> {
    let listed: HashSet<&str> = manifest.entries().iter().map(|e| e.path.as_str()).collect();

    // Only the top level directories the manifest covers; files next to the manifest are
    // usually other sidecars.
    let mut roots: Vec<&str> = manifest
        .entries()
        .iter()
        .filter_map(|e| e.path.split_once('/').map(|(root, _)| root))
        .collect();
    roots.sort_unstable();
    roots.dedup();

    for root in roots {
        let root_dir = base.join(root);
        if !root_dir.is_dir() {
            continue;
        }

        for file in WalkDir::new(&root_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|f| f.depth() == 0 || !is_hidden_file(f.file_name()))
        {
            let file = file.context(WalkFileSnafu {})?;
            if !file.file_type().is_file() {
                continue;
            }

            let name = file.file_name().to_str().unwrap_or_default();
            if is_package_manifest_name(name) || name.ends_with(SHA512_MANIFEST_SUFFIX) {
                continue;
            }

            let relative = file
                .path()
                .strip_prefix(base)
                .map_err(|_| Error::PathOutsideBase {
                    path: file.path().into(),
                    base: base.into(),
                })?;
            let relative = to_manifest_path(relative)?;

            if !listed.contains(normalize_nfc(&relative).as_ref()) {
                result.warn(format!("{} is not listed in the manifest", relative));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::archive::digest::DigestAlgorithm;
    use crate::archive::manifest::Manifest;
    use crate::archive::validate::{validate_manifest, IssueLevel, ValidationVerdict};

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn package(temp: &TempDir) -> std::path::PathBuf {
        let container = temp.path().join("oe1234");
        write(&container.join("uuid/objects/a.mov"), "hello\n");
        write(&container.join("uuid/logs/uuid_sip_log.log"), "log\n");
        let manifest_file = container.join("uuid_manifest.md5");
        Manifest::generate(container.join("uuid"), &container, DigestAlgorithm::Md5)
            .unwrap()
            .write(&manifest_file)
            .unwrap();
        manifest_file
    }

    #[test]
    fn valid_package() {
        let temp = TempDir::new().unwrap();
        let manifest_file = package(&temp);

        let result = validate_manifest(&manifest_file).unwrap();

        assert!(result.is_valid());
        assert_eq!(2, result.checked());
        assert!(result.issues().is_empty());
    }

    #[test]
    fn modified_and_missing_files_are_errors() {
        let temp = TempDir::new().unwrap();
        let manifest_file = package(&temp);
        let uuid = temp.path().join("oe1234/uuid");
        fs::write(uuid.join("objects/a.mov"), "changed\n").unwrap();
        fs::remove_file(uuid.join("logs/uuid_sip_log.log")).unwrap();

        let result = validate_manifest(&manifest_file).unwrap();

        assert_eq!(ValidationVerdict::Invalid, result.verdict());
        assert_eq!(2, result.error_count());
        assert_eq!(1, result.checked());
    }

    #[test]
    fn unlisted_files_are_warnings() {
        let temp = TempDir::new().unwrap();
        let manifest_file = package(&temp);
        write(&temp.path().join("oe1234/uuid/objects/extra.mov"), "extra");
        write(&temp.path().join("oe1234/uuid/objects/.DS_Store"), "junk");

        let result = validate_manifest(&manifest_file).unwrap();

        assert!(result.is_valid());
        assert_eq!(1, result.warn_count());
        assert_eq!(IssueLevel::Warn, result.issues()[0].level());
        assert_eq!(
            "WARN: uuid/objects/extra.mov is not listed in the manifest",
            result.issues()[0].to_string()
        );
    }
}
