//! Checks that run across a directory of packages.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use snafu::ResultExt;
use walkdir::WalkDir;

use crate::archive::consts::*;
use crate::archive::error::*;
use crate::archive::event::{append_report_line, lossless_outcome, LosslessOutcome};
use crate::archive::identifiers::PackageKind;
use crate::archive::io::{file_name_str, read_lines, sorted_children};
use crate::archive::package::find_uuid_dir;
use crate::archive::validate::{validate_manifest, ValidationResult};

/// The validation result for one manifest of a batch
#[derive(Debug)]
pub struct ManifestCheck {
    pub manifest: PathBuf,
    pub result: ValidationResult,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LosslessStatus {
    Outcome(LosslessOutcome),
    /// The log exists but records neither outcome
    MissingOutcome,
    MissingLog,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LosslessCheck {
    pub package: String,
    pub kind: PackageKind,
    pub status: LosslessStatus,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StructureCheck {
    pub package: PathBuf,
    pub kind: PackageKind,
    pub problems: Vec<String>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameMismatch {
    /// The differing line carries sample aspect ratio information
    Sar,
    Checksum,
}

/// Validates every `_manifest.md5` beneath `input` and appends a `SUCCESS - ` or `FAILURE - `
/// line per manifest to `report`. Manifests in `logs` directories are skipped. When `sip_only`
/// is set, only the manifests at the root of each child of `input` are validated.
pub fn batch_validate<P: AsRef<Path>, R: AsRef<Path>>(
    input: P,
    sip_only: bool,
    report: R,
) -> Result<Vec<ManifestCheck>> {
    let report = report.as_ref();
    append_report_line(report, "Batch validation report")?;

    let mut checks = Vec::new();
    for manifest in batch_manifests(input.as_ref(), sip_only)? {
        let result = validate_manifest(&manifest)?;
        let line = if result.is_valid() {
            format!("SUCCESS - {}", manifest.display())
        } else {
            format!("FAILURE - {}", manifest.display())
        };
        info!("{}", line);
        append_report_line(report, &line)?;
        checks.push(ManifestCheck { manifest, result });
    }

    Ok(checks)
}

fn batch_manifests(input: &Path, sip_only: bool) -> Result<Vec<PathBuf>> {
    let mut manifests = Vec::new();

    if sip_only {
        for package in sorted_children(input)? {
            if !package.is_dir() {
                continue;
            }
            manifests.extend(
                sorted_children(&package)?
                    .into_iter()
                    .filter(|f| f.is_file() && file_name_str(f).ends_with(MD5_MANIFEST_SUFFIX)),
            );
        }
        return Ok(manifests);
    }

    for file in WalkDir::new(input).sort_by_file_name() {
        let file = file.context(WalkFileSnafu {})?;
        let in_logs = file
            .path()
            .parent()
            .map(|p| file_name_str(p) == LOGS)
            .unwrap_or(false);

        if file.file_type().is_file()
            && !in_logs
            && file_name_str(file.path()).ends_with(MD5_MANIFEST_SUFFIX)
        {
            manifests.push(file.into_path());
        }
    }

    Ok(manifests)
}

/// Reports the lossless outcome recorded in the `_seq2ffv1_log.log` of every package in `source`
pub fn lossless_check<P: AsRef<Path>>(source: P) -> Result<Vec<LosslessCheck>> {
    let mut checks = Vec::new();

    for package in sorted_children(source)? {
        let name = file_name_str(&package).to_string();
        let kind = match PackageKind::classify(&name) {
            Some(kind) if package.is_dir() => kind,
            _ => continue,
        };
        info!("{} {} found in the source directory", kind, name);

        let status = match find_seq2ffv1_log(&package)? {
            Some(log) => match lossless_outcome(&log)? {
                Some(outcome) => LosslessStatus::Outcome(outcome),
                None => LosslessStatus::MissingOutcome,
            },
            None => LosslessStatus::MissingLog,
        };

        checks.push(LosslessCheck {
            package: name,
            kind,
            status,
        });
    }

    Ok(checks)
}

fn find_seq2ffv1_log(package: &Path) -> Result<Option<PathBuf>> {
    let logs_dir = match find_uuid_dir(package)? {
        Some(uuid_dir) => uuid_dir.join(LOGS),
        None => return Ok(None),
    };
    if !logs_dir.is_dir() {
        return Ok(None);
    }

    Ok(sorted_children(&logs_dir)?
        .into_iter()
        .find(|log| file_name_str(log).ends_with(SEQ2FFV1_LOG_SUFFIX)))
}

/// Checks that every package in `source` has the directories and sidecar manifests it should.
/// AIPs and AIP shells must carry a SHA-512 sidecar as well as an MD5 one.
pub fn structure_check<P: AsRef<Path>>(source: P) -> Result<Vec<StructureCheck>> {
    let mut checks = Vec::new();

    for package in sorted_children(source)? {
        let kind = match PackageKind::classify(file_name_str(&package)) {
            Some(kind) if package.is_dir() => kind,
            _ => continue,
        };

        let mut problems = Vec::new();
        match find_uuid_dir(&package)? {
            Some(uuid_dir) => {
                let uuid = file_name_str(&uuid_dir);
                for dir in [LOGS, METADATA, OBJECTS] {
                    if !uuid_dir.join(dir).is_dir() {
                        problems.push(format!("{}/{} is missing", uuid, dir));
                    }
                }

                let mut sidecars = vec![format!("{}{}", uuid, MD5_MANIFEST_SUFFIX)];
                if kind.is_accessioned() {
                    sidecars.push(format!("{}{}", uuid, SHA512_MANIFEST_SUFFIX));
                }
                for sidecar in sidecars {
                    if !package.join(&sidecar).is_file() {
                        problems.push(format!("{} is missing", sidecar));
                    }
                }
            }
            None => problems.push("no UUID directory found".into()),
        }

        if !problems.is_empty() {
            warn!("{} {} has structural problems", kind, package.display());
        }

        checks.push(StructureCheck {
            package,
            kind,
            problems,
        });
    }

    Ok(checks)
}

/// Renders the directory tree beneath `dir`. Each level is indented by four spaces, directories
/// end in `/`, and a directory's files are listed before its subdirectories.
pub fn render_tree<P: AsRef<Path>>(dir: P) -> Result<String> {
    let mut out = String::new();
    render_dir(dir.as_ref(), 0, &mut out)?;
    Ok(out)
}

fn render_dir(dir: &Path, level: usize, out: &mut String) -> Result<()> {
    out.push_str(&format!("{}{}/\n", " ".repeat(4 * level), file_name_str(dir)));

    let children = sorted_children(dir)?;
    let indent = " ".repeat(4 * (level + 1));
    for file in children.iter().filter(|c| !c.is_dir()) {
        out.push_str(&format!("{}{}\n", indent, file_name_str(file)));
    }
    for sub in children.iter().filter(|c| c.is_dir()) {
        render_dir(sub, level + 1, out)?;
    }

    Ok(())
}

/// Byte for byte comparison of two files
pub fn diff_textfiles<A: AsRef<Path>, B: AsRef<Path>>(a: A, b: B) -> Result<LosslessOutcome> {
    let a = a.as_ref();
    let b = b.as_ref();
    let left = fs::read(a).context(IoReadSnafu { path: a })?;
    let right = fs::read(b).context(IoReadSnafu { path: b })?;

    if left == right {
        Ok(LosslessOutcome::Lossless)
    } else {
        warn!("Checksum mismatch between {} and {}", a.display(), b.display());
        Ok(LosslessOutcome::Lossy)
    }
}

/// Compares two framemd5 files line by line, ignoring `#` comment lines. Returns one entry per
/// differing line.
pub fn diff_framemd5s<A: AsRef<Path>, B: AsRef<Path>>(a: A, b: B) -> Result<Vec<FrameMismatch>> {
    let left = read_lines(a)?;
    let right = read_lines(b)?;

    let mismatches = left
        .iter()
        .filter(|l| !l.starts_with('#'))
        .zip(right.iter().filter(|l| !l.starts_with('#')))
        .filter(|(l, r)| l != r)
        .map(|(l, _)| {
            if l.contains("sar") {
                FrameMismatch::Sar
            } else {
                FrameMismatch::Checksum
            }
        })
        .collect();

    Ok(mismatches)
}

impl LosslessCheck {
    pub fn is_lossless(&self) -> bool {
        self.status == LosslessStatus::Outcome(LosslessOutcome::Lossless)
    }
}

impl StructureCheck {
    pub fn passed(&self) -> bool {
        self.problems.is_empty()
    }
}

impl Display for LosslessStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LosslessStatus::Outcome(outcome) => write!(f, "{}", outcome),
            LosslessStatus::MissingOutcome => write!(f, "ERROR - cannot find target in the log"),
            LosslessStatus::MissingLog => write!(f, "ERROR - cannot find the log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::archive::batch::*;
    use crate::archive::digest::DigestAlgorithm;
    use crate::archive::manifest::Manifest;

    const UUID: &str = "0c2b3d1e-7b6c-4a55-9a2a-4f1b0a3c9d10";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn package(root: &Path, name: &str) -> PathBuf {
        let container = root.join(name);
        write(&container.join(UUID).join("objects/a.mov"), "hello\n");
        write(&container.join(UUID).join("logs/log.log"), "log\n");
        fs::create_dir_all(container.join(UUID).join("metadata")).unwrap();
        Manifest::generate(container.join(UUID), &container, DigestAlgorithm::Md5)
            .unwrap()
            .write(container.join(format!("{UUID}_manifest.md5")))
            .unwrap();
        container
    }

    #[test]
    fn batch_validate_reports_each_manifest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("packages");
        package(&root, "oe1234");
        let broken = package(&root, "oe1235");
        write(&broken.join(UUID).join("objects/a.mov"), "changed\n");
        write(
            &root.join("oe1234").join(UUID).join("logs/old_manifest.md5"),
            "",
        );

        let report = temp.path().join("report.txt");
        let checks = batch_validate(&root, false, &report).unwrap();

        assert_eq!(2, checks.len());
        assert!(checks[0].result.is_valid());
        assert!(!checks[1].result.is_valid());

        let content = fs::read_to_string(&report).unwrap();
        assert!(content.contains(&format!(
            "SUCCESS - {}",
            root.join("oe1234")
                .join(format!("{UUID}_manifest.md5"))
                .display()
        )));
        assert!(content.contains("FAILURE - "));

        let checks = batch_validate(&root, true, temp.path().join("sip.txt")).unwrap();
        assert_eq!(2, checks.len());
    }

    #[test]
    fn lossless_outcomes_from_logs() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let logs = |name: &str| root.join(name).join(UUID).join("logs");
        write(
            &logs("oe1234").join(format!("{UUID}_seq2ffv1_log.log")),
            "2022-01-01T00:00:00 tester EVENT = losslessness verification, eventOutcome=lossless \n",
        );
        write(
            &logs("aaa0001").join(format!("{UUID}_seq2ffv1_log.log")),
            "2022-01-01T00:00:00 tester EVENT = losslessness verification, eventOutcome=lossy \n",
        );
        write(
            &logs("aaa0002_shell").join(format!("{UUID}_seq2ffv1_log.log")),
            "nothing here\n",
        );
        fs::create_dir_all(logs("aaa0003")).unwrap();
        fs::create_dir_all(root.join("unrelated")).unwrap();

        let checks = lossless_check(root).unwrap();
        let statuses: Vec<(&str, String)> = checks
            .iter()
            .map(|c| (c.package.as_str(), c.status.to_string()))
            .collect();

        assert_eq!(
            vec![
                ("aaa0001", "lossy".to_string()),
                ("aaa0002_shell", "ERROR - cannot find target in the log".to_string()),
                ("aaa0003", "ERROR - cannot find the log".to_string()),
                ("oe1234", "lossless".to_string()),
            ],
            statuses
        );
        assert!(checks[3].is_lossless());
        assert_eq!(PackageKind::AipShell, checks[1].kind);
    }

    #[test]
    fn structure_of_packages() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        package(root, "oe1234");
        package(root, "aaa0001");
        fs::create_dir_all(root.join("aaa0002")).unwrap();

        let checks = structure_check(root).unwrap();

        assert_eq!(3, checks.len());
        assert_eq!(
            vec![format!("{UUID}_manifest-sha512.txt is missing")],
            checks[0].problems
        );
        assert_eq!(vec!["no UUID directory found".to_string()], checks[1].problems);
        assert!(checks[2].passed());
    }

    #[test]
    fn tree_rendering() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("oe1234");
        write(&root.join("b.txt"), "b");
        write(&root.join("sub/c.txt"), "c");
        write(&root.join("a.txt"), "a");

        assert_eq!(
            "oe1234/\n    a.txt\n    b.txt\n    sub/\n        c.txt\n",
            render_tree(&root).unwrap()
        );
    }

    #[test]
    fn framemd5_and_text_diffs() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.framemd5");
        let b = temp.path().join("b.framemd5");
        write(
            &a,
            "#format: frame checksums\n#sar 0: 1/1\n0, 0, 0, 1, 100, aaaa\n0, 1, 1, 1, 100, bbbb\n",
        );
        write(
            &b,
            "#format: frame checksums\n0, 0, 0, 1, 100, aaaa\n0, 1, 1, 1, 100, cccc\n",
        );

        assert_eq!(
            vec![FrameMismatch::Checksum],
            diff_framemd5s(&a, &b).unwrap()
        );
        assert!(diff_framemd5s(&a, &a).unwrap().is_empty());

        assert_eq!(LosslessOutcome::Lossless, diff_textfiles(&a, &a).unwrap());
        assert_eq!(LosslessOutcome::Lossy, diff_textfiles(&a, &b).unwrap());
    }
}
