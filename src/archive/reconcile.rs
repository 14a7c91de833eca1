//! Reconciles the checksum reports exported by preservation storage systems against the
//! manifests of the local copies of the same AIPs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use snafu::ResultExt;
use strum_macros::{Display as EnumDisplay, EnumString};
use walkdir::WalkDir;

use crate::archive::consts::*;
use crate::archive::digest::HexDigest;
use crate::archive::error::*;
use crate::archive::event::append_report_line;
use crate::archive::io::{file_name_str, sorted_children};
use crate::archive::manifest::{Manifest, ManifestEntry};
use crate::archive::register::{CsvTable, Record};

#[derive(Debug, Copy, Clone, Eq, PartialEq, EnumString, EnumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum StorageSystem {
    Strongbox,
    StorCycle,
}

/// The outcome of reconciling one AIP
#[derive(Debug, Clone)]
pub struct FixityReport {
    pub package: String,
    pub system: StorageSystem,
    /// The local manifest the storage listing was compared with
    pub manifest: Option<PathBuf>,
    /// The number of entries the storage report holds for the package
    pub storage_count: usize,
    pub only_in_storage: Vec<String>,
    pub only_in_manifest: Vec<String>,
}

impl StorageSystem {
    /// The package's entries in the storage report, in the same form as the local comparison
    /// lines: full manifest lines for Strongbox, paths for StorCycle.
    fn storage_entries(&self, report: &CsvTable, id: &str) -> Vec<String> {
        let mut entries: Vec<String> = match self {
            StorageSystem::Strongbox => {
                let marker = format!("/{}/", id);
                report
                    .rows()
                    .iter()
                    .filter(|row| field(row, "path").contains(&marker))
                    .map(|row| {
                        ManifestEntry::new(
                            HexDigest::from(field(row, "hash_code")),
                            field(row, "path").replace(&marker, ""),
                        )
                        .to_line()
                    })
                    .collect()
            }
            StorageSystem::StorCycle => {
                let marker = format!("\\{}\\", id);
                report
                    .rows()
                    .iter()
                    .filter(|row| field(row, "Directory") == "false")
                    .filter_map(|row| {
                        field(row, "Path")
                            .split_once(&marker)
                            .map(|(_, rest)| rest.replace('\\', "/"))
                    })
                    .collect()
            }
        };
        entries.sort();
        entries
    }

    fn required_columns(&self) -> &'static [&'static str] {
        match self {
            StorageSystem::Strongbox => &["path", "hash_code"],
            StorageSystem::StorCycle => &["Path", "Directory"],
        }
    }

    /// Strongbox reports are checked against the SHA-512 manifest, found anywhere in the package.
    /// StorCycle reports against the MD5 manifest at the package root.
    fn find_manifest(&self, package_dir: &Path) -> Result<Option<PathBuf>> {
        match self {
            StorageSystem::Strongbox => {
                for file in WalkDir::new(package_dir).sort_by_file_name() {
                    let file = file.context(WalkFileSnafu {})?;
                    if file.file_type().is_file()
                        && file_name_str(file.path()).ends_with(SHA512_MANIFEST_SUFFIX)
                    {
                        return Ok(Some(file.path().into()));
                    }
                }
                Ok(None)
            }
            StorageSystem::StorCycle => Ok(sorted_children(package_dir)?
                .into_iter()
                .find(|f| f.is_file() && file_name_str(f).ends_with(MD5_MANIFEST_SUFFIX))),
        }
    }

    fn local_entries(&self, manifest: &Path) -> Result<Vec<String>> {
        let manifest = Manifest::read(manifest)?;
        Ok(match self {
            StorageSystem::Strongbox => manifest.lines(),
            StorageSystem::StorCycle => manifest
                .entries()
                .iter()
                .map(|e| e.path.clone())
                .collect(),
        })
    }

    fn label(&self) -> &'static str {
        match self {
            StorageSystem::Strongbox => "Strongbox",
            StorageSystem::StorCycle => "StorCycle",
        }
    }
}

impl FixityReport {
    pub fn passed(&self) -> bool {
        self.storage_count > 0
            && self.manifest.is_some()
            && self.only_in_storage.is_empty()
            && self.only_in_manifest.is_empty()
    }

    /// The lines this package contributes to a fixity report
    pub fn lines(&self) -> Vec<String> {
        let system = self.system.label();
        let mut lines = vec![format!("Target AIP = {}", self.package)];

        if self.storage_count == 0 {
            lines.push(format!(
                "Target AIP fixity = FAIL - items are NOT in {}",
                system
            ));
            return lines;
        }
        if self.manifest.is_none() {
            lines.push("Target AIP fixity = FAIL - no local manifest was found".into());
            return lines;
        }

        if self.only_in_storage.is_empty() {
            lines.push(format!(
                "Target AIP fixity = PASS - All files in the {} manifest are present in your local AIP manifest",
                system
            ));
        } else {
            for item in &self.only_in_storage {
                lines.push(format!(
                    "Target AIP fixity = FAIL - {} is in {} but NOT in the local AIP manifest",
                    item, system
                ));
            }
        }

        if self.only_in_manifest.is_empty() {
            lines.push(format!(
                "Target AIP fixity = PASS - All files in the local AIP manifest are present in the {} csv",
                system
            ));
        } else {
            for item in &self.only_in_manifest {
                lines.push(format!(
                    "Target AIP fixity = FAIL - {} is in the local AIP manifest but NOT in the {} csv",
                    item, system
                ));
            }
        }

        lines
    }
}

/// Compares the entries the storage report holds for the AIP at `package_dir` with its local
/// manifest. The AIP's directory name is its identifier in the report.
pub fn reconcile_package<P: AsRef<Path>>(
    report: &CsvTable,
    package_dir: P,
    system: StorageSystem,
) -> Result<FixityReport> {
    let package_dir = package_dir.as_ref();
    let package = file_name_str(package_dir).to_string();
    let storage = system.storage_entries(report, &package);
    let manifest = system.find_manifest(package_dir)?;

    info!("Reconciling {} against {}", package, system.label());

    let mut fixity = FixityReport {
        package,
        system,
        manifest: manifest.clone(),
        storage_count: storage.len(),
        only_in_storage: Vec::new(),
        only_in_manifest: Vec::new(),
    };

    let manifest = match manifest {
        Some(manifest) => manifest,
        None => {
            warn!("No local manifest found in {}", package_dir.display());
            return Ok(fixity);
        }
    };
    if storage.is_empty() {
        return Ok(fixity);
    }

    let local = system.local_entries(&manifest)?;
    let local_set: HashSet<&String> = local.iter().collect();
    let storage_set: HashSet<&String> = storage.iter().collect();

    // The sidecar manifests are stored alongside the package but never list themselves
    fixity.only_in_storage = storage
        .iter()
        .filter(|s| !local_set.contains(s))
        .filter(|s| !MANIFEST_MARKERS.iter().any(|m| s.contains(m)))
        .cloned()
        .collect();
    fixity.only_in_manifest = local
        .iter()
        .filter(|l| !storage_set.contains(l))
        .cloned()
        .collect();

    Ok(fixity)
}

/// Reconciles every AIP in `root` and writes a text report to `output`
pub fn reconcile_all<R, P, O>(
    report_csv: R,
    root: P,
    system: StorageSystem,
    output: O,
) -> Result<Vec<FixityReport>>
where
    R: AsRef<Path>,
    P: AsRef<Path>,
    O: AsRef<Path>,
{
    let report_csv = report_csv.as_ref();
    let root = root.as_ref();
    let output = output.as_ref();

    let report = CsvTable::read(report_csv)?;
    for column in system.required_columns() {
        if !report.has_column(column) {
            return Err(Error::MissingColumn {
                column: column.to_string(),
                path: report_csv.into(),
            });
        }
    }

    append_report_line(output, &format!("Target Directory: {}", root.display()))?;

    let mut results = Vec::new();
    for package_dir in sorted_children(root)? {
        if !package_dir.is_dir() || !file_name_str(&package_dir).starts_with(ACCESSION_PREFIX) {
            continue;
        }

        let fixity = reconcile_package(&report, &package_dir, system)?;
        for line in fixity.lines() {
            append_report_line(output, &line)?;
        }
        results.push(fixity);
    }

    append_report_line(output, "----")?;
    append_report_line(output, "Final Results:")?;

    let failed: Vec<&str> = results
        .iter()
        .filter(|r| !r.passed())
        .map(|r| r.package.as_str())
        .collect();
    if failed.is_empty() {
        append_report_line(output, "ALL AIPS PASS FIXITY")?;
    } else {
        append_report_line(output, &format!("FIXITY FAILED AIPS = {}", failed.join(", ")))?;
    }

    Ok(results)
}

fn field<'a>(row: &'a Record, column: &str) -> &'a str {
    row.get(column).map(String::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::archive::digest::DigestAlgorithm;
    use crate::archive::manifest::Manifest;
    use crate::archive::reconcile::*;
    use crate::archive::register::CsvTable;

    const UUID: &str = "0c2b3d1e-7b6c-4a55-9a2a-4f1b0a3c9d10";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn aip(root: &Path, name: &str) -> (Manifest, Manifest) {
        let container = root.join(name);
        write(&container.join(UUID).join("objects/a.mov"), "hello\n");
        write(&container.join(UUID).join("logs/log.log"), "log\n");
        let md5 =
            Manifest::generate(container.join(UUID), &container, DigestAlgorithm::Md5).unwrap();
        md5.write(container.join(format!("{UUID}_manifest.md5")))
            .unwrap();
        let sha =
            Manifest::generate(container.join(UUID), &container, DigestAlgorithm::Sha512).unwrap();
        sha.write(container.join(format!("{UUID}_manifest-sha512.txt")))
            .unwrap();
        (md5, sha)
    }

    fn strongbox_rows(name: &str, sha: &Manifest, skip_last: bool) -> String {
        let count = if skip_last { sha.len() - 1 } else { sha.len() };
        let mut rows = String::new();
        for entry in &sha.entries()[..count] {
            rows.push_str(&format!("/{}/{},{}\n", name, entry.path, entry.digest));
        }
        rows.push_str(&format!(
            "/{}/{}_manifest-sha512.txt,{}\n",
            name,
            UUID,
            "0".repeat(128)
        ));
        rows
    }

    #[test]
    fn strongbox_pass_and_fail() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("aips");
        let (_, sha) = aip(&root, "aaa0001");
        let (_, other) = aip(&root, "aaa0002");
        fs::create_dir_all(root.join("aaa0003")).unwrap();

        let csv = temp.path().join("strongbox.csv");
        write(
            &csv,
            &format!(
                "path,hash_code\n{}{}",
                strongbox_rows("aaa0001", &sha, false),
                strongbox_rows("aaa0002", &other, true)
            ),
        );

        let output = temp.path().join("report.txt");
        let results = reconcile_all(&csv, &root, StorageSystem::Strongbox, &output).unwrap();

        assert_eq!(3, results.len());
        assert!(results[0].passed());
        assert!(!results[1].passed());
        assert_eq!(1, results[1].only_in_manifest.len());
        assert!(results[1].only_in_storage.is_empty());
        assert!(!results[2].passed());
        assert_eq!(0, results[2].storage_count);

        let report = fs::read_to_string(&output).unwrap();
        assert!(report.starts_with("Target Directory: "));
        assert!(report.contains("Target AIP fixity = FAIL - items are NOT in Strongbox"));
        assert!(report.ends_with("FIXITY FAILED AIPS = aaa0002, aaa0003\n"));
    }

    #[test]
    fn storcycle_compares_paths() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("aips");
        let (md5, _) = aip(&root, "aaa0001");

        let mut csv = String::from("Path,Directory,Checksum\n");
        csv.push_str(&format!("D:\\aips\\aaa0001\\{},true,\n", UUID));
        for entry in md5.entries() {
            csv.push_str(&format!(
                "D:\\aips\\aaa0001\\{},false,\n",
                entry.path.replace('/', "\\")
            ));
        }
        csv.push_str(&format!(
            "D:\\aips\\aaa0001\\{}_manifest.md5,false,\n",
            UUID
        ));
        csv.push_str(&format!(
            "D:\\aips\\aaa0001\\{}\\objects\\extra.mov,false,\n",
            UUID
        ));
        let csv_path = temp.path().join("storcycle.csv");
        write(&csv_path, &csv);

        let report = CsvTable::read(&csv_path).unwrap();
        let fixity =
            reconcile_package(&report, root.join("aaa0001"), StorageSystem::StorCycle).unwrap();

        assert!(!fixity.passed());
        assert_eq!(
            vec![format!("{}/objects/extra.mov", UUID)],
            fixity.only_in_storage
        );
        assert!(fixity.only_in_manifest.is_empty());
    }

    #[test]
    fn missing_columns_are_errors() {
        let temp = TempDir::new().unwrap();
        let csv = temp.path().join("report.csv");
        write(&csv, "Path,Checksum\n");

        assert!(reconcile_all(
            &csv,
            temp.path(),
            StorageSystem::StorCycle,
            temp.path().join("out.txt")
        )
        .is_err());
        assert_eq!(
            StorageSystem::StorCycle,
            "storcycle".parse::<StorageSystem>().unwrap()
        );
    }
}
