use std::path::{Path, PathBuf};

use log::{info, warn};
use snafu::ResultExt;
use walkdir::WalkDir;

use crate::archive::consts::*;
use crate::archive::encoding::clean_name;
use crate::archive::error::*;
use crate::archive::event::EventLog;
use crate::archive::io::{
    copy, copy_dir, create_dir_all, file_name_str, is_hidden_file, remove_dir_all, rename,
    sorted_children,
};
use crate::archive::manifest::{add_file_as, refresh_digest, rename_path, sort_manifest};
use crate::archive::package::Package;

const DEFAULT_TOOL: &str = "package_update";

/// Applies changes to an existing package, recording each one in its event log and keeping its
/// sidecar manifests in step.
#[derive(Debug)]
pub struct PackageUpdater {
    package: Package,
    log: EventLog,
    tool: String,
    aip: bool,
    started: bool,
    unchanged: Vec<String>,
}

/// The result of a package update
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct UpdateOutcome {
    /// Manifest updates that were expected to change a manifest but did not
    pub unchanged: Vec<String>,
}

impl Package {
    /// Creates a `PackageUpdater` that's used to change an existing package
    pub fn update<S: Into<String>>(self, user: S) -> PackageUpdater {
        PackageUpdater::new(self, user)
    }
}

impl PackageUpdater {
    pub fn new<S: Into<String>>(package: Package, user: S) -> Self {
        let log = package.event_log(user);
        Self {
            package,
            log,
            tool: DEFAULT_TOOL.into(),
            aip: false,
            started: false,
            unchanged: Vec::new(),
        }
    }

    /// When enabled, the SHA-512 sidecar is updated along with the MD5 one
    pub fn with_aip(mut self, aip: bool) -> Self {
        self.aip = aip;
        self
    }

    /// Sets the agent name that's recorded in the event log
    pub fn with_tool<S: Into<String>>(mut self, tool: S) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Moves files or directories that are already inside the package into `new_folder`, which is
    /// created if needed. Returns the new paths.
    pub fn move_into<P, F>(&mut self, files: &[P], new_folder: F) -> Result<Vec<PathBuf>>
    where
        P: AsRef<Path>,
        F: AsRef<Path>,
    {
        let result = self.move_files(files, new_folder.as_ref());
        self.record_failure(result)
    }

    fn move_files<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        new_folder: &Path,
    ) -> Result<Vec<PathBuf>> {
        self.start()?;
        create_dir_all(new_folder)?;

        let mut moved = Vec::with_capacity(files.len());
        for file in files {
            let file = file.as_ref();
            let target = new_folder.join(file_name_of(file)?);
            let old = self.package.relative_path(file)?;
            let new = self.package.relative_path(&target)?;

            rename(file, &target)?;
            self.log.record(format!(
                "EVENT = eventType=file movement, eventOutcomeDetailNote={} has been moved into {} agentName={}",
                file.display(),
                new_folder.display(),
                self.tool
            ))?;

            self.rename_in_manifests(&old, &new)?;
            moved.push(target);
        }

        Ok(moved)
    }

    /// Copies files or directories from outside the package into `new_folder` and adds every
    /// copied file to the manifests. Returns the new paths.
    pub fn copy_into<P, F>(&mut self, files: &[P], new_folder: F) -> Result<Vec<PathBuf>>
    where
        P: AsRef<Path>,
        F: AsRef<Path>,
    {
        let result = self.copy_files(files, new_folder.as_ref());
        self.record_failure(result)
    }

    fn copy_files<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        new_folder: &Path,
    ) -> Result<Vec<PathBuf>> {
        self.start()?;
        create_dir_all(new_folder)?;

        let mut copied = Vec::with_capacity(files.len());
        for file in files {
            let file = file.as_ref();
            let target = new_folder.join(file_name_of(file)?);
            if target.exists() {
                return Err(Error::AlreadyExists { path: target });
            }

            if file.is_dir() {
                copy_dir(file, &target)?;
            } else {
                copy(file, &target)?;
            }
            self.log.record(format!(
                "EVENT = eventType=file movement, eventOutcomeDetailNote={} has been copied into {} agentName={}",
                file.display(),
                new_folder.display(),
                self.tool
            ))?;

            for copied_file in files_beneath(&target)? {
                let relative = self.package.relative_path(&copied_file)?;
                for manifest in self.manifests() {
                    add_file_as(&manifest, &copied_file, &relative)?;
                }
            }
            copied.push(target);
        }

        Ok(copied)
    }

    /// Replaces troublesome characters in the names of every file in the UUID directory and
    /// collapses runs of underscores. Extensions are left untouched. Returns the renamed files.
    pub fn rename_objects(&mut self) -> Result<Vec<PathBuf>> {
        let result = self.rename_files();
        self.record_failure(result)
    }

    fn rename_files(&mut self) -> Result<Vec<PathBuf>> {
        self.start()?;

        let mut renamed = Vec::new();
        for file in files_beneath(self.package.uuid_dir())? {
            let name = file_name_str(&file);
            let new_name = match clean_file_name(name) {
                Some(new_name) => new_name,
                None => continue,
            };

            let target = file.with_file_name(&new_name);
            let old = self.package.relative_path(&file)?;
            let new = self.package.relative_path(&target)?;

            rename(&file, &target)?;
            self.log.record(format!(
                "EVENT = eventType=filename change, eventOutcomeDetailNote={} has been renamed to {} agentName={}",
                file.display(),
                target.display(),
                self.tool
            ))?;

            self.rename_in_manifests(&old, &new)?;
            renamed.push(target);
        }

        Ok(renamed)
    }

    /// Moves every file in a subfolder of `objects` to the root of `objects`, then deletes the
    /// emptied subfolders. Returns the moved files.
    pub fn flatten_objects(&mut self) -> Result<Vec<PathBuf>> {
        let result = self.flatten_files();
        self.record_failure(result)
    }

    fn flatten_files(&mut self) -> Result<Vec<PathBuf>> {
        let objects = self.package.objects_dir();
        let nested: Vec<PathBuf> = files_beneath(&objects)?
            .into_iter()
            .filter(|f| f.parent() != Some(objects.as_path()))
            .collect();

        if nested.is_empty() {
            info!("No files need to be moved in {}", objects.display());
            return Ok(nested);
        }

        let moved = self.move_files(&nested, &objects)?;

        for child in sorted_children(&objects)? {
            if !child.is_dir() {
                continue;
            }
            if files_beneath(&child)?.is_empty() {
                remove_dir_all(&child)?;
            } else {
                warn!("Not deleting {} as it still contains files", child.display());
            }
        }

        Ok(moved)
    }

    /// Logs the completion of the update and refreshes the event log's digest in the manifests
    pub fn finalize(mut self) -> Result<UpdateOutcome> {
        self.start()?;
        self.log.finished(&self.tool)?;

        for manifest in self.manifests() {
            if !refresh_digest(&manifest, self.log.path())? {
                self.unchanged.push(format!(
                    "event log digest in {}",
                    manifest.display()
                ));
            }
        }

        if !self.unchanged.is_empty() {
            warn!(
                "{} has not completed updating manifests",
                self.package.uuid_dir().display()
            );
        }

        Ok(UpdateOutcome {
            unchanged: self.unchanged,
        })
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.log.started(&self.tool)?;
            self.started = true;
        }
        Ok(())
    }

    /// Records a failed operation in the event log once the update has started
    fn record_failure<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.started {
                self.log.failed(&self.tool, e);
            }
        }
        result
    }

    fn manifests(&self) -> Vec<PathBuf> {
        let mut manifests = vec![self.package.md5_manifest()];
        if self.aip {
            manifests.push(self.package.sha512_manifest());
        }
        manifests
    }

    fn rename_in_manifests(&mut self, old: &str, new: &str) -> Result<()> {
        for manifest in self.manifests() {
            if rename_path(&manifest, old, new)? {
                self.log.record(format!(
                    "EVENT = eventType=metadata modification, agentName={}, eventDetail=the following path: {} has been updated with {} in the package manifest {}",
                    self.tool,
                    old,
                    new,
                    manifest.display()
                ))?;
                sort_manifest(&manifest)?;
            } else {
                self.unchanged.push(format!("{} in {}", old, manifest.display()));
            }
        }
        Ok(())
    }
}

impl UpdateOutcome {
    /// True when every manifest update took effect
    pub fn is_complete(&self) -> bool {
        self.unchanged.is_empty()
    }
}

/// The cleaned up form of an object's file name, or None if it needs no changes
pub fn clean_file_name(name: &str) -> Option<String> {
    clean_name(name, &RENAME_TRIGGERS, true)
}

fn file_name_of(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .ok_or_else(|| Error::UnsupportedFile { path: path.into() })
}

/// Every non-hidden file beneath `path`, or `path` itself if it is a file
fn files_beneath<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for file in WalkDir::new(path.as_ref())
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|f| f.depth() == 0 || !is_hidden_file(f.file_name()))
    {
        let file = file.context(WalkFileSnafu {})?;
        if file.file_type().is_file() {
            files.push(file.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::archive::digest::DigestAlgorithm;
    use crate::archive::error::Error;
    use crate::archive::identifiers::ObjectEntry;
    use crate::archive::manifest::Manifest;
    use crate::archive::package::{create_sip, Package, SipRequest};
    use crate::archive::update::*;
    use crate::archive::validate::validate_manifest;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sip(temp: &TempDir) -> Package {
        let source = temp.path().join("source");
        write(&source.join("reel1.mov"), "reel 1");
        write(&source.join("a,b#c.mov"), "reel 2");
        write(&source.join("dcp/nested/cpl.xml"), "cpl");

        create_sip(&SipRequest {
            object_entry: ObjectEntry::parse("oe1234").unwrap(),
            inputs: vec![
                source.join("reel1.mov"),
                source.join("a,b#c.mov"),
                source.join("dcp"),
            ],
            supplements: Vec::new(),
            output: temp.path().join("output"),
            user: "tester".into(),
        })
        .unwrap()
    }

    fn manifest_paths(manifest: &Path) -> Vec<String> {
        Manifest::read(manifest)
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.path.clone())
            .collect()
    }

    #[test]
    fn move_files_within_package() {
        let temp = TempDir::new().unwrap();
        let package = sip(&temp);
        let uuid = package.uuid().to_string();
        let reel = package.objects_dir().join("reel1.mov");
        let new_folder = package.objects_dir().join("reels");

        let mut updater = package.clone().update("tester");
        updater.move_into(&[&reel], &new_folder).unwrap();
        let outcome = updater.finalize().unwrap();

        assert!(outcome.is_complete());
        assert!(new_folder.join("reel1.mov").is_file());
        assert!(manifest_paths(&package.md5_manifest())
            .contains(&format!("{}/objects/reels/reel1.mov", uuid)));
        assert!(validate_manifest(package.md5_manifest()).unwrap().is_valid());

        let log = fs::read_to_string(package.event_log_path()).unwrap();
        assert!(log.contains("EVENT = package_update started"));
        assert!(log.contains("eventType=metadata modification"));
        assert!(log.contains("EVENT = package_update finished"));
    }

    #[test]
    fn copy_files_from_outside_updates_both_manifests() {
        let temp = TempDir::new().unwrap();
        let package = sip(&temp);
        Manifest::generate(
            package.uuid_dir(),
            package.container(),
            DigestAlgorithm::Sha512,
        )
        .unwrap()
        .write(package.sha512_manifest())
        .unwrap();

        let outside = temp.path().join("extra/notes.txt");
        write(&outside, "notes");
        let supplemental = package.supplemental_dir();

        let mut updater = package.clone().update("tester").with_aip(true);
        updater.copy_into(&[&outside], &supplemental).unwrap();
        assert!(updater.finalize().unwrap().is_complete());

        assert!(outside.is_file());
        let expected = format!("{}/metadata/supplemental/notes.txt", package.uuid());
        assert!(manifest_paths(&package.md5_manifest()).contains(&expected));
        assert!(manifest_paths(&package.sha512_manifest()).contains(&expected));
        assert!(validate_manifest(package.md5_manifest()).unwrap().is_valid());
        assert!(validate_manifest(package.sha512_manifest())
            .unwrap()
            .is_valid());
    }

    #[test]
    fn rename_objects_cleans_names() {
        let temp = TempDir::new().unwrap();
        let package = sip(&temp);

        let mut updater = package.clone().update("tester").with_tool("rename_objects");
        let renamed = updater.rename_objects().unwrap();
        updater.finalize().unwrap();

        assert_eq!(vec![package.objects_dir().join("a_b_c.mov")], renamed);
        assert!(validate_manifest(package.md5_manifest()).unwrap().is_valid());
    }

    #[test]
    fn flatten_moves_nested_files_to_objects_root() {
        let temp = TempDir::new().unwrap();
        let package = sip(&temp);

        let mut updater = package.clone().update("tester");
        let moved = updater.flatten_objects().unwrap();
        updater.finalize().unwrap();

        assert_eq!(vec![package.objects_dir().join("cpl.xml")], moved);
        assert!(!package.objects_dir().join("dcp").exists());
        assert!(validate_manifest(package.md5_manifest()).unwrap().is_valid());
    }

    #[test]
    fn flatten_stops_on_name_collision_and_records_failure() {
        let temp = TempDir::new().unwrap();
        let package = sip(&temp);
        let first = package.objects_dir().join("a/x.mov");
        let second = package.objects_dir().join("b/x.mov");
        write(&first, "first");
        write(&second, "second");

        let mut updater = package.clone().update("tester");
        let result = updater.flatten_objects();

        match result {
            Err(Error::AlreadyExists { path }) => {
                assert_eq!(package.objects_dir().join("x.mov"), path)
            }
            other => panic!("expected a name collision, got {:?}", other),
        }
        assert_eq!(
            "first",
            fs::read_to_string(package.objects_dir().join("x.mov")).unwrap()
        );
        assert!(second.is_file());

        let log = fs::read_to_string(package.event_log_path()).unwrap();
        assert!(log.contains("EVENT = package_update failed, eventOutcomeDetailNote="));
        assert!(!log.contains("EVENT = package_update finished"));
    }

    #[test]
    fn unchanged_manifest_updates_are_reported() {
        let temp = TempDir::new().unwrap();
        let package = sip(&temp);
        let stray = package.objects_dir().join("stray.mov");
        write(&stray, "not listed");

        let mut updater = package.clone().update("tester");
        updater
            .move_into(&[&stray], package.objects_dir().join("reels"))
            .unwrap();
        let outcome = updater.finalize().unwrap();

        assert!(!outcome.is_complete());
        assert_eq!(1, outcome.unchanged.len());
    }

    #[test]
    fn clean_names() {
        assert_eq!(Some("a _ b.mov".to_string()), clean_file_name("a & b.mov"));
        assert_eq!(Some("a_b.mov".to_string()), clean_file_name("a#%b.mov"));
        assert_eq!(Some("a_b.mov".to_string()), clean_file_name("a__b.mov"));
        assert_eq!(Some("a_b.tar.gz".to_string()), clean_file_name("a,b.tar.gz"));
        assert_eq!(None, clean_file_name("reel1.mov"));
        assert_eq!(None, clean_file_name("no_extension"));
    }
}
