use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use snafu::ResultExt;
use walkdir::WalkDir;

use crate::archive::consts::*;
use crate::archive::digest::DigestAlgorithm;
use crate::archive::encoding::to_manifest_path;
use crate::archive::error::*;
use crate::archive::event::EventLog;
use crate::archive::identifiers::{is_uuid, new_uuid, AccessionNumber, ObjectEntry, PackageKind};
use crate::archive::io::{
    copy, copy_dir, create_dir_all, file_name_str, is_hidden_file, rename, sorted_children,
};
use crate::archive::manifest::{add_file, refresh_digest, Manifest};
use crate::archive::register::{append_csv, create_csv, extract_filmographic};

const SIP_TOOL: &str = "sipcreator";
const AIP_TOOL: &str = "aipcreator";

/// A SIP or AIP on disk: a container directory holding a UUID directory and its sidecar manifests
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Package {
    container: PathBuf,
    uuid: String,
}

#[derive(Debug, Clone)]
pub struct SipRequest {
    pub object_entry: ObjectEntry,
    /// Files or directories copied into `objects`
    pub inputs: Vec<PathBuf>,
    /// Files copied into `metadata/supplemental`
    pub supplements: Vec<PathBuf>,
    /// The directory the package container is created in
    pub output: PathBuf,
    pub user: String,
}

/// One SIP of a batch, worked out before anything is written
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlannedSip {
    pub object_entry: ObjectEntry,
    pub source: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub supplements: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AccessionRequest {
    pub accession_number: AccessionNumber,
    /// Accession register CSV a row is appended to. It is created if it does not exist.
    pub register: PathBuf,
    pub user: String,
    /// Filmographic CSV to extract records from, and the `+` separated URNs to extract
    pub filmographic: Option<(PathBuf, String)>,
}

impl Package {
    pub fn new<P: AsRef<Path>, S: Into<String>>(container: P, uuid: S) -> Self {
        Self {
            container: container.as_ref().into(),
            uuid: uuid.into(),
        }
    }

    /// Looks in `dir` for a `<uuid>_manifest.md5` sidecar next to a `<uuid>` directory
    pub fn find<P: AsRef<Path>>(dir: P) -> Result<Option<Self>> {
        Ok(Self::find_all(dir)?.into_iter().next())
    }

    /// Every sidecar manifest and directory pair in `dir`
    pub fn find_all<P: AsRef<Path>>(dir: P) -> Result<Vec<Self>> {
        let dir = dir.as_ref();
        let mut packages = Vec::new();

        for child in sorted_children(dir)? {
            let name = file_name_str(&child);
            if !name.contains("manifest.md5") {
                continue;
            }
            let uuid = name.replace(MD5_MANIFEST_SUFFIX, "");
            if !uuid.is_empty() && dir.join(&uuid).is_dir() {
                packages.push(Self::new(dir, uuid));
            }
        }

        Ok(packages)
    }

    /// Opens the package at `path`, which may be either the container or the UUID directory
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.is_dir() {
            if let Some(package) = Self::find(path)? {
                return Ok(package);
            }

            let name = file_name_str(path);
            if let Some(parent) = path.parent() {
                if !name.is_empty() && parent.join(format!("{}{}", name, MD5_MANIFEST_SUFFIX)).is_file()
                {
                    return Ok(Self::new(parent, name));
                }
            }
        }

        Err(Error::NotAPackage { path: path.into() })
    }

    pub fn container(&self) -> &Path {
        &self.container
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// The name of the container, an object entry or accession number
    pub fn name(&self) -> &str {
        file_name_str(&self.container)
    }

    pub fn kind(&self) -> Option<PackageKind> {
        PackageKind::classify(self.name())
    }

    pub fn uuid_dir(&self) -> PathBuf {
        self.container.join(&self.uuid)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.uuid_dir().join(LOGS)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.uuid_dir().join(METADATA)
    }

    pub fn supplemental_dir(&self) -> PathBuf {
        self.metadata_dir().join(SUPPLEMENTAL)
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.uuid_dir().join(OBJECTS)
    }

    pub fn md5_manifest(&self) -> PathBuf {
        self.container
            .join(format!("{}{}", self.uuid, MD5_MANIFEST_SUFFIX))
    }

    pub fn sha512_manifest(&self) -> PathBuf {
        self.container
            .join(format!("{}{}", self.uuid, SHA512_MANIFEST_SUFFIX))
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.logs_dir()
            .join(format!("{}{}", self.uuid, SIP_LOG_SUFFIX))
    }

    pub fn event_log<S: Into<String>>(&self, user: S) -> EventLog {
        EventLog::new(self.event_log_path(), user)
    }

    /// The manifest form of a path inside the package, relative to the container
    pub fn relative_path<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        let relative = path
            .strip_prefix(&self.container)
            .map_err(|_| Error::PathOutsideBase {
                path: path.into(),
                base: self.container.clone(),
            })?;
        to_manifest_path(relative)
    }
}

/// Creates the `metadata`, `objects` and `logs` directories in `uuid_dir`
pub fn create_structure<P: AsRef<Path>>(uuid_dir: P) -> Result<()> {
    let uuid_dir = uuid_dir.as_ref();
    for dir in [METADATA, OBJECTS, LOGS] {
        create_dir_all(uuid_dir.join(dir))?;
    }
    Ok(())
}

/// Maps the name of every `oe` or `aaa` directory beneath `root` to the UUID of the package it
/// contains. The first subdirectory, by name, must be the UUID directory.
pub fn group_ids<P: AsRef<Path>>(root: P) -> Result<HashMap<String, String>> {
    let mut ids = HashMap::new();

    for entry in WalkDir::new(root.as_ref()).sort_by_file_name() {
        let entry = entry.context(WalkFileSnafu {})?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let name = file_name_str(entry.path());
        if !(name.starts_with(OE_PREFIX) || name.starts_with(ACCESSION_PREFIX)) {
            continue;
        }

        let first_dir = sorted_children(entry.path())?
            .into_iter()
            .find(|child| child.is_dir());

        if let Some(first_dir) = first_dir {
            let uuid = file_name_str(&first_dir);
            if is_uuid(uuid) {
                ids.insert(name.to_string(), uuid.to_string());
            }
        }
    }

    Ok(ids)
}

/// The first directory in `container` with a UUID length name
pub(crate) fn find_uuid_dir<P: AsRef<Path>>(container: P) -> Result<Option<PathBuf>> {
    Ok(sorted_children(container)?
        .into_iter()
        .find(|child| file_name_str(child).len() == UUID_LEN && child.is_dir()))
}

/// Builds a new SIP at `<output>/<object entry>/<uuid>`. Objects and supplements are copied,
/// every step is recorded in the event log, and an MD5 sidecar manifest is written.
pub fn create_sip(request: &SipRequest) -> Result<Package> {
    let container = request.output.join(request.object_entry.as_str());
    if container.exists() {
        return Err(Error::AlreadyExists { path: container });
    }

    let uuid = new_uuid();
    let package = Package::new(&container, &uuid);

    info!(
        "Creating SIP {} for {}",
        uuid,
        request.object_entry.as_str()
    );

    create_structure(package.uuid_dir())?;

    let log = package.event_log(&request.user);
    log.started(SIP_TOOL)?;
    log.record(format!(
        "EVENT = eventType=Identifier assignment, eventIdentifierType=UUID, value={}, module=uuid.uuid4",
        uuid
    ))?;
    log.record(format!(
        "EVENT = eventType=Identifier assignment, eventIdentifierType=object entry number, value={}",
        request.object_entry
    ))?;

    copy_inputs(&request.inputs, &package.objects_dir(), &log)?;

    if !request.supplements.is_empty() {
        create_dir_all(package.supplemental_dir())?;
        copy_inputs(&request.supplements, &package.supplemental_dir(), &log)?;
    }

    let md5_manifest = package.md5_manifest();
    log.record(format!(
        "EVENT = message digest calculation, eventDetail=MD5 checksum manifest of all files within the package, eventOutcome={}, agentName=hashlib",
        md5_manifest.display()
    ))?;

    Manifest::generate(package.uuid_dir(), &container, DigestAlgorithm::Md5)?
        .write(&md5_manifest)?;

    log.finished(SIP_TOOL)?;
    refresh_digest(&md5_manifest, log.path())?;

    Ok(package)
}

/// Works out the SIPs a batch run would create from the subdirectories of `source`, assigning
/// sequential object entry numbers starting at `first`. When `object_exts` is empty every file
/// in a subdirectory is an object. Otherwise objects and supplements are picked by extension.
pub fn plan_batch<P: AsRef<Path>>(
    source: P,
    first: &ObjectEntry,
    object_exts: &[String],
    supplement_exts: &[String],
) -> Result<Vec<PlannedSip>> {
    let source = source.as_ref();
    let mut next = first.number().ok_or_else(|| Error::InvalidObjectEntry {
        value: first.as_str().into(),
    })?;
    let mut plan = Vec::new();

    for folder in sorted_children(source)? {
        if !folder.is_dir() || is_hidden_name(&folder) {
            continue;
        }

        let mut inputs = Vec::new();
        let mut supplements = Vec::new();

        for file in sorted_children(&folder)? {
            if is_hidden_name(&file) {
                continue;
            }
            if object_exts.is_empty() {
                inputs.push(file);
                continue;
            }

            let ext = file
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_lowercase();

            if object_exts.contains(&ext) {
                inputs.push(file.clone());
            }
            if supplement_exts.contains(&ext) {
                supplements.push(file);
            }
        }

        if inputs.is_empty() {
            warn!(
                "Skipping {} as it contains no matching objects",
                folder.display()
            );
            continue;
        }

        plan.push(PlannedSip {
            object_entry: ObjectEntry::from_number(next)?,
            source: folder,
            inputs,
            supplements,
        });
        next += 1;
    }

    Ok(plan)
}

/// Creates every SIP in a batch plan
pub fn run_batch<P: AsRef<Path>>(plan: &[PlannedSip], output: P, user: &str) -> Result<Vec<Package>> {
    let output = output.as_ref();
    plan.iter()
        .map(|planned| {
            create_sip(&SipRequest {
                object_entry: planned.object_entry.clone(),
                inputs: planned.inputs.clone(),
                supplements: planned.supplements.clone(),
                output: output.into(),
                user: user.into(),
            })
        })
        .collect()
}

/// Turns a SIP into an AIP: the container is renamed to the accession number, the accession is
/// registered, and a SHA-512 sidecar manifest is added. The package is read once to produce both
/// digests, and accessioning stops before the rename if the MD5 sidecar does not match.
pub fn accession(package: &Package, request: &AccessionRequest) -> Result<Package> {
    let object_entry = ObjectEntry::parse(package.name())?;

    let mut manifests = Manifest::generate_all(
        package.uuid_dir(),
        package.container(),
        &[DigestAlgorithm::Md5, DigestAlgorithm::Sha512],
    )?;
    let sha512 = manifests.pop().unwrap_or_else(|| Manifest::new(DigestAlgorithm::Sha512));
    let md5 = manifests.pop().unwrap_or_else(|| Manifest::new(DigestAlgorithm::Md5));

    let md5_manifest = package.md5_manifest();
    let diff = Manifest::read(&md5_manifest)?.diff(&md5);
    if !diff.is_empty() {
        return Err(Error::ManifestMismatch {
            path: md5_manifest,
            count: diff.only_left.len() + diff.only_right.len(),
        });
    }

    let parent = package
        .container()
        .parent()
        .unwrap_or_else(|| Path::new(""));
    let accession_path = parent.join(request.accession_number.as_str());

    rename(package.container(), &accession_path)?;
    let aip = Package::new(&accession_path, package.uuid());

    let log = aip.event_log(&request.user);
    log.started(AIP_TOOL)?;

    match complete_accession(&aip, request, &object_entry, &sha512, &log) {
        Ok(()) => Ok(aip),
        Err(e) => {
            log.failed(AIP_TOOL, &e);
            Err(e)
        }
    }
}

fn complete_accession(
    aip: &Package,
    request: &AccessionRequest,
    object_entry: &ObjectEntry,
    sha512: &Manifest,
    log: &EventLog,
) -> Result<()> {
    if !request.register.exists() {
        new_register(&request.register)?;
    }
    let mut row = vec![
        object_entry.register_form(),
        request.accession_number.to_string(),
    ];
    row.resize(REGISTER_HEADERS.len(), String::new());
    append_csv(&request.register, &row)?;

    log.record(format!(
        "EVENT = eventType=Identifier assignment, eventIdentifierType=accession number, value={}",
        request.accession_number
    ))?;
    log.record(format!(
        "EVENT = eventType=Accession, eventIdentifierType=accession number, value={}",
        request.accession_number
    ))?;
    log.record("EVENT = eventType=Information package creation")?;

    let md5_manifest = aip.md5_manifest();
    let sha512_manifest = aip.sha512_manifest();

    log.record(format!(
        "EVENT = message digest calculation, eventDetail=SHA512 checksum manifest of all files within the package, eventOutcome={}, agentName=hashlib",
        sha512_manifest.display()
    ))?;
    sha512.write(&sha512_manifest)?;

    if let Some((filmographic_csv, urns)) = &request.filmographic {
        for urn in urns.split('+').map(|u| u.trim().to_uppercase()) {
            if urn.is_empty() {
                continue;
            }
            let dest = aip
                .metadata_dir()
                .join(format!("{}{}", urn, FILMOGRAPHIC_SUFFIX));
            if extract_filmographic(filmographic_csv, &urn, &dest)? {
                log.record(format!(
                    "EVENT = Metadata extraction - eventDetail=Filmographic descriptive metadata added to metadata folder, eventOutcome={}, agentName={}",
                    dest.display(),
                    AIP_TOOL
                ))?;
                add_file(&md5_manifest, &dest)?;
                add_file(&sha512_manifest, &dest)?;
            } else {
                warn!(
                    "Filmographic URN {} not found in {}",
                    urn,
                    filmographic_csv.display()
                );
            }
        }
    }

    log.finished(AIP_TOOL)?;
    refresh_digest(&md5_manifest, log.path())?;
    refresh_digest(&sha512_manifest, log.path())?;

    Ok(())
}

/// Creates an empty accession register
pub fn new_register<P: AsRef<Path>>(path: P) -> Result<()> {
    create_csv(path, &REGISTER_HEADERS[..])
}

fn copy_inputs(inputs: &[PathBuf], dest: &Path, log: &EventLog) -> Result<()> {
    for input in inputs {
        let name = input
            .file_name()
            .ok_or_else(|| Error::UnsupportedFile {
                path: input.clone(),
            })?;
        let target = dest.join(name);

        if input.is_dir() {
            copy_dir(input, &target)?;
        } else {
            copy(input, &target)?;
        }

        log.record(format!(
            "EVENT = eventType=file movement, eventOutcomeDetailNote={} has been copied into {}, agentName=ifiscripts",
            input.display(),
            dest.display()
        ))?;
    }
    Ok(())
}

fn is_hidden_name(path: &Path) -> bool {
    path.file_name().map(is_hidden_file).unwrap_or(false)
}
