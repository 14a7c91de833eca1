//! Package event logs and the text reports that accompany batch operations.
//!
//! An event log lives at `<uuid>/logs/<uuid>_sip_log.log` and holds one event per line in the
//! form `YYYY-MM-DDTHH:MM:SS <user> <message> `.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info};

use crate::archive::consts::*;
use crate::archive::error::*;
use crate::archive::identifiers::is_uuid;
use crate::archive::io::{append_line, file_name_str, read_lines, write_lines};
use crate::archive::manifest::refresh_digest;

#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
    user: String,
}

/// Where a package came from, according to the `source=` events in its log
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Lineage {
    Child { package: String, parent: String },
    Orphan { package: String },
    /// The log names a source UUID that does not belong to any known package
    Unknown { package: String },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LosslessOutcome {
    Lossless,
    Lossy,
}

/// Identifiers recorded in an event log
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct LoggedIdentifiers {
    pub accession_number: Option<String>,
    pub object_entry: Option<String>,
}

/// The login name of the current user, or `unknown`
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into())
}

impl EventLog {
    pub fn new<P: AsRef<Path>, S: Into<String>>(path: P, user: S) -> Self {
        Self {
            path: path.as_ref().into(),
            user: user.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Appends a timestamped event, creating the log if needed
    pub fn record<S: AsRef<str>>(&self, message: S) -> Result<()> {
        let line = format!(
            "{} {} {} ",
            Local::now().format(LOG_DATE_FORMAT),
            self.user,
            message.as_ref()
        );
        append_line(&self.path, &line)
    }

    /// Records the start of a tool run and the agent running it
    pub fn started(&self, tool: &str) -> Result<()> {
        self.record(format!("EVENT = {} started", tool))?;
        self.record(format!("{}{}", AGENT_MARKER, self.user))
    }

    pub fn finished(&self, tool: &str) -> Result<()> {
        self.record(format!("EVENT = {} finished", tool))
    }

    /// Records that a tool run stopped part way through. A failure to write the event is logged
    /// rather than returned, so that the original error reaches the caller.
    pub fn failed(&self, tool: &str, cause: &Error) {
        let recorded = self.record(format!(
            "EVENT = {} failed, eventOutcomeDetailNote={}",
            tool, cause
        ));
        if let Err(e) = recorded {
            error!("Failed to record the failure of {} in {}: {}", tool, self.path.display(), e);
        }
    }
}

/// Appends a plain line to a text report, creating it if needed
pub fn append_report_line<P: AsRef<Path>>(report: P, line: &str) -> Result<()> {
    append_line(report, line)
}

/// A report path in `dir` named after the tool and the current time, eg
/// `batchvalidate_report_2022_01_31T13_05_09.txt`
pub fn timestamped_report<P: AsRef<Path>>(dir: P, prefix: &str, extension: &str) -> PathBuf {
    dir.as_ref().join(format!(
        "{}_{}.{}",
        prefix,
        Local::now().format(REPORT_DATE_FORMAT),
        extension
    ))
}

/// Prepends the lines of `source` to `target`, then refreshes `target`'s digest in `manifest`
pub fn merge_logs<S, T, M>(source: S, target: T, manifest: M) -> Result<()>
where
    S: AsRef<Path>,
    T: AsRef<Path>,
    M: AsRef<Path>,
{
    let target = target.as_ref();
    let mut lines = read_lines(source.as_ref())?;
    lines.extend(read_lines(target)?);
    info!(
        "Merging {} into the start of {}",
        source.as_ref().display(),
        target.display()
    );
    write_lines(target, &lines)?;
    refresh_digest(manifest, target)?;
    Ok(())
}

/// Appends the lines of `source` to `target`, then refreshes `target`'s digest in `manifest`
pub fn merge_logs_append<S, T, M>(source: S, target: T, manifest: M) -> Result<()>
where
    S: AsRef<Path>,
    T: AsRef<Path>,
    M: AsRef<Path>,
{
    let target = target.as_ref();
    let mut lines = read_lines(target)?;
    lines.extend(read_lines(source.as_ref())?);
    info!(
        "Merging {} into the end of {}",
        source.as_ref().display(),
        target.display()
    );
    write_lines(target, &lines)?;
    refresh_digest(manifest, target)?;
    Ok(())
}

/// The agent name recorded within the first five lines of a log, if any
pub fn find_concat_user<P: AsRef<Path>>(log: P) -> Result<Option<String>> {
    let mut user = None;
    for line in read_lines(log)?.iter().take(5) {
        if line.contains(AGENT_MARKER) {
            if let Some((_, value)) = line.split_once("agentName=") {
                user = Some(value.trim_end().to_string());
            }
        }
    }
    Ok(user)
}

/// Works out whether the package that owns `log` was derived from another package. `ids` maps
/// package container names to their UUIDs, see `package::group_ids`.
pub fn find_parent<P: AsRef<Path>>(log: P, ids: &HashMap<String, String>) -> Result<Lineage> {
    let log = log.as_ref();
    let package = log
        .ancestors()
        .nth(3)
        .map(file_name_str)
        .unwrap_or_default()
        .to_string();

    let mut has_source = false;

    for line in read_lines(log)? {
        if !line.contains("source=") {
            continue;
        }
        let trimmed = line.trim_end();
        let tail = trimmed
            .char_indices()
            .rev()
            .nth(UUID_LEN - 1)
            .map(|(i, _)| &trimmed[i..])
            .unwrap_or("");

        if is_uuid(tail) {
            has_source = true;
            if let Some((parent, _)) = ids.iter().find(|(_, uuid)| uuid.as_str() == tail) {
                return Ok(Lineage::Child {
                    package,
                    parent: parent.clone(),
                });
            }
        }
    }

    if has_source {
        Ok(Lineage::Unknown { package })
    } else {
        Ok(Lineage::Orphan { package })
    }
}

/// The first existing log in `logs_dir` for the given base name. Packages made by different
/// tools name their logs differently.
pub fn find_log<P: AsRef<Path>>(logs_dir: P, basename: &str) -> Option<PathBuf> {
    let logs_dir = logs_dir.as_ref();
    [".mov_log.log", "_log.log", ".mxf_log.log", SIP_LOG_SUFFIX, ".mkv_log.log"]
        .iter()
        .map(|suffix| logs_dir.join(format!("{}{}", basename, suffix)))
        .find(|path| path.is_file())
}

/// The accession number and object entry recorded in a log. The value is the text after the
/// last `=` on the identifying line.
pub fn identifiers_from_log<P: AsRef<Path>>(log: P) -> Result<LoggedIdentifiers> {
    let mut ids = LoggedIdentifiers::default();

    for line in read_lines(log)? {
        let value = || line.rsplit('=').next().map(|v| v.trim().to_string());
        if line.contains(ACCESSION_ID_MARKER) {
            ids.accession_number = value();
        }
        if OE_ID_MARKERS.iter().any(|m| line.contains(m)) {
            ids.object_entry = value();
        }
    }

    Ok(ids)
}

/// The first lossless or lossy outcome recorded in a log
pub fn lossless_outcome<P: AsRef<Path>>(log: P) -> Result<Option<LosslessOutcome>> {
    for line in read_lines(log)? {
        if line.contains(LOSSLESS_MARKER) {
            return Ok(Some(LosslessOutcome::Lossless));
        } else if line.contains(LOSSY_MARKER) {
            return Ok(Some(LosslessOutcome::Lossy));
        }
    }
    Ok(None)
}

impl Display for Lineage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Lineage::Child { package, parent } => write!(f, "{} has a parent: {} ", package, parent),
            Lineage::Orphan { package } => write!(f, "{} not a child of another package", package),
            Lineage::Unknown { package } => {
                write!(f, "{} has a parent that is not in this collection", package)
            }
        }
    }
}

impl Display for LosslessOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LosslessOutcome::Lossless => write!(f, "lossless"),
            LosslessOutcome::Lossy => write!(f, "lossy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::TempDir;

    use crate::archive::event::*;

    const PARENT_UUID: &str = "0c2b3d1e-7b6c-4a55-9a2a-4f1b0a3c9d10";

    #[test]
    fn record_events() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::new(temp.path().join("uuid_sip_log.log"), "kieran");

        log.started("package_update").unwrap();
        log.finished("package_update").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(3, lines.len());
        assert!(lines[0].ends_with(" kieran EVENT = package_update started "));
        assert!(lines[1].ends_with(" kieran EVENT = agentName=kieran "));
        assert_eq!(20, lines[2].find("kieran").unwrap());
    }

    #[test]
    fn merge_prepends_and_appends() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.log");
        let target = temp.path().join("uuid/logs/target.log");
        let manifest = temp.path().join("uuid_manifest.md5");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&source, "s\n").unwrap();
        fs::write(&target, "t\n").unwrap();
        fs::write(
            &manifest,
            "b1946ac92492d2347c6235b4d2611184  uuid/logs/target.log\n",
        )
        .unwrap();

        merge_logs(&source, &target, &manifest).unwrap();
        assert_eq!("s\nt\n", fs::read_to_string(&target).unwrap());

        merge_logs_append(&source, &target, &manifest).unwrap();
        assert_eq!("s\nt\ns\n", fs::read_to_string(&target).unwrap());

        let expected = crate::archive::digest::digest_file(
            &target,
            crate::archive::digest::DigestAlgorithm::Md5,
        )
        .unwrap();
        assert_eq!(
            format!("{}  uuid/logs/target.log\n", expected),
            fs::read_to_string(&manifest).unwrap()
        );
    }

    #[test]
    fn concat_user_from_first_lines() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("concat.log");
        fs::write(
            &log,
            "2020-01-01T00:00:00 a EVENT = concat.py started \n2020-01-01T00:00:00 a EVENT = agentName=Raelene \n",
        )
        .unwrap();

        assert_eq!(Some("Raelene".to_string()), find_concat_user(&log).unwrap());
    }

    #[test]
    fn parent_lookup() {
        let temp = TempDir::new().unwrap();
        let logs = temp.path().join("oe1235/uuid/logs");
        fs::create_dir_all(&logs).unwrap();
        let log = logs.join("uuid_sip_log.log");
        fs::write(
            &log,
            format!("2020-01-01T00:00:00 a EVENT = eventType=creation, source={PARENT_UUID}\n"),
        )
        .unwrap();

        let mut ids = HashMap::new();
        ids.insert("oe1234".to_string(), PARENT_UUID.to_string());

        assert_eq!(
            "oe1235 has a parent: oe1234 ",
            find_parent(&log, &ids).unwrap().to_string()
        );

        fs::write(&log, "2020-01-01T00:00:00 a EVENT = started\n").unwrap();
        assert_eq!(
            Lineage::Orphan {
                package: "oe1235".into()
            },
            find_parent(&log, &ids).unwrap()
        );
    }

    #[test]
    fn parent_outside_collection_is_unknown() {
        let temp = TempDir::new().unwrap();
        let logs = temp.path().join("oe1235/uuid/logs");
        fs::create_dir_all(&logs).unwrap();
        let log = logs.join("uuid_sip_log.log");
        fs::write(
            &log,
            format!("2020-01-01T00:00:00 a EVENT = eventType=creation, source={PARENT_UUID}\n"),
        )
        .unwrap();

        let mut ids = HashMap::new();
        ids.insert(
            "oe1234".to_string(),
            "00000000-0000-4000-8000-000000000000".to_string(),
        );

        let lineage = find_parent(&log, &ids).unwrap();
        assert_eq!(
            Lineage::Unknown {
                package: "oe1235".into()
            },
            lineage
        );
        assert_eq!(
            "oe1235 has a parent that is not in this collection",
            lineage.to_string()
        );
    }

    #[test]
    fn find_log_in_candidate_order() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("reel_sip_log.log"), "a").unwrap();
        fs::write(temp.path().join("reel_log.log"), "a").unwrap();

        assert_eq!(
            Some(temp.path().join("reel_log.log")),
            find_log(temp.path(), "reel")
        );
        assert_eq!(None, find_log(temp.path(), "other"));
    }

    #[test]
    fn identifiers_and_outcomes() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("uuid_sip_log.log");
        fs::write(
            &log,
            "t u EVENT = eventType=Identifier assignment, eventIdentifierType=object entry number, value=oe1234 \n\
             t u EVENT = eventType=Accession, eventIdentifierType=accession number, value=aaa0001 \n\
             t u EVENT = eventType=losslessness verification, eventOutcome=lossless \n",
        )
        .unwrap();

        let ids = identifiers_from_log(&log).unwrap();
        assert_eq!(Some("aaa0001".to_string()), ids.accession_number);
        assert_eq!(Some("oe1234".to_string()), ids.object_entry);
        assert_eq!(
            Some(LosslessOutcome::Lossless),
            lossless_outcome(&log).unwrap()
        );
    }
}
