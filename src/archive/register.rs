//! CSV registers: accession registers, helper registers built from catalogue exports, and the
//! list of packages held in preservation storage.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use log::{info, warn};
use snafu::ResultExt;

use crate::archive::consts::*;
use crate::archive::error::*;
use crate::archive::event::identifiers_from_log;
use crate::archive::io::{file_name_str, sorted_children};
use crate::archive::package::find_uuid_dir;

/// A CSV row keyed by column header
pub type Record = HashMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Record>,
}

/// Which identifier a register check is keyed on
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegisterKey {
    AccessionNumber,
    ObjectEntry,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RegisterIssue {
    /// The register maps one key to several values
    Conflict {
        key_kind: RegisterKey,
        key: String,
        values: Vec<String>,
        /// The value the reference has for the key, if it has the key
        correct: Option<String>,
    },
    /// The register and the reference map the key to different values
    Mismatch {
        key_kind: RegisterKey,
        key: String,
        expected: String,
        found: String,
    },
}

impl CsvTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Reads a CSV with a header row. Short rows are padded with empty values.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .context(CsvSnafu { path })?;

        let headers: Vec<String> = reader
            .headers()
            .context(CsvSnafu { path })?
            .iter()
            .map(String::from)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context(CsvSnafu { path })?;
            let row = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), record.get(i).unwrap_or_default().to_string()))
                .collect();
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!("Writing CSV {}", path.display());

        let mut writer = csv::Writer::from_path(path).context(CsvSnafu { path })?;
        writer
            .write_record(&self.headers)
            .context(CsvSnafu { path })?;
        for row in &self.rows {
            writer
                .write_record(
                    self.headers
                        .iter()
                        .map(|h| row.get(h).map(String::as_str).unwrap_or_default()),
                )
                .context(CsvSnafu { path })?;
        }
        writer.flush().context(IoWriteSnafu { path })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Record> {
        &mut self.rows
    }

    pub fn push(&mut self, row: Record) {
        self.rows.push(row);
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Stable sort of the rows by the values in `column`. `path` only feeds the error message.
    pub fn sort_by(&mut self, column: &str, path: &Path) -> Result<()> {
        self.require(column, path)?;
        self.rows
            .sort_by(|a, b| a.get(column).cmp(&b.get(column)));
        Ok(())
    }

    fn require(&self, column: &str, path: &Path) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(Error::MissingColumn {
                column: column.into(),
                path: path.into(),
            })
        }
    }
}

/// Creates a CSV containing a single row, replacing any existing file
pub fn create_csv<P: AsRef<Path>, S: AsRef<str>>(path: P, row: &[S]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).context(CsvSnafu { path })?;
    writer
        .write_record(row.iter().map(|v| v.as_ref()))
        .context(CsvSnafu { path })?;
    writer.flush().context(IoWriteSnafu { path })
}

/// Appends a row to a CSV, creating the file if it does not exist
pub fn append_csv<P: AsRef<Path>, S: AsRef<str>>(path: P, row: &[S]) -> Result<()> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(IoCreateSnafu { path })?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(row.iter().map(|v| v.as_ref()))
        .context(CsvSnafu { path })?;
    writer.flush().context(IoWriteSnafu { path })
}

/// Writes a copy of the CSV sorted by `key` next to it as `<stem>_sorted.csv`
pub fn sort_csv<P: AsRef<Path>>(path: P, key: &str) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut table = CsvTable::read(path)?;
    table.sort_by(key, path)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let sorted = path.with_file_name(format!("{}_sorted.csv", stem));
    table.write(&sorted)?;
    Ok(sorted)
}

/// Merges CSVs into `output`, sorted by `key`. The columns of the first input are used.
pub fn merge_csv<P: AsRef<Path>, O: AsRef<Path>>(inputs: &[P], key: &str, output: O) -> Result<()> {
    let mut merged: Option<CsvTable> = None;

    for input in inputs {
        let table = CsvTable::read(input)?;
        match merged.as_mut() {
            None => merged = Some(table),
            Some(merged) => merged.rows.extend(table.rows),
        }
    }

    let output = output.as_ref();
    let mut merged = merged.unwrap_or_default();
    merged.sort_by(key, output)?;
    merged.write(output)
}

/// Fills in a sorted accessions CSV from the technical (PBCore) and filmographic CSVs that
/// describe the same accessions. The accession date defaults to the day the sorted CSV was last
/// modified.
pub fn build_helper_register<S, P, F>(
    sorted: S,
    pbcore: P,
    filmo: F,
    accessioned_date: Option<&str>,
) -> Result<CsvTable>
where
    S: AsRef<Path>,
    P: AsRef<Path>,
    F: AsRef<Path>,
{
    let sorted = sorted.as_ref();
    let mut register = CsvTable::read(sorted)?;
    let technical = CsvTable::read(pbcore)?;
    let filmographic = CsvTable::read(filmo)?;

    register.require(COL_ACCESSION_NUMBER, sorted)?;

    let accessioned_date = match accessioned_date {
        Some(date) => date.to_string(),
        None => file_modified_date(sorted)?,
    };

    for accession in &mut register.rows {
        let number = field(accession, COL_ACCESSION_NUMBER).to_string();
        accession.insert("date accessioned".into(), accessioned_date.clone());

        for record in technical
            .rows
            .iter()
            .filter(|r| field(r, "Accession Number") == number)
        {
            let method = field(record, "Type Of Deposit").to_string();
            accession.insert("acquisition method".into(), method.clone());
            accession.insert("acquired from".into(), field(record, "Donor").into());
            accession.insert(
                "date acquired".into(),
                normalize_donation_date(field(record, "Date Of Donation")),
            );

            for film in filmographic
                .rows
                .iter()
                .filter(|f| field(f, COL_FILMOGRAPHIC_URN) == field(record, "Reference Number"))
            {
                let title = if field(film, "Title/Name").is_empty() {
                    format!(
                        "{}; {}",
                        field(film, "Series Title"),
                        field(film, "Episode No")
                    )
                } else {
                    field(film, "Title/Name").to_string()
                };

                let mut simple = format!(
                    "{} ({}) | {}",
                    title,
                    field(film, "Year"),
                    field(record, "dig_object_descrip")
                );
                if method == "Reproduction" {
                    simple.push_str(&format!(
                        " | Reproduction of {}",
                        field(record, "TTape Origin")
                    ));
                }
                accession.insert(REGISTER_HEADERS[6].into(), simple);
            }
        }
    }

    Ok(register)
}

/// The local modification date of a file as `%Y-%m-%d`
pub fn file_modified_date<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .context(IoStatSnafu { path })?;
    Ok(DateTime::<Local>::from(modified)
        .format("%Y-%m-%d")
        .to_string())
}

/// Compares the accession number to object entry mappings in `register` with those in
/// `reference`, which is usually a preservation storage list. Both directions are checked.
pub fn check_register<R: AsRef<Path>, G: AsRef<Path>>(
    reference: R,
    register: G,
) -> Result<Vec<RegisterIssue>> {
    let (reference_by_aaa, reference_by_oe) = mappings(reference.as_ref())?;
    let (register_by_aaa, register_by_oe) = mappings(register.as_ref())?;

    let mut issues = compare(RegisterKey::AccessionNumber, &reference_by_aaa, &register_by_aaa);
    issues.extend(compare(RegisterKey::ObjectEntry, &reference_by_oe, &register_by_oe));
    Ok(issues)
}

/// Lists every accessioned package in `root` with the identifiers recorded in its event log
pub fn preservation_storage_list<P: AsRef<Path>>(root: P) -> Result<CsvTable> {
    let mut table = CsvTable::new(vec![
        COL_PACKAGE.into(),
        COL_ACCESSION_NUMBER.into(),
        COL_OBJECT_ENTRY.into(),
    ]);

    for package in sorted_children(root)? {
        let name = file_name_str(&package);
        if !package.is_dir() || !name.starts_with(ACCESSION_PREFIX) {
            continue;
        }

        let mut row = Record::new();
        row.insert(COL_PACKAGE.into(), name.to_string());

        match find_identifying_log(&package)? {
            Some(log) => {
                let ids = identifiers_from_log(&log)?;
                row.insert(
                    COL_ACCESSION_NUMBER.into(),
                    ids.accession_number.unwrap_or_default(),
                );
                row.insert(COL_OBJECT_ENTRY.into(), ids.object_entry.unwrap_or_default());
            }
            None => warn!("No event log found in {}", package.display()),
        }

        table.push(row);
    }

    Ok(table)
}

/// Copies the rows of the filmographic CSV whose URN contains `urn` into `dest`. Returns false,
/// and writes nothing, when there are no such rows.
pub fn extract_filmographic<F: AsRef<Path>, D: AsRef<Path>>(
    filmo_csv: F,
    urn: &str,
    dest: D,
) -> Result<bool> {
    let filmo_csv = filmo_csv.as_ref();
    let source = CsvTable::read(filmo_csv)?;
    source.require(COL_FILMOGRAPHIC_URN, filmo_csv)?;

    let mut extracted = CsvTable::new(source.headers.clone());
    for row in &source.rows {
        if field(row, COL_FILMOGRAPHIC_URN).to_uppercase().contains(urn) {
            extracted.push(row.clone());
        }
    }

    if extracted.rows.is_empty() {
        return Ok(false);
    }

    extracted.write(dest)?;
    Ok(true)
}

impl Display for RegisterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterKey::AccessionNumber => write!(f, "accession number"),
            RegisterKey::ObjectEntry => write!(f, "object entry number"),
        }
    }
}

impl RegisterKey {
    fn other(&self) -> RegisterKey {
        match self {
            RegisterKey::AccessionNumber => RegisterKey::ObjectEntry,
            RegisterKey::ObjectEntry => RegisterKey::AccessionNumber,
        }
    }
}

impl Display for RegisterIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterIssue::Conflict {
                key_kind,
                key,
                values,
                correct,
            } => {
                write!(
                    f,
                    "{} {} maps to multiple {} values: {}",
                    key_kind,
                    key,
                    key_kind.other(),
                    values.join(", ")
                )?;
                match correct {
                    Some(correct) if values.contains(correct) => {
                        write!(f, " (the correct value is {})", correct)
                    }
                    Some(_) => write!(f, " (the correct value is not among them)"),
                    None => Ok(()),
                }
            }
            RegisterIssue::Mismatch {
                key_kind,
                key,
                expected,
                found,
            } => write!(
                f,
                "Mismatch: {} {} maps to {} in the reference but to {} in the register",
                key_kind, key, expected, found
            ),
        }
    }
}

type Mapping = BTreeMap<String, Vec<String>>;

/// Distinct values per key, both ways round, in first seen order
fn mappings(path: &Path) -> Result<(Mapping, Mapping)> {
    let table = CsvTable::read(path)?;
    table.require(COL_ACCESSION_NUMBER, path)?;
    table.require(COL_OBJECT_ENTRY, path)?;

    let mut by_aaa = Mapping::new();
    let mut by_oe = Mapping::new();

    for row in &table.rows {
        let aaa = field(row, COL_ACCESSION_NUMBER);
        let oe = field(row, COL_OBJECT_ENTRY);
        push_distinct(&mut by_aaa, aaa, oe);
        push_distinct(&mut by_oe, oe, aaa);
    }

    Ok((by_aaa, by_oe))
}

fn push_distinct(mapping: &mut Mapping, key: &str, value: &str) {
    let values = mapping.entry(key.to_string()).or_default();
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

fn compare(key_kind: RegisterKey, reference: &Mapping, register: &Mapping) -> Vec<RegisterIssue> {
    let mut issues = Vec::new();

    for (key, values) in register {
        // The reference is taken to be correct; its last value wins
        let correct = reference.get(key).and_then(|v| v.last()).cloned();

        if values.len() > 1 {
            issues.push(RegisterIssue::Conflict {
                key_kind,
                key: key.clone(),
                values: values.clone(),
                correct,
            });
        } else if let (Some(expected), Some(found)) = (correct, values.first()) {
            if &expected != found {
                issues.push(RegisterIssue::Mismatch {
                    key_kind,
                    key: key.clone(),
                    expected,
                    found: found.clone(),
                });
            }
        }
    }

    issues
}

fn find_identifying_log(package: &Path) -> Result<Option<PathBuf>> {
    let logs_dir = match find_uuid_dir(package)? {
        Some(uuid_dir) => uuid_dir.join(LOGS),
        None => return Ok(None),
    };
    if !logs_dir.is_dir() {
        return Ok(None);
    }

    Ok(sorted_children(&logs_dir)?.into_iter().find(|log| {
        let name = file_name_str(log);
        name.ends_with(SEQ2FFV1_LOG_SUFFIX) || name.ends_with(SIP_LOG_SUFFIX)
    }))
}

fn field<'a>(row: &'a Record, column: &str) -> &'a str {
    row.get(column).map(String::as_str).unwrap_or_default()
}

fn normalize_donation_date(value: &str) -> String {
    NaiveDate::parse_from_str(value, "%d/%m/%Y")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| value.to_string())
}
