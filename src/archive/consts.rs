use once_cell::sync::Lazy;
use regex::Regex;

pub static UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"__+").unwrap());

pub const BUF_SIZE: usize = 1024 * 1024;
pub const UUID_LEN: usize = 36;

pub const MANIFEST_SEPARATOR: &str = "  ";
pub const LOG_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const REPORT_DATE_FORMAT: &str = "%Y_%m_%dT%H_%M_%S";

// Package layout
pub const LOGS: &str = "logs";
pub const METADATA: &str = "metadata";
pub const OBJECTS: &str = "objects";
pub const SUPPLEMENTAL: &str = "supplemental";

// Filename suffixes
pub const MD5_MANIFEST_SUFFIX: &str = "_manifest.md5";
pub const SHA512_MANIFEST_SUFFIX: &str = "_manifest-sha512.txt";
pub const MODIFIED_MANIFEST_SUFFIX: &str = "_modified_manifest.md5";
pub const SIP_LOG_SUFFIX: &str = "_sip_log.log";
pub const SEQ2FFV1_LOG_SUFFIX: &str = "_seq2ffv1_log.log";
pub const SHELL_SUFFIX: &str = "_shell";
pub const FILMOGRAPHIC_SUFFIX: &str = "_filmographic.csv";

// Substrings that mark a line as referring to a package's own manifests
pub const MANIFEST_MARKERS: [&str; 2] = ["manifest-sha512.txt", "manifest.md5"];

// Identifier prefixes
pub const OE_PREFIX: &str = "oe";
pub const SC_OE_PREFIX: &str = "scoe";
pub const ACCESSION_PREFIX: &str = "aaa";

// Characters replaced with `_` when cleaning up object file names
pub const RENAME_TRIGGERS: [char; 18] = [
    ',', '#', '%', '&', '\'', '*', '+', '/', ':', '?', '@', '<', '>', '|', '"', '©', '\u{f022}', '▒',
];

// Characters replaced with `_` in the names of files and directories in raw packages
pub const SANITIZE_TRIGGERS: [char; 18] = [
    ' ', '#', '%', '&', '\'', '*', '+', '/', ':', '?', '@', '<', '>', '|', '"', '©', '(', ')',
];

// Characters dropped from raw package names
pub const PACKAGE_NAME_TRIGGERS: [char; 19] = [
    ',', '#', '%', '&', '\'', '*', '+', '/', ':', '?', '@', '<', '>', '|', '"', '©', '(', ')',
    '\u{f022}',
];

pub const JUNK_FILES: [&str; 3] = [".DS_Store", "Thumbs.db", "desktop.ini"];

// Event log markers
pub const AGENT_MARKER: &str = "EVENT = agentName=";
pub const ACCESSION_ID_MARKER: &str = "eventIdentifierType=accession number,";
pub const OE_ID_MARKERS: [&str; 2] = [
    "eventIdentifierType=object entry,",
    "eventIdentifierType=object entry number,",
];
pub const LOSSLESS_MARKER: &str = "eventOutcome=lossless";
pub const LOSSY_MARKER: &str = "eventOutcome=lossy";

// Register columns
pub const COL_ACCESSION_NUMBER: &str = "accession number";
pub const COL_OBJECT_ENTRY: &str = "object entry number";
pub const COL_PACKAGE: &str = "package";
pub const COL_FILMOGRAPHIC_URN: &str = "Filmographic URN";

pub const REGISTER_HEADERS: [&str; 8] = [
    "entry number",
    "accession number",
    "date acquired",
    "date accessioned",
    "acquired from",
    "acquisition method",
    "simple name; basic description; identification; historical information",
    "notes",
];
