use std::path::PathBuf;

use snafu::prelude::*;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Error creating file {}: {}", path.display(), source))]
    IoCreate {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error writing to file {}: {}", path.display(), source))]
    IoWrite {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error reading file {}: {}", path.display(), source))]
    IoRead {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error reading directory {}: {}", path.display(), source))]
    IoReadDir {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error reading metadata of {}: {}", path.display(), source))]
    IoStat {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error deleting {}: {}", path.display(), source))]
    IoDelete {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error moving {} to {}: {}", from.display(), to.display(), source))]
    IoMove {
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
    #[snafu(display("Error copying {} to {}: {}", from.display(), to.display(), source))]
    IoCopy {
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
    #[snafu(display("IO error: {}", source))]
    IoGeneral { source: std::io::Error },
    #[snafu(display("Error walking files: {}", source))]
    WalkFile { source: walkdir::Error },
    #[snafu(display("Path is not valid UTF-8: {}", path.display()))]
    InvalidUtf8Path { path: PathBuf },
    #[snafu(display("File {} contains invalid UTF-8: {}", path.display(), source))]
    InvalidString {
        source: std::string::FromUtf8Error,
        path: PathBuf,
    },
    #[snafu(display("Line {} of manifest {} is invalid: {}", num, path.display(), line))]
    InvalidManifestLine {
        path: PathBuf,
        num: usize,
        line: String,
    },
    #[snafu(display("Cannot determine the digest algorithm of manifest {}", path.display()))]
    UnknownAlgorithm { path: PathBuf },
    #[snafu(display("Unsupported digest algorithm: {}", value))]
    UnsupportedAlgorithm { value: String },
    #[snafu(display(
        "Invalid object entry number {}: must be 'oe' followed by four or five digits",
        value
    ))]
    InvalidObjectEntry { value: String },
    #[snafu(display(
        "Invalid accession number {}: must be 'aaa' followed by four digits",
        value
    ))]
    InvalidAccessionNumber { value: String },
    #[snafu(display("Not a package: {}", path.display()))]
    NotAPackage { path: PathBuf },
    #[snafu(display("{} is not inside {}", path.display(), base.display()))]
    PathOutsideBase { path: PathBuf, base: PathBuf },
    #[snafu(display("{} already exists", path.display()))]
    AlreadyExists { path: PathBuf },
    #[snafu(display("{} is not a directory", path.display()))]
    NotADirectory { path: PathBuf },
    #[snafu(display("Manifest {} does not match the package: {} lines differ", path.display(), count))]
    ManifestMismatch { path: PathBuf, count: usize },
    #[snafu(display("Error processing CSV {}: {}", path.display(), source))]
    Csv {
        source: csv::Error,
        path: PathBuf,
    },
    #[snafu(display("CSV {} has no column named '{}'", path.display(), column))]
    MissingColumn { column: String, path: PathBuf },
    #[snafu(display("Unsupported file type at {}", path.display()))]
    UnsupportedFile { path: PathBuf },
}
