//! Tools for building, updating and verifying the information packages of a film archive.
//!
//! Packages follow a fixed layout: a container directory named by its Object Entry (`oe####`)
//! or accession number (`aaa####`) holds a UUID-named directory with `logs`, `metadata` and
//! `objects` subdirectories, next to one or two sidecar checksum manifests.
//!
//! ```no_run
//! use ifiscripts::archive::{validate_manifest, Package};
//!
//! let package = Package::discover("path/to/oe1234").unwrap();
//! let result = validate_manifest(package.md5_manifest()).unwrap();
//! assert!(result.is_valid());
//! ```

pub mod archive;
