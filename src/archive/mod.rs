pub use crate::archive::batch::{
    batch_validate, diff_framemd5s, diff_textfiles, lossless_check, render_tree, structure_check,
    FrameMismatch, LosslessCheck, LosslessStatus, ManifestCheck, StructureCheck,
};
pub use crate::archive::digest::{
    digest_file, digest_file_multi, DigestAlgorithm, HexDigest, MultiDigestWriter,
};
pub use crate::archive::error::*;
pub use crate::archive::event::{
    current_user, timestamped_report, EventLog, Lineage, LoggedIdentifiers, LosslessOutcome,
};
pub use crate::archive::identifiers::{is_uuid, new_uuid, AccessionNumber, ObjectEntry, PackageKind};
pub use crate::archive::manifest::{Manifest, ManifestDiff, ManifestEntry};
pub use crate::archive::package::{
    accession, create_sip, plan_batch, run_batch, AccessionRequest, Package, PlannedSip,
    SipRequest,
};
pub use crate::archive::reconcile::{reconcile_all, reconcile_package, FixityReport, StorageSystem};
pub use crate::archive::register::{
    build_helper_register, check_register, preservation_storage_list, CsvTable, Record,
    RegisterIssue, RegisterKey,
};
pub use crate::archive::shell::{make_shell, shell_sources, ShellOptions};
pub use crate::archive::update::{PackageUpdater, UpdateOutcome};
pub use crate::archive::validate::{
    validate_manifest, IssueLevel, ValidationIssue, ValidationResult, ValidationVerdict,
};

pub mod batch;
pub mod event;
pub mod manifest;
pub mod media;
pub mod organise;
pub mod package;
pub mod reconcile;
pub mod register;
pub mod shell;
pub mod update;

mod consts;
mod digest;
mod encoding;
mod error;
mod identifiers;
mod io;
mod validate;
