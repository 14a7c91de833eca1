use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use ansi_term::{Colour, Style};
use clap::AppSettings::UseLongFormatForHelpSubcommand;
use clap::{Args, Parser, Subcommand};
use log::{error, info, LevelFilter};
use snafu::ResultExt;

use ifiscripts::archive::{
    accession, batch_validate, build_helper_register, check_register, create_sip, current_user,
    lossless_check, make_shell, preservation_storage_list, reconcile_all, render_tree,
    shell_sources, structure_check, timestamped_report, validate_manifest, AccessionNumber,
    AccessionRequest, DigestAlgorithm, IoCreateSnafu, IoStatSnafu, IssueLevel, Manifest,
    ObjectEntry, Package, PackageUpdater, Result, ShellOptions, SipRequest, StorageSystem,
};

/// Tools for building, updating and checking film archive information packages
#[derive(Debug, Parser)]
#[clap(name = "ifi", version)]
#[clap(setting(UseLongFormatForHelpSubcommand))]
pub struct IfiArgs {
    /// Suppress error messages and other command specific logging
    #[clap(short, long)]
    pub quiet: bool,

    /// Increase log level
    #[clap(short = 'V', long)]
    pub verbose: bool,

    /// Disable all output styling
    #[clap(short = 'S', long)]
    pub no_styles: bool,

    /// Name recorded as the agent in event logs
    ///
    /// By default, this is the login name of the current user.
    #[clap(short, long, value_name = "USER")]
    pub user: Option<String>,

    /// Directory batch reports are written to
    ///
    /// By default, this is ~/Desktop/ifiscripts_logs.
    #[clap(long, value_name = "LOGS_DIR", env = "IFI_LOGS_DIR")]
    pub logs_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[clap(name = "manifest")]
    Manifest(ManifestCmd),
    #[clap(name = "validate")]
    Validate(ValidateCmd),
    #[clap(name = "batch-validate")]
    BatchValidate(BatchValidateCmd),
    #[clap(name = "sip")]
    Sip(SipCmd),
    #[clap(name = "move")]
    Move(MoveCmd),
    /// Replace troublesome characters in the file names of every package in a container
    #[clap(name = "rename")]
    Rename(PackageCmd),
    /// Move nested objects to the root of objects in every package in a container
    #[clap(name = "flatten")]
    Flatten(PackageCmd),
    #[clap(name = "accession")]
    Accession(AccessionCmd),
    #[clap(name = "reconcile")]
    Reconcile(ReconcileCmd),
    #[clap(name = "check-register")]
    CheckRegister(CheckRegisterCmd),
    #[clap(name = "helper-register")]
    HelperRegister(HelperRegisterCmd),
    #[clap(name = "ps-list")]
    PsList(PsListCmd),
    #[clap(name = "lossless")]
    Lossless(SourceCmd),
    #[clap(name = "structure")]
    Structure(StructureCmd),
    #[clap(name = "shell")]
    Shell(ShellCmd),
}

/// Write a checksum manifest for a directory
///
/// Paths in the manifest are relative to the directory's parent, so a manifest of a package's
/// UUID directory lists paths that start with the UUID.
#[derive(Args, Debug)]
pub struct ManifestCmd {
    /// Directory to describe
    #[clap(value_name = "DIR")]
    pub dir: PathBuf,

    /// Write a SHA-512 manifest instead of an MD5 one
    #[clap(long)]
    pub sha512: bool,

    /// Manifest to write. By default, `<DIR>_manifest.md5` next to the directory.
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Validate a manifest, or the MD5 manifest of a package
#[derive(Args, Debug)]
pub struct ValidateCmd {
    /// Manifest file, package container or UUID directory
    #[clap(value_name = "PATH")]
    pub path: PathBuf,
}

/// Validate every MD5 manifest beneath a directory
#[derive(Args, Debug)]
pub struct BatchValidateCmd {
    /// Directory containing packages
    #[clap(value_name = "DIR")]
    pub input: PathBuf,

    /// Only validate the manifests at the root of each package
    #[clap(long)]
    pub sip: bool,
}

/// Create a SIP
#[derive(Args, Debug)]
pub struct SipCmd {
    /// Files or directories to copy into objects
    #[clap(short, long = "input", value_name = "PATH", required = true, multiple_occurrences = true)]
    pub inputs: Vec<PathBuf>,

    /// Files to copy into metadata/supplemental
    #[clap(short, long = "supplement", value_name = "PATH", multiple_occurrences = true)]
    pub supplements: Vec<PathBuf>,

    /// Object entry number, eg oe1234
    #[clap(long, value_name = "OE")]
    pub oe: String,

    /// Directory the package is created in
    #[clap(short, long, value_name = "DIR")]
    pub output: PathBuf,
}

/// Move files into a folder within a package and update its manifests
#[derive(Args, Debug)]
pub struct MoveCmd {
    /// Package container or UUID directory
    #[clap(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Files or directories to move
    #[clap(short, long = "input", value_name = "PATH", required = true, multiple_occurrences = true)]
    pub inputs: Vec<PathBuf>,

    /// Folder within the package to move the files into
    #[clap(short, long, value_name = "DIR")]
    pub new_folder: PathBuf,

    /// Copy the files instead of moving them. Use when the files come from outside the package.
    #[clap(long)]
    pub copy: bool,

    /// Update the SHA-512 manifest as well
    #[clap(long)]
    pub aip: bool,
}

/// Update the objects of every package in a container
///
/// Packages that fail are listed at the end and the remaining packages are still updated.
#[derive(Args, Debug)]
pub struct PackageCmd {
    /// Package container or UUID directory
    #[clap(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Update the SHA-512 manifest as well
    #[clap(long)]
    pub aip: bool,
}

/// Turn a SIP into an AIP
#[derive(Args, Debug)]
pub struct AccessionCmd {
    /// SIP container
    #[clap(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Accession number, eg aaa0001
    #[clap(short, long, value_name = "NUMBER")]
    pub number: String,

    /// Accession register CSV
    #[clap(short, long, value_name = "CSV")]
    pub register: PathBuf,

    /// Filmographic CSV to extract records from
    #[clap(short, long, value_name = "CSV", requires = "urn")]
    pub filmographic: Option<PathBuf>,

    /// Filmographic URNs, separated by +
    #[clap(long, value_name = "URNS", requires = "filmographic")]
    pub urn: Option<String>,
}

/// Compare a storage system's checksum report with the local manifests of AIPs
#[derive(Args, Debug)]
pub struct ReconcileCmd {
    /// Storage system the report came from: strongbox or storcycle
    #[clap(value_name = "SYSTEM")]
    pub system: StorageSystem,

    /// Checksum report CSV
    #[clap(short, long, value_name = "CSV")]
    pub csv: PathBuf,

    /// Directory containing AIPs
    #[clap(value_name = "DIR")]
    pub root: PathBuf,
}

/// Compare the accession number to object entry mappings of two registers
#[derive(Args, Debug)]
pub struct CheckRegisterCmd {
    /// Reference CSV, usually a preservation storage list
    #[clap(value_name = "REFERENCE")]
    pub reference: PathBuf,

    /// Register CSV to check
    #[clap(value_name = "REGISTER")]
    pub register: PathBuf,
}

/// Fill in a sorted accessions CSV from the technical and filmographic CSVs
#[derive(Args, Debug)]
pub struct HelperRegisterCmd {
    /// Sorted helper CSV
    #[clap(long, value_name = "CSV")]
    pub sorted: PathBuf,

    /// Technical (PBCore) CSV
    #[clap(long, value_name = "CSV")]
    pub pbcore: PathBuf,

    /// Filmographic CSV
    #[clap(long, value_name = "CSV")]
    pub filmo: PathBuf,

    /// Date accessioned, eg 2020-01-31. By default, the day the sorted CSV was last modified.
    #[clap(long, value_name = "DATE")]
    pub date: Option<String>,

    /// CSV to write
    #[clap(short, long, value_name = "FILE")]
    pub output: PathBuf,
}

/// List the AIPs in a directory with the identifiers in their logs
#[derive(Args, Debug)]
pub struct PsListCmd {
    /// Directory containing AIPs
    #[clap(value_name = "DIR")]
    pub root: PathBuf,

    /// CSV to write. By default, a timestamped file in the logs directory.
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Report the lossless outcome recorded for each package in a directory
#[derive(Args, Debug)]
pub struct SourceCmd {
    /// Directory containing packages
    #[clap(value_name = "DIR")]
    pub source: PathBuf,
}

/// Check the layout of each package in a directory
#[derive(Args, Debug)]
pub struct StructureCmd {
    /// Directory containing packages
    #[clap(value_name = "DIR")]
    pub source: PathBuf,

    /// Print the directory tree of each package
    #[clap(long)]
    pub tree: bool,
}

/// Copy packages without their audiovisual objects
#[derive(Args, Debug)]
pub struct ShellCmd {
    /// Directory to search for packages
    #[clap(value_name = "DIR")]
    pub input: PathBuf,

    /// Existing directory the shells are created in
    #[clap(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Keep the objects that are not MXF files, as AS-11 and DCP packages need
    #[clap(long, alias = "as11", alias = "dcp")]
    pub keep_non_mxf: bool,

    /// Name each shell after its package instead of appending _shell
    #[clap(long)]
    pub copy_name: bool,

    /// Make shells of SIPs (oe) rather than AIPs (aaa)
    #[clap(long)]
    pub dcdm: bool,
}

struct Output {
    no_styles: bool,
}

impl Output {
    fn paint(&self, style: Style, text: &str) -> String {
        if self.no_styles {
            text.to_string()
        } else {
            style.paint(text).to_string()
        }
    }

    fn pass(&self, text: &str) -> String {
        self.paint(Colour::Green.bold(), text)
    }

    fn fail(&self, text: &str) -> String {
        self.paint(Colour::Red.bold(), text)
    }

    fn warn(&self, text: &str) -> String {
        self.paint(Colour::Yellow.normal(), text)
    }
}

fn main() {
    let mut args = IfiArgs::parse();

    let log_level = if args.quiet {
        LevelFilter::Off
    } else if args.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::builder()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    // If the output is being piped then we should disable styling
    if atty::isnt(atty::Stream::Stdout) {
        args.no_styles = true;
    }

    match exec_command(&args) {
        Ok(true) => (),
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

/// Runs the command, returning false when it completed but found problems
fn exec_command(args: &IfiArgs) -> Result<bool> {
    let out = Output {
        no_styles: args.no_styles,
    };
    let user = args.user.clone().unwrap_or_else(current_user);

    match &args.command {
        Command::Manifest(cmd) => exec_manifest(cmd),
        Command::Validate(cmd) => exec_validate(cmd, &out),
        Command::BatchValidate(cmd) => exec_batch_validate(cmd, &logs_dir(args)?, &out),
        Command::Sip(cmd) => {
            let package = create_sip(&SipRequest {
                object_entry: ObjectEntry::parse(&cmd.oe)?,
                inputs: cmd.inputs.clone(),
                supplements: cmd.supplements.clone(),
                output: cmd.output.clone(),
                user,
            })?;
            println!("{}", package.uuid_dir().display());
            Ok(true)
        }
        Command::Move(cmd) => exec_move(cmd, user, &out),
        Command::Rename(cmd) => exec_package_updates(cmd, &user, "rename_objects", &out, |u| {
            u.rename_objects()
        }),
        Command::Flatten(cmd) => exec_package_updates(cmd, &user, "movetoobjects", &out, |u| {
            u.flatten_objects()
        }),
        Command::Accession(cmd) => {
            let package = Package::discover(&cmd.package)?;
            let aip = accession(
                &package,
                &AccessionRequest {
                    accession_number: AccessionNumber::parse(&cmd.number)?,
                    register: cmd.register.clone(),
                    user,
                    filmographic: cmd.filmographic.clone().zip(cmd.urn.clone()),
                },
            )?;
            println!("{}", aip.container().display());
            Ok(true)
        }
        Command::Reconcile(cmd) => exec_reconcile(cmd, &logs_dir(args)?, &out),
        Command::CheckRegister(cmd) => {
            let issues = check_register(&cmd.reference, &cmd.register)?;
            for issue in &issues {
                println!("{}", issue);
            }
            if issues.is_empty() {
                println!("{}", out.pass("No register issues found"));
            } else {
                println!("{}", out.fail(&format!("{} register issue(s) found", issues.len())));
            }
            Ok(issues.is_empty())
        }
        Command::HelperRegister(cmd) => {
            let register =
                build_helper_register(&cmd.sorted, &cmd.pbcore, &cmd.filmo, cmd.date.as_deref())?;
            register.write(&cmd.output)?;
            println!("{}", cmd.output.display());
            Ok(true)
        }
        Command::PsList(cmd) => {
            let output = match &cmd.output {
                Some(output) => output.clone(),
                None => timestamped_report(logs_dir(args)?, "preservation_storage_list", "csv"),
            };
            preservation_storage_list(&cmd.root)?.write(&output)?;
            println!("{}", output.display());
            Ok(true)
        }
        Command::Lossless(cmd) => exec_lossless(cmd, &out),
        Command::Structure(cmd) => exec_structure(cmd, &out),
        Command::Shell(cmd) => exec_shell(cmd),
    }
}

fn exec_manifest(cmd: &ManifestCmd) -> Result<bool> {
    let dir = absolute(&cmd.dir)?;
    let parent = dir.parent().unwrap_or_else(|| Path::new(""));
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (algorithm, suffix) = if cmd.sha512 {
        (DigestAlgorithm::Sha512, "_manifest-sha512.txt")
    } else {
        (DigestAlgorithm::Md5, "_manifest.md5")
    };
    let output = cmd
        .output
        .clone()
        .unwrap_or_else(|| parent.join(format!("{}{}", name, suffix)));

    let manifest = Manifest::generate(&dir, parent, algorithm)?;
    manifest.write(&output)?;
    info!("Wrote {} entries to {}", manifest.len(), output.display());
    println!("{}", output.display());
    Ok(true)
}

fn exec_validate(cmd: &ValidateCmd, out: &Output) -> Result<bool> {
    let manifest = if cmd.path.is_dir() {
        Package::discover(&cmd.path)?.md5_manifest()
    } else {
        cmd.path.clone()
    };

    println!("Validating {}", manifest.display());
    let result = validate_manifest(&manifest)?;

    for issue in result.issues() {
        let line = issue.to_string();
        match issue.level() {
            IssueLevel::Error => println!("{}", out.fail(&line)),
            IssueLevel::Warn => println!("{}", out.warn(&line)),
        }
    }
    println!("{} files checked", result.checked());

    if result.is_valid() {
        println!("{}", out.pass("VALID: All checksums have validated"));
    } else {
        println!(
            "{}",
            out.fail(&format!(
                "INVALID: {} error(s), {} warning(s)",
                result.error_count(),
                result.warn_count()
            ))
        );
    }

    Ok(result.is_valid())
}

fn exec_batch_validate(cmd: &BatchValidateCmd, logs_dir: &Path, out: &Output) -> Result<bool> {
    let report = timestamped_report(logs_dir, "batchvalidate_report", "txt");
    let checks = batch_validate(&cmd.input, cmd.sip, &report)?;

    let mut failed = 0;
    for check in &checks {
        if check.result.is_valid() {
            println!("{} {}", out.pass("SUCCESS"), check.manifest.display());
        } else {
            failed += 1;
            println!("{} {}", out.fail("FAILURE"), check.manifest.display());
        }
    }

    println!(
        "{} manifest(s) validated, {} failed. Report written to {}",
        checks.len(),
        failed,
        report.display()
    );
    Ok(failed == 0)
}

fn exec_move(cmd: &MoveCmd, user: String, out: &Output) -> Result<bool> {
    let package = open_package(&cmd.package)?;
    let inputs = cmd
        .inputs
        .iter()
        .map(absolute)
        .collect::<Result<Vec<PathBuf>>>()?;
    let new_folder = absolute(&cmd.new_folder)?;

    let mut updater = package.update(user).with_aip(cmd.aip);
    let placed = if cmd.copy {
        updater.copy_into(&inputs, &new_folder)?
    } else {
        updater.move_into(&inputs, &new_folder)?
    };
    for path in placed {
        println!("{}", path.display());
    }

    Ok(finish_update(updater.finalize()?.unchanged, out))
}

/// Runs `update` on every package in the container. A failed package does not stop the others.
fn exec_package_updates<F>(
    cmd: &PackageCmd,
    user: &str,
    tool: &str,
    out: &Output,
    update: F,
) -> Result<bool>
where
    F: Fn(&mut PackageUpdater) -> Result<Vec<PathBuf>>,
{
    let mut complete = true;
    let mut failed = Vec::new();

    for package in open_packages(&cmd.package)? {
        let updater = package
            .clone()
            .update(user)
            .with_aip(cmd.aip)
            .with_tool(tool);
        match run_update(&package, updater, &update) {
            Ok(unchanged) => complete &= finish_update(unchanged, out),
            Err(e) => {
                error!("Failed to update {}: {}", package.uuid_dir().display(), e);
                failed.push(package);
            }
        }
    }

    if !failed.is_empty() {
        println!("---\nFailed packages:");
        for package in &failed {
            println!("{}", out.fail(&package.uuid_dir().display().to_string()));
        }
    }
    Ok(complete && failed.is_empty())
}

fn run_update<F>(package: &Package, mut updater: PackageUpdater, update: &F) -> Result<Vec<String>>
where
    F: Fn(&mut PackageUpdater) -> Result<Vec<PathBuf>>,
{
    for changed in update(&mut updater)? {
        println!("Updated {}", package.relative_path(&changed)?);
    }
    Ok(updater.finalize()?.unchanged)
}

fn exec_shell(cmd: &ShellCmd) -> Result<bool> {
    let prefix = if cmd.dcdm { "oe" } else { "aaa" };
    let options = ShellOptions {
        keep_non_mxf: cmd.keep_non_mxf,
        copy_name: cmd.copy_name,
    };

    let sources = shell_sources(&cmd.input, prefix)?;
    if sources.is_empty() {
        println!("No packages found in {}", cmd.input.display());
    }
    for source in &sources {
        println!("{}", make_shell(source, &cmd.output, &options)?.display());
    }
    Ok(true)
}

fn exec_reconcile(cmd: &ReconcileCmd, logs_dir: &Path, out: &Output) -> Result<bool> {
    let report = timestamped_report(logs_dir, &format!("{}_fixity", cmd.system), "txt");
    let results = reconcile_all(&cmd.csv, &cmd.root, cmd.system, &report)?;

    let mut passed = true;
    for result in &results {
        if result.passed() {
            println!("{} {}", out.pass("PASS"), result.package);
        } else {
            passed = false;
            println!("{} {}", out.fail("FAIL"), result.package);
        }
    }
    println!("Report written to {}", report.display());
    Ok(passed)
}

fn exec_lossless(cmd: &SourceCmd, out: &Output) -> Result<bool> {
    let checks = lossless_check(&cmd.source)?;
    for check in &checks {
        let status = check.status.to_string();
        let status = if check.is_lossless() {
            out.pass(&status)
        } else {
            out.fail(&status)
        };
        println!("{}:\t{}", check.package, status);
    }

    let all_lossless = checks.iter().all(|c| c.is_lossless());
    if all_lossless {
        println!("---\nAll information packages are lossless");
    }
    Ok(all_lossless)
}

fn exec_structure(cmd: &StructureCmd, out: &Output) -> Result<bool> {
    let checks = structure_check(&cmd.source)?;
    for check in &checks {
        println!("{}\t{}", check.kind, check.package.display());
        if cmd.tree {
            print!("{}", render_tree(&check.package)?);
        }
        for problem in &check.problems {
            println!("{}", out.fail(&format!("ERROR: {}", problem)));
        }
    }

    let failed: Vec<_> = checks.iter().filter(|c| !c.passed()).collect();
    if failed.is_empty() {
        println!("{}", out.pass("All information packages have passed the check"));
    } else {
        println!("---\nFailed information packages:");
        for check in failed.iter() {
            println!("{}", check.package.display());
        }
    }
    Ok(failed.is_empty())
}

fn finish_update(unchanged: Vec<String>, out: &Output) -> bool {
    for update in &unchanged {
        println!("{}", out.warn(&format!("WARN: manifest not updated for {}", update)));
    }
    unchanged.is_empty()
}

/// Packages are opened by their absolute path so that paths passed alongside them share a prefix
fn open_package(path: &Path) -> Result<Package> {
    Package::discover(absolute(path)?)
}

/// Every package whose sidecar manifest is in `path`, or the single package `path` belongs to
fn open_packages(path: &Path) -> Result<Vec<Package>> {
    let path = absolute(path)?;
    let packages = if path.is_dir() {
        Package::find_all(&path)?
    } else {
        Vec::new()
    };
    if packages.is_empty() {
        Ok(vec![open_package(&path)?])
    } else {
        Ok(packages)
    }
}

/// Canonicalizes the path. A path that does not exist yet is resolved through its parent.
fn absolute<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.exists() {
        return fs::canonicalize(path).context(IoStatSnafu { path });
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => absolute(parent)?,
        _ => fs::canonicalize(".").context(IoStatSnafu { path })?,
    };
    Ok(match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    })
}

fn logs_dir(args: &IfiArgs) -> Result<PathBuf> {
    let dir = match &args.logs_dir {
        Some(dir) => dir.clone(),
        None => dirs::home_dir()
            .map(|home| home.join("Desktop").join("ifiscripts_logs"))
            .unwrap_or_else(|| PathBuf::from("ifiscripts_logs")),
    };
    fs::create_dir_all(&dir).context(IoCreateSnafu { path: &dir })?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use crate::IfiArgs;

    #[test]
    fn package_commands_have_help() {
        let cmd = IfiArgs::command();
        cmd.clone().debug_assert();

        for name in ["rename", "flatten", "shell", "helper-register"] {
            let about = cmd
                .find_subcommand(name)
                .and_then(|sub| sub.get_about())
                .unwrap_or_default();
            assert!(!about.is_empty(), "{} has no help text", name);
        }
    }
}
