use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rulebook_types::{PackageId, VersionId};

#[derive(Parser)]
#[command(
    name = "rulebook",
    about = "Rulebook: staging, approval, and history of e-invoicing rule sets",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Service configuration file
    #[arg(short, long, global = true, default_value = "rulebook.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch a package into staging and show what would change
    Sync(SyncArgs),
    /// Commit a package's pending staging to the live tree
    Approve(PackageArgs),
    /// Discard a package's pending staging
    Reject(PackageArgs),
    /// List committed versions, newest first
    Versions(VersionsArgs),
    /// Show the per-file changes of a version
    VersionDiff(VersionArgs),
    /// Show the unified diff of one file in a version
    VersionFileDiff(VersionFileArgs),
    /// Show pending staging previews
    Pending(PendingArgs),
    /// Show the unified diff of one pending file
    PendingFileDiff(PendingFileArgs),
    /// Manage validation profiles
    Profile(ProfileArgs),
    /// Show or replace the global custom Schematron rules
    GlobalRules(GlobalRulesArgs),
    /// Resolve a profile's inherited XSD overrides or Schematron rules
    Resolve(ResolveArgs),
    /// Apply suppressions to a JSON file of Schematron findings
    Suppress(SuppressArgs),
    /// Reload every cached component from the live trees
    Reload,
    /// Read commands from stdin against one running instance
    ///
    /// Pending staging lives in memory, so approving or rejecting what a
    /// sync staged has to happen in the same process.
    Shell,
}

/// One line typed into `rulebook shell`.
#[derive(Parser)]
#[command(name = "rulebook", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct SyncArgs {
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub package: Option<PackageId>,
    /// Sync every configured package
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct PackageArgs {
    pub package: PackageId,
}

#[derive(Args)]
pub struct VersionsArgs {
    #[arg(short, long)]
    pub package: Option<PackageId>,
}

#[derive(Args)]
pub struct VersionArgs {
    /// Version id, e.g. efatura/v3
    pub version: VersionId,
}

#[derive(Args)]
pub struct VersionFileArgs {
    pub version: VersionId,
    pub path: String,
}

#[derive(Args)]
pub struct PendingArgs {
    pub package: Option<PackageId>,
}

#[derive(Args)]
pub struct PendingFileArgs {
    pub package: PackageId,
    pub path: String,
}

#[derive(Args)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub action: ProfileAction,
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// List profiles with their inheritance chains
    List,
    /// Show a profile with inherited settings applied
    Show {
        name: String,
        /// Show the profile as written instead
        #[arg(long)]
        raw: bool,
    },
    /// Create or replace a profile from a YAML file
    Save { name: String, file: PathBuf },
    Delete { name: String },
}

#[derive(Args)]
pub struct GlobalRulesArgs {
    #[command(subcommand)]
    pub action: GlobalRulesAction,
}

#[derive(Subcommand)]
pub enum GlobalRulesAction {
    Show,
    /// Replace the rules with a YAML map of schematron type to assertions
    Save { file: PathBuf },
}

#[derive(Args)]
pub struct ResolveArgs {
    #[command(subcommand)]
    pub target: ResolveTarget,
}

#[derive(Subcommand)]
pub enum ResolveTarget {
    /// XSD overrides for a schema type
    Overrides { profile: String, schema_type: String },
    /// Custom Schematron rules for a schematron type, global ones included
    Rules { profile: String, schematron_type: String },
}

#[derive(Args)]
pub struct SuppressArgs {
    /// JSON array of findings: {"ruleId", "test", "message"}
    pub errors: PathBuf,
    #[arg(short, long)]
    pub profile: Option<String>,
    /// Active schema/schematron type; repeatable
    #[arg(short = 't', long = "type")]
    pub types: Vec<String>,
    /// Ad-hoc suppression: RULE-ID, test:EXPR or text:REGEX; repeatable
    #[arg(short, long)]
    pub suppress: Vec<String>,
    /// Treat the findings as XSD messages (a JSON array of strings)
    #[arg(long)]
    pub xsd: bool,
}
