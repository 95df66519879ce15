use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "pan-refscan", version)]
#[command(about = "Find references to and duplicates of PAN-OS address objects")]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Report every reference to one or more address objects.
    Analyze(AnalyzeArgs),
    /// List every set of addresses sharing one IP value.
    Redundant(RedundantArgs),
    /// Print the consolidation commands for one address object.
    Cleanup(CleanupArgs),
    /// Print the commands that copy an address object under a new name.
    Copy(CopyArgs),
    /// Report group nesting, root groups, loops and cross-scope references.
    Groups(GroupsArgs),
}

/// Options shared by every subcommand.
#[derive(clap::Args, Debug)]
pub struct CommonArgs {
    /// Configuration export (set-statements or XML).
    pub file: PathBuf,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Analyzer settings TOML. Defaults to the built-in settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Abort after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Address object to analyze. Repeat for several.
    #[arg(short, long = "target", required = true)]
    pub targets: Vec<String>,
    /// Include a cleanup plan for targets with redundant peers.
    #[arg(long)]
    pub cleanup: bool,
}

#[derive(Parser, Debug)]
pub struct RedundantArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
pub struct CleanupArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Canonical address object the duplicates fold into.
    #[arg(short, long)]
    pub target: String,
}

#[derive(Parser, Debug)]
pub struct CopyArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Address object to copy.
    #[arg(short, long)]
    pub source: String,
    /// Name of the new address object.
    #[arg(short, long)]
    pub name: String,
    /// ip-netmask value of the new address object.
    #[arg(long)]
    pub ip: String,
    /// Add the copy next to the source, or replace the source with it.
    #[arg(long, value_enum, default_value_t = CopyModeArg::Add)]
    pub mode: CopyModeArg,
    /// Device group of the source, when several scopes define it.
    #[arg(long)]
    pub device_group: Option<String>,
    /// Copy the shared definition of the source.
    #[arg(long, conflicts_with = "device_group")]
    pub shared: bool,
}

#[derive(Parser, Debug)]
pub struct GroupsArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum CopyModeArg {
    Add,
    Replace,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
