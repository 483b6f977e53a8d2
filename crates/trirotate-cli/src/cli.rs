use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const ABOUT: &str = "TriRotate CLI - a command-line driver for amoebot triangle-rotation simulations: a perfect triangle of programmable-matter particles locates its center and rotates two of its sides around it.";
const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(version, about = ABOUT, help_template = HELP_TEMPLATE)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the triangle-rotation algorithm to termination.
    Run(RunArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Side length of the initial triangle; must be 3k + 1 (4, 7, 10, ...).
    #[arg(short = 'l', long, value_name = "INT")]
    pub side_length: Option<i32>,

    #[command(flatten)]
    pub center: CenterMode,

    /// Seed for particle orientations and the activation schedule.
    /// A time-derived seed is used (and logged) when omitted.
    #[arg(short, long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Abort the run after this many activations.
    #[arg(long, value_name = "INT")]
    pub max_activations: Option<u64>,

    /// Path to a run configuration file in TOML format. Explicit flags
    /// override values from the file.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print each particle's inspection text after the run.
    #[arg(long)]
    pub inspect: bool,
}

/// Mutually exclusive flags selecting the initialization mode.
#[derive(Args, Debug, Clone, Copy)]
#[group(required = false, multiple = false)]
pub struct CenterMode {
    /// Start with the center preplaced instead of running discovery.
    #[arg(long)]
    pub set_center: bool,

    /// Force full center discovery, overriding the config file.
    #[arg(long)]
    pub discover_center: bool,
}
