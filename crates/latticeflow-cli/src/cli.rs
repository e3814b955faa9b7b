use clap::{Args, Parser, Subcommand, ValueEnum};
use latticeflow::core::io::traits::FileFormat;
use latticeflow::engine::config::CnaMode;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "latticeflow CLI - Import particle trajectories (LAMMPS dump, XYZ, extended XYZ) and identify local crystal structure with common neighbor analysis.",
    help_template = HELP_TEMPLATE,
)]
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

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the frames contained in a trajectory file.
    Scan(ScanArgs),
    /// Show the detected column layout of a trajectory file as TOML.
    Inspect(InspectArgs),
    /// Load a single frame and summarize its contents.
    Load(LoadArgs),
    /// Run common neighbor analysis over selected frames of a trajectory.
    Analyze(AnalyzeArgs),
}

/// Input options shared by every subcommand that reads a trajectory.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Path to the trajectory file (plain or zstd-compressed).
    #[arg(required = true, value_name = "FILE")]
    pub input: PathBuf,

    /// Skip format detection and read the file as the given format.
    #[arg(short, long, value_enum, value_name = "FORMAT")]
    pub format: Option<FormatArg>,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Lammps,
    Xyz,
}

impl From<FormatArg> for FileFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Lammps => FileFormat::LammpsDump,
            FormatArg::Xyz => FileFormat::Xyz,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Fixed,
    Adaptive,
    Bonds,
}

impl From<ModeArg> for CnaMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Fixed => CnaMode::Fixed,
            ModeArg::Adaptive => CnaMode::Adaptive,
            ModeArg::Bonds => CnaMode::Bonds,
        }
    }
}

/// Arguments for the `scan` subcommand.
#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Arguments for the `load` subcommand.
#[derive(Args, Debug)]
pub struct LoadArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Zero-based index of the frame to load.
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub frame: usize,

    /// Sort particles by identifier after loading, overriding the config file.
    #[arg(long)]
    pub sort: bool,
}

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Frames to analyze: 'all', a single index, a range 'A..B', or a comma list.
    #[arg(long, default_value = "all", value_name = "SEL")]
    pub frames: String,

    /// Override the CNA mode from the config file.
    #[arg(short, long, value_enum, value_name = "MODE")]
    pub mode: Option<ModeArg>,

    /// Override the neighbor cutoff used by the fixed mode.
    #[arg(long, value_name = "FLOAT")]
    pub cutoff: Option<f64>,

    /// Generate bonds with this cutoff before each analysis.
    #[arg(long, value_name = "FLOAT")]
    pub bond_cutoff: Option<f64>,

    /// Restrict the analysis to selected particles.
    #[arg(long)]
    pub only_selected: bool,

    /// Write a per-frame structure histogram to a CSV file.
    #[arg(short, long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S analysis.cutoff=3.5
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
