//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use zdstats_core::config::{ExitPolicy, OutputFormat as EventFormat, TimestampEpoch};

/// zdstats -- record ZDaemon client logs as a classified event stream.
///
/// Use `zdstats <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "zdstats", version, about, long_about = None)]
pub struct Cli {
    /// Path to the zdstats.toml configuration file.
    ///
    /// When omitted, `zdstats.toml` in the working directory is used if it
    /// exists, otherwise built-in defaults apply.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format for command reports.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported report formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch a command and record its log as an event stream.
    Run(RunArgs),

    /// Inspect and test classification rules.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Event stream framing, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// A single `{"events": [...]}` document.
    JsonArray,
    /// One event per line.
    JsonLines,
}

impl From<FormatArg> for EventFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::JsonArray => EventFormat::JsonArray,
            FormatArg::JsonLines => EventFormat::JsonLines,
        }
    }
}

/// What to do with unread lines once the process has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExitPolicyArg {
    /// Read until the log has no more complete lines, then close.
    Drain,
    /// Close as soon as the exit is noticed.
    Immediate,
}

impl From<ExitPolicyArg> for ExitPolicy {
    fn from(arg: ExitPolicyArg) -> Self {
        match arg {
            ExitPolicyArg::Drain => ExitPolicy::Drain,
            ExitPolicyArg::Immediate => ExitPolicy::Immediate,
        }
    }
}

/// Reference moment for event timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EpochArg {
    /// Seconds since the run started.
    RunStart,
    /// Seconds since the Unix epoch.
    Unix,
}

impl From<EpochArg> for TimestampEpoch {
    fn from(arg: EpochArg) -> Self {
        match arg {
            EpochArg::RunStart => TimestampEpoch::RunStart,
            EpochArg::Unix => TimestampEpoch::Unix,
        }
    }
}

/// Launch a game client and record its console log.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Log file written by the command. When omitted, a path under the
    /// output directory is generated and `--pass-logfile` is implied.
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Directory for the event stream file (overrides `output.dir`).
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Event stream framing (overrides `output.format`).
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Rule file or directory (overrides `rules.path`).
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Exit handling (overrides `pipeline.exit_policy`).
    #[arg(long, value_enum)]
    pub exit_policy: Option<ExitPolicyArg>,

    /// Timestamp epoch (overrides `pipeline.timestamp_epoch`).
    #[arg(long, value_enum)]
    pub epoch: Option<EpochArg>,

    /// Append `+logfile <path>` to the command's arguments.
    #[arg(long)]
    pub pass_logfile: bool,

    /// Command to launch, followed by its arguments.
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

// ---- rules ----

/// Inspect and test classification rules.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// Load a rule file or directory and report problems.
    Validate {
        /// Rule file or directory (default: `rules.path`, or the built-in set).
        path: Option<PathBuf>,
    },
    /// List rules in priority order.
    List {
        /// Rule file or directory (default: `rules.path`, or the built-in set).
        path: Option<PathBuf>,

        /// Filter by status (enabled, disabled).
        #[arg(long)]
        status: Option<String>,
    },
    /// Classify a single log line.
    Test {
        /// The log line, without its trailing newline.
        line: String,

        /// Rule file or directory (default: `rules.path`, or the built-in set).
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

// ---- config ----

/// Manage zdstats configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, tailer, rules, output, pipeline).
        #[arg(long)]
        section: Option<String>,
    },
}
