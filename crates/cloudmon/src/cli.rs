//! Clap derive structures for the `cloudmon` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use cloudmon_api::{HistorySpan, MonitorId};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// cloudmon -- operate device-cloud push monitors from the command line
#[derive(Debug, Parser)]
#[command(
    name = "cloudmon",
    version,
    about = "Manage device-cloud push monitors, alerts, and firmware uploads",
    long_about = "Inspect and clean up the push monitors a dashboard registers on the\n\
        device cloud, look up tank alerts, and upload firmware images with\n\
        live progress and Ctrl-C cancellation.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "CLOUDMON_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Device-cloud URL (overrides profile)
    #[arg(long, env = "CLOUDMON_URL", global = true)]
    pub url: Option<String>,

    /// Device-cloud username (overrides profile)
    #[arg(long, short = 'u', env = "CLOUDMON_USERNAME", global = true)]
    pub username: Option<String>,

    /// Device-cloud password
    #[arg(long, env = "CLOUDMON_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CLOUDMON_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "CLOUDMON_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "CLOUDMON_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect, create, and clean up push monitors
    #[command(alias = "mon", alias = "m")]
    Monitors(MonitorsArgs),

    /// Look up alert summaries
    Alerts(AlertsArgs),

    /// Upload a file to the device-cloud file inventory
    Upload(UploadArgs),

    /// Browse and download the device-cloud file inventory
    Files(FilesArgs),

    /// Read data stream history
    #[command(alias = "st")]
    Streams(StreamsArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  MONITORS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct MonitorsArgs {
    #[command(subcommand)]
    pub command: MonitorsCommand,
}

#[derive(Debug, Subcommand)]
pub enum MonitorsCommand {
    /// List monitors registered for this account
    #[command(alias = "ls")]
    List {
        /// Only inactive TCP monitors (the ones a sweep would consider)
        #[arg(long)]
        inactive: bool,

        /// Only monitors whose topic contains this text
        #[arg(long)]
        topic: Option<String>,
    },

    /// Register a TCP push monitor
    Create {
        /// Topics to monitor (e.g. DataPoint/00000000-00000000-0004F3FF-FF000001)
        #[arg(required = true)]
        topics: Vec<String>,

        /// Handlebars schema applied by the device cloud before pushing
        #[arg(long)]
        schema_file: Option<PathBuf>,

        /// Records per pushed batch
        #[arg(long, default_value = "1")]
        batch_size: u32,

        /// Seconds to wait before pushing a partial batch
        #[arg(long, default_value = "0")]
        batch_duration: u64,
    },

    /// Delete a monitor by id
    #[command(alias = "rm")]
    Delete {
        /// Monitor id
        id: MonitorId,
    },

    /// Delete inactive TCP monitors matching a topic
    Sweep {
        /// Topic text to match (e.g. DataPoint, CLIEvent, devices, AlarmStatus)
        topic: String,

        /// Only monitors whose topic also names this device
        #[arg(long, short = 'd')]
        device: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ALERTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub command: AlertsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// List alert summaries matching a query expression
    #[command(alias = "ls")]
    List {
        /// Device-cloud query (e.g. "name='tank_level_north'")
        #[arg(long)]
        query: Option<String>,

        /// Only fired alerts
        #[arg(long)]
        fired: bool,
    },

    /// Show the summary of one alert on one device
    Show {
        /// Alert id
        id: u64,

        /// Device id the alert was raised on
        #[arg(long, short = 'd')]
        device: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  UPLOAD
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Inventory path to upload to (defaults to the file name)
    #[arg(long, short = 'r')]
    pub remote_path: Option<String>,

    /// Delete an existing file at the remote path first
    #[arg(long)]
    pub replace: bool,

    /// Chunk size in KiB
    #[arg(long, default_value = "64")]
    pub chunk_kib: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  FILES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct FilesArgs {
    #[command(subcommand)]
    pub command: FilesCommand,
}

#[derive(Debug, Subcommand)]
pub enum FilesCommand {
    /// List a directory of the file inventory
    #[command(alias = "ls")]
    List {
        /// Inventory directory (defaults to the root)
        #[arg(default_value = "")]
        path: String,
    },

    /// Download a file from the inventory
    Get {
        /// Inventory path of the file
        path: String,

        /// Write to this file instead of stdout
        #[arg(long)]
        dest: Option<PathBuf>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  STREAMS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct StreamsArgs {
    #[command(subcommand)]
    pub command: StreamsCommand,
}

#[derive(Debug, Subcommand)]
pub enum StreamsCommand {
    /// Data points of a stream over the last hour, day, week, or month
    History {
        /// Stream id (e.g. 00000000-00000000-0004F3FF-FF000001/tank_level)
        stream_id: String,

        /// Window length in hours: 1, 24, 168, or 720
        #[arg(long, short = 's', default_value = "1", value_parser = parse_span)]
        span: HistorySpan,
    },
}

fn parse_span(raw: &str) -> Result<HistorySpan, String> {
    raw.parse::<u32>()
        .ok()
        .and_then(HistorySpan::from_hours)
        .ok_or_else(|| format!("'{raw}' is not one of 1, 24, 168, 720"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Create or update a profile
    AddProfile {
        /// Profile name
        name: String,

        /// Device-cloud URL
        #[arg(long)]
        url: Option<String>,

        /// Username
        #[arg(long)]
        username: String,
    },

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
