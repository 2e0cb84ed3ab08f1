//! Clap derive structures for the `scadalink` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use scadalink_core::ByteOrder;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// scadalink -- talk to a SCADA server directly or through the Cloud Bridge relay
#[derive(Debug, Parser)]
#[command(
    name = "scadalink",
    version,
    about = "Query and watch a SCADA server from the command line",
    long_about = "Query and watch a SCADA server from the command line.\n\n\
        Port 443 routes through the Cloud Bridge relay and needs a selected\n\
        agent; any other port talks to the server's mobile API directly.",
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
    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SCADALINK_OUTPUT",
        default_value = "plain",
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Plain,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show or change the server address
    Settings(SettingsArgs),

    /// Probe the server and report the connection state
    Connect(ConnectArgs),

    /// GET a mobile API resource
    Get {
        /// Resource path, e.g. `trend-logs/comparison` or `registers?analyzerId=1`
        path: String,
    },

    /// POST a JSON body to a mobile API resource
    Post {
        /// Resource path
        path: String,

        /// JSON request body
        #[arg(long, short = 'b')]
        body: String,
    },

    /// List and select relay agents
    #[command(alias = "agent")]
    Agents(AgentsArgs),

    /// Stream live values for one register
    Watch(WatchArgs),

    /// Serve canned responses instead of contacting a server
    Demo {
        #[arg(value_enum)]
        state: DemoState,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ── Settings ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print the stored settings, selected agent and demo flag
    Show,

    /// Update the stored settings; unspecified fields keep their value
    Set {
        /// Server or relay host name
        #[arg(long)]
        host: Option<String>,

        /// Port; 443 selects the relay
        #[arg(long)]
        port: Option<u16>,

        /// Connect automatically on launch
        #[arg(long)]
        auto_connect: Option<bool>,
    },
}

// ── Connect ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Keep retrying for up to this many seconds
    #[arg(long, default_value = "0")]
    pub wait: u64,
}

// ── Agents ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AgentsArgs {
    #[command(subcommand)]
    pub command: AgentsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AgentsCommand {
    /// List agents known to the relay
    #[command(alias = "ls")]
    List,

    /// Select the agent relayed requests are sent to
    Select {
        /// Agent id
        id: String,
    },

    /// Forget the selected agent
    Clear,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Analyzer id
    #[arg(long)]
    pub analyzer: u64,

    /// Register address
    #[arg(long)]
    pub address: u32,

    /// Register id
    #[arg(long)]
    pub register: u64,

    /// Data type, e.g. float32, uint16, bool
    #[arg(long, default_value = "uint16")]
    pub data_type: String,

    /// Scale factor applied by the server
    #[arg(long, default_value = "1.0")]
    pub scale: f64,

    /// Word/byte order: ABCD, DCBA, BADC or CDAB
    #[arg(long, default_value = "ABCD")]
    pub byte_order: ByteOrder,

    /// Bit within the register, for boolean points
    #[arg(long)]
    pub bit_offset: Option<u8>,

    /// Stop after this many values
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ── Demo ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoState {
    On,
    Off,
    Status,
}
