//! Clap derive structures for the `vitrine` CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use vitrine_core::{Action, ItemId, ResourceKey};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vitrine -- operate a storefront admin backend from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "vitrine",
    version,
    about = "Inspect and change storefront admin resources from the command line",
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
    /// Backend profile to use
    #[arg(long, short = 'p', env = "VITRINE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API root URL (overrides profile)
    #[arg(long, short = 'u', env = "VITRINE_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Session cookie value
    #[arg(long, env = "VITRINE_SESSION", global = true, hide_env_values = true)]
    pub session: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VITRINE_OUTPUT",
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

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "VITRINE_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout, e.g. "30s"
    #[arg(long, env = "VITRINE_TIMEOUT", value_parser = humantime::parse_duration, global = true)]
    pub timeout: Option<Duration>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Item ids, one per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
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
    /// List a resource collection
    #[command(alias = "ls")]
    List(ListArgs),

    /// Create a document
    Create(CreateArgs),

    /// Merge fields into a document
    Update(UpdateArgs),

    /// Delete a document
    #[command(alias = "rm")]
    Delete(DeleteArgs),

    /// Run an item action (toggle-visibility, approve, mark-read, ...)
    Action(ActionArgs),

    /// Print a collection every time it changes, until Ctrl-C
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

impl Command {
    /// Whether this command keeps a realtime connection open.
    pub fn wants_realtime(&self) -> bool {
        matches!(self, Self::Watch(_))
    }
}

// ── Resource commands ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Resource collection, with optional parameters (`name:param`)
    pub resource: ResourceKey,

    /// Comma-separated fields to show in table output
    #[arg(long, short = 'c', value_delimiter = ',')]
    pub columns: Vec<String>,
}

/// JSON body given inline or from a file.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct DataArgs {
    /// Inline JSON document
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Read the JSON document from a file
    #[arg(long, short = 'f')]
    pub from_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    pub resource: ResourceKey,

    #[command(flatten)]
    pub body: DataArgs,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    pub resource: ResourceKey,

    pub id: ItemId,

    #[command(flatten)]
    pub body: DataArgs,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    pub resource: ResourceKey,

    pub id: ItemId,
}

#[derive(Debug, Args)]
pub struct ActionArgs {
    pub resource: ResourceKey,

    pub id: ItemId,

    /// Action path segment, e.g. `toggle-visibility`
    pub action: Action,

    /// Optional JSON body sent with the action
    #[arg(long, short = 'd')]
    pub data: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    pub resource: ResourceKey,

    /// Comma-separated fields to show in table output
    #[arg(long, short = 'c', value_delimiter = ',')]
    pub columns: Vec<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the resolved configuration (secrets redacted)
    Show,

    /// Store a session cookie (read from stdin) in the system keyring
    SetSession,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
