use clap::{Args, Parser, Subcommand};

use crate::types::{DateSource, FileMatchPolicy, FolderLayout, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "icloud-mirror",
    version,
    about = "Mirror an iCloud Photos library into a local directory",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Sync options when no subcommand is given
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

impl Cli {
    /// `sync` is the default when no subcommand is given.
    pub fn effective_command(self) -> Command {
        self.command.unwrap_or(Command::Sync(self.sync))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download new and changed items (default)
    Sync(SyncArgs),
    /// Show the stored resume cursor
    Status(CursorArgs),
    /// Forget the resume cursor so the next sync verifies everything
    ResetCursor(ResetCursorArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Local directory to mirror into
    #[arg(short = 'd', long, env = "ICLOUD_MIRROR_DIRECTORY")]
    pub directory: Option<String>,

    /// Session file produced by an authentication helper
    #[arg(
        long,
        env = "ICLOUD_MIRROR_SESSION_FILE",
        default_value = "~/.icloud-mirror/session.json"
    )]
    pub session_file: String,

    /// Resume cursor file (default: <directory>/.icloud-mirror-cursor)
    #[arg(long)]
    pub cursor_file: Option<String>,

    /// Folder layout under the directory
    #[arg(long, value_enum, default_value = "year-month")]
    pub folder_layout: FolderLayout,

    /// Timezone for year/month folders and file times: an IANA name or "local"
    #[arg(long, default_value = "UTC")]
    pub timezone: String,

    /// Which remote date becomes the file timestamp
    #[arg(long, value_enum, default_value = "created")]
    pub date_source: DateSource,

    /// How local filenames are derived from remote names
    #[arg(long, value_enum, default_value = "name")]
    pub file_match_policy: FileMatchPolicy,

    /// Suffix for in-progress downloads
    #[arg(long, default_value = ".temp")]
    pub staging_suffix: String,

    /// Attempts per item before it is skipped
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: u32,

    /// Initial retry delay in seconds, doubled on each retry
    #[arg(long, default_value_t = 1)]
    pub retry_delay: u64,

    /// Upper bound on the retry delay in seconds
    #[arg(long, default_value_t = 60)]
    pub max_retry_delay: u64,

    /// Pause after this many items (0 disables)
    #[arg(long, default_value_t = 100)]
    pub rate_limit: u32,

    /// Length of the rate-limit pause in seconds (0 disables)
    #[arg(long, default_value_t = 0)]
    pub time_window: u64,

    /// HTTP read timeout in seconds
    #[arg(long, default_value_t = 300)]
    pub http_timeout: u64,

    /// Report what would be done without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    /// Run continuously, waiting N seconds between runs
    #[arg(long)]
    pub watch_with_interval: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct CursorArgs {
    /// Local directory the cursor belongs to
    #[arg(short = 'd', long, env = "ICLOUD_MIRROR_DIRECTORY")]
    pub directory: Option<String>,

    /// Resume cursor file (overrides --directory)
    #[arg(long)]
    pub cursor_file: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ResetCursorArgs {
    #[command(flatten)]
    pub cursor: CursorArgs,

    /// Skip confirmation prompt
    #[arg(long)]
    pub yes: bool,
}
