use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{CursorArgs, SyncArgs};
use crate::retry::RetryConfig;
use crate::sync::SyncConfig;
use crate::types::{DateSource, FileMatchPolicy, FolderLayout, Timezone};

/// Cursor filename used when `--cursor-file` is not given.
pub const DEFAULT_CURSOR_FILENAME: &str = ".icloud-mirror-cursor";

/// Application configuration for a sync.
pub struct Config {
    pub directory: PathBuf,
    pub session_file: PathBuf,
    pub cursor_file: PathBuf,
    pub staging_suffix: String,

    pub watch_with_interval: Option<u64>,
    pub http_timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub max_retry_delay_secs: u64,
    pub time_window_secs: u64,

    pub max_retries: u32,
    pub rate_limit: u32,

    pub timezone: Timezone,
    pub folder_layout: FolderLayout,
    pub date_source: DateSource,
    pub file_match_policy: FileMatchPolicy,

    pub dry_run: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("directory", &self.directory)
            .field("session_file", &self.session_file)
            .field("cursor_file", &self.cursor_file)
            .field("folder_layout", &self.folder_layout)
            .field("timezone", &self.timezone)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Resolve the cursor path: an explicit `--cursor-file` wins, otherwise the
/// default file inside the sync directory.
pub fn resolve_cursor_path(
    cursor_file: Option<&str>,
    directory: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    match (cursor_file, directory) {
        (Some(file), _) => Ok(expand_tilde(file)),
        (None, Some(dir)) => Ok(dir.join(DEFAULT_CURSOR_FILENAME)),
        (None, None) => anyhow::bail!("Either --directory or --cursor-file is required"),
    }
}

impl CursorArgs {
    pub fn cursor_path(&self) -> anyhow::Result<PathBuf> {
        let directory = self.directory.as_deref().map(expand_tilde);
        resolve_cursor_path(self.cursor_file.as_deref(), directory.as_deref())
    }
}

impl Config {
    pub fn from_cli(args: SyncArgs) -> anyhow::Result<Self> {
        let directory = match args.directory.as_deref() {
            Some(d) if !d.is_empty() => expand_tilde(d),
            _ => anyhow::bail!("--directory is required for syncing"),
        };
        let cursor_file = resolve_cursor_path(args.cursor_file.as_deref(), Some(&directory))?;

        let timezone: Timezone = args
            .timezone
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Invalid --timezone: {}", e))?;

        if args.staging_suffix.is_empty() {
            anyhow::bail!("--staging-suffix must not be empty");
        }

        Ok(Self {
            directory,
            session_file: expand_tilde(&args.session_file),
            cursor_file,
            staging_suffix: args.staging_suffix,
            watch_with_interval: args.watch_with_interval,
            http_timeout_secs: args.http_timeout,
            retry_delay_secs: args.retry_delay,
            max_retry_delay_secs: args.max_retry_delay,
            time_window_secs: args.time_window,
            max_retries: args.max_retries,
            rate_limit: args.rate_limit,
            timezone,
            folder_layout: args.folder_layout,
            date_source: args.date_source,
            file_match_policy: args.file_match_policy,
            dry_run: args.dry_run,
            no_progress_bar: args.no_progress_bar,
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            initial_wait_secs: self.retry_delay_secs,
            max_wait_secs: self.max_retry_delay_secs,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            directory: self.directory.clone(),
            folder_layout: self.folder_layout,
            timezone: self.timezone,
            file_match_policy: self.file_match_policy,
            staging_suffix: self.staging_suffix.clone(),
            retry: self.retry_config(),
            rate_limit: self.rate_limit,
            time_window: Duration::from_secs(self.time_window_secs),
            dry_run: self.dry_run,
        }
    }

    /// Lock file guarding the directory, kept next to the cursor.
    pub fn lock_path(&self) -> PathBuf {
        let mut os = self.cursor_file.as_os_str().to_os_string();
        os.push(".lock");
        PathBuf::from(os)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn sync_args(extra: &[&str]) -> SyncArgs {
        let mut argv = vec!["icloud-mirror", "sync"];
        argv.extend_from_slice(extra);
        match crate::cli::Cli::try_parse_from(argv).unwrap().effective_command() {
            crate::cli::Command::Sync(args) => args,
            other => panic!("expected sync, got {other:?}"),
        }
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/Documents");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("Documents"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(
            expand_tilde("/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            expand_tilde("relative/path"),
            PathBuf::from("relative/path")
        );
    }

    #[test]
    fn test_from_cli_defaults() {
        let cfg = Config::from_cli(sync_args(&["-d", "/photos"])).unwrap();
        assert_eq!(cfg.directory, PathBuf::from("/photos"));
        assert_eq!(cfg.cursor_file, PathBuf::from("/photos/.icloud-mirror-cursor"));
        assert_eq!(cfg.lock_path(), PathBuf::from("/photos/.icloud-mirror-cursor.lock"));
        assert_eq!(cfg.timezone, Timezone::default());
        assert_eq!(cfg.staging_suffix, ".temp");

        let retry = cfg.retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_wait_secs, 1);
        assert_eq!(retry.max_wait_secs, 60);

        let sync = cfg.sync_config();
        assert_eq!(sync.rate_limit, 100);
        assert!(sync.time_window.is_zero());
    }

    #[test]
    fn test_from_cli_requires_directory() {
        assert!(Config::from_cli(sync_args(&[])).is_err());
    }

    #[test]
    fn test_from_cli_explicit_cursor_and_timezone() {
        let cfg = Config::from_cli(sync_args(&[
            "-d",
            "/photos",
            "--cursor-file",
            "/state/cursor",
            "--timezone",
            "Europe/Berlin",
        ]))
        .unwrap();
        assert_eq!(cfg.cursor_file, PathBuf::from("/state/cursor"));
        assert_eq!(cfg.timezone, Timezone::Named(chrono_tz::Europe::Berlin));
    }

    #[test]
    fn test_from_cli_rejects_unknown_timezone() {
        let err = Config::from_cli(sync_args(&["-d", "/p", "--timezone", "Mars/Olympus"]))
            .unwrap_err();
        assert!(err.to_string().contains("--timezone"));
    }

    #[test]
    fn test_from_cli_rejects_empty_staging_suffix() {
        assert!(Config::from_cli(sync_args(&["-d", "/p", "--staging-suffix", ""])).is_err());
    }

    #[test]
    fn test_cursor_path_requires_something() {
        assert!(resolve_cursor_path(None, None).is_err());
        assert_eq!(
            resolve_cursor_path(None, Some(Path::new("/d"))).unwrap(),
            PathBuf::from("/d/.icloud-mirror-cursor")
        );
    }
}
