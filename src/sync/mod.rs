//! Sync engine: walks the remote listing one item at a time, verifying
//! existing files by digest, replacing only what changed, and recording a
//! resume cursor after every committed item.

pub mod error;
pub mod hasher;
pub mod paths;
pub mod progress;
pub mod store;
pub mod timestamp;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::retry::{retry_with_backoff, RetryAction, RetryConfig, RetryFailure};
use crate::source::{RemoteItem, RemoteSource, SourceError};
use crate::state::CursorStore;
use crate::types::{FileMatchPolicy, FolderLayout, Timezone};

pub use error::SyncError;
use paths::PathPlan;
pub use progress::{create_progress_sink, ProgressSink};
use store::{CommitOutcome, LocalStore};
use timestamp::TimestampSetter;

/// Subset of application config consumed by the sync engine.
/// Decoupled from CLI parsing so the engine can be tested independently.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub(crate) directory: PathBuf,
    pub(crate) folder_layout: FolderLayout,
    pub(crate) timezone: Timezone,
    pub(crate) file_match_policy: FileMatchPolicy,
    pub(crate) staging_suffix: String,
    pub(crate) retry: RetryConfig,
    /// Pause after this many successfully processed items; 0 disables.
    pub(crate) rate_limit: u32,
    pub(crate) time_window: Duration,
    pub(crate) dry_run: bool,
}

/// Counters for one pass over the listing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub listed: usize,
    pub skipped_by_cursor: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub timestamp_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(RunStats),
    /// Shutdown was requested; the cursor points at the last committed item.
    Interrupted(RunStats),
}

impl SyncOutcome {
    pub fn stats(&self) -> &RunStats {
        match self {
            SyncOutcome::Completed(s) | SyncOutcome::Interrupted(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug)]
struct ItemReport {
    action: ItemAction,
    timestamp_set: bool,
}

/// Mutable state for one run.
#[derive(Debug, Default)]
struct RunState {
    stats: RunStats,
    /// Items processed since the last rate-limit pause.
    since_pause: u32,
    /// Set once an item is given up on: later items still sync, but the
    /// cursor must not move past the failed one.
    cursor_held: bool,
}

pub struct SyncEngine<'a> {
    config: &'a SyncConfig,
    source: &'a dyn RemoteSource,
    cursor: &'a dyn CursorStore,
    progress: &'a dyn ProgressSink,
    store: LocalStore,
}

fn classify_sync(e: &SyncError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        config: &'a SyncConfig,
        source: &'a dyn RemoteSource,
        cursor: &'a dyn CursorStore,
        progress: &'a dyn ProgressSink,
        timestamps: Arc<dyn TimestampSetter>,
    ) -> Self {
        let store = LocalStore::new(config.staging_suffix.clone(), config.timezone, timestamps);
        Self {
            config,
            source,
            cursor,
            progress,
            store,
        }
    }

    /// Run one pass over the remote listing.
    ///
    /// Per-item failures are logged and counted, never returned; only a
    /// rejected session (or an unusable listing/cursor) ends the run with an
    /// error.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<SyncOutcome, SyncError> {
        let started = Instant::now();
        let mut state = RunState::default();

        let items = match retry_with_backoff(
            &self.config.retry,
            cancel,
            "listing",
            SourceError::retry_action,
            |_| self.source.list_items(),
        )
        .await
        {
            Ok(items) => items,
            Err(RetryFailure::Cancelled) => {
                tracing::info!("Shutdown requested, stopping before sync");
                return Ok(SyncOutcome::Interrupted(state.stats));
            }
            Err(RetryFailure::Aborted(e)) | Err(RetryFailure::Exhausted { last: e, .. }) => {
                return Err(if e.is_authentication() {
                    SyncError::Authentication(e.to_string())
                } else {
                    SyncError::Remote(e)
                });
            }
        };
        state.stats.listed = items.len();
        tracing::info!("Found {} items in the remote library", items.len());

        let plan = PathPlan::build(
            &items,
            &self.config.directory,
            self.config.folder_layout,
            self.config.timezone,
            self.config.file_match_policy,
        );

        let start = self.resume_index(&items).await?;
        state.stats.skipped_by_cursor = start;

        let mut interrupted = false;
        for item in &items[start..] {
            if cancel.is_cancelled() {
                tracing::info!("Shutdown requested, stopping before {}", item);
                interrupted = true;
                break;
            }
            let Some(path) = plan.path_for(item) else {
                tracing::error!(item = %item.id, "No local path planned for {}, skipping", item);
                state.stats.failed += 1;
                state.cursor_held = true;
                continue;
            };

            if self.config.dry_run {
                self.dry_run_item(item, path, &mut state).await;
                continue;
            }

            let record_cursor = !state.cursor_held;
            let result = retry_with_backoff(
                &self.config.retry,
                cancel,
                &item.id,
                classify_sync,
                move |_| self.sync_item(item, path, record_cursor, cancel),
            )
            .await;

            match result {
                Ok(report) => {
                    state.record(report);
                    if !self.pause_for_rate_limit(&mut state, cancel).await {
                        interrupted = true;
                        break;
                    }
                }
                Err(RetryFailure::Cancelled) | Err(RetryFailure::Aborted(SyncError::Interrupted)) => {
                    tracing::info!("Shutdown requested, {} not committed", item);
                    interrupted = true;
                    break;
                }
                Err(RetryFailure::Aborted(e)) if e.is_authentication() => {
                    tracing::error!(item = %item.id, "Session rejected, aborting run: {}", e);
                    return Err(SyncError::Authentication(e.to_string()));
                }
                Err(RetryFailure::Aborted(e)) => {
                    tracing::error!(item = %item.id, "Skipping {}: {}", item, e);
                    state.give_up(item);
                }
                Err(RetryFailure::Exhausted { attempts, last }) => {
                    tracing::error!(
                        item = %item.id,
                        "Giving up on {} after {} attempts: {}",
                        item,
                        attempts,
                        last
                    );
                    state.give_up(item);
                }
            }
        }

        self.log_summary(&state.stats, started.elapsed());
        if interrupted {
            Ok(SyncOutcome::Interrupted(state.stats))
        } else {
            Ok(SyncOutcome::Completed(state.stats))
        }
    }

    /// Index of the first item to process, based on the stored cursor.
    async fn resume_index(&self, items: &[RemoteItem]) -> Result<usize, SyncError> {
        let Some(last) = self.cursor.load().await? else {
            return Ok(0);
        };
        match items.iter().position(|i| i.id == last) {
            Some(pos) => {
                tracing::info!(
                    "Resuming after {}, skipping {} already synced items",
                    items[pos],
                    pos + 1
                );
                Ok(pos + 1)
            }
            None => {
                tracing::warn!(
                    "Resume cursor {} is not in the current listing; verifying every item",
                    last
                );
                Ok(0)
            }
        }
    }

    /// One full attempt at an item. Every attempt starts over from the
    /// existence check.
    async fn sync_item(
        &self,
        item: &RemoteItem,
        path: &Path,
        record_cursor: bool,
        cancel: &CancellationToken,
    ) -> Result<ItemReport, SyncError> {
        let action = if !self.store.exists(path).await {
            let digest = self
                .store
                .write_direct(self.source, item, path, self.progress, cancel)
                .await?;
            tracing::info!("Downloaded {}", path.display());
            tracing::debug!(item = %item.id, sha256 = %digest, "created");
            ItemAction::Created
        } else {
            let existing = self.store.digest_of(path).await?;
            let staged = self
                .store
                .write_staged(self.source, item, path, self.progress, cancel)
                .await?;
            let remote = staged.digest;
            tracing::debug!(item = %item.id, bytes = staged.bytes, "Staged {}", staged.path.display());
            match self.store.commit(staged, path, existing).await? {
                CommitOutcome::Unchanged => {
                    tracing::debug!(item = %item.id, sha256 = %remote, "Unchanged {}", path.display());
                    ItemAction::Unchanged
                }
                CommitOutcome::Replaced => {
                    tracing::info!("Updated {}", path.display());
                    tracing::debug!(item = %item.id, old = %existing, new = %remote, "replaced");
                    ItemAction::Updated
                }
            }
        };

        let timestamp_set = match self.store.set_timestamp(path, item.timestamp).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(item = %item.id, "{}; file kept", e);
                false
            }
        };

        if record_cursor {
            self.cursor.save(&item.id).await?;
        }

        Ok(ItemReport {
            action,
            timestamp_set,
        })
    }

    async fn dry_run_item(&self, item: &RemoteItem, path: &Path, state: &mut RunState) {
        if self.store.exists(path).await {
            tracing::info!("[DRY RUN] Would verify {}", path.display());
            state.stats.unchanged += 1;
        } else {
            tracing::info!("[DRY RUN] Would download {} to {}", item, path.display());
            state.stats.created += 1;
        }
    }

    /// Returns `false` if shutdown was requested during the pause.
    async fn pause_for_rate_limit(&self, state: &mut RunState, cancel: &CancellationToken) -> bool {
        if self.config.rate_limit == 0 || self.config.time_window.is_zero() {
            return true;
        }
        state.since_pause += 1;
        if state.since_pause < self.config.rate_limit {
            return true;
        }
        state.since_pause = 0;
        tracing::info!(
            "Processed {} items, pausing for {}",
            self.config.rate_limit,
            format_duration(self.config.time_window)
        );
        tokio::select! {
            _ = tokio::time::sleep(self.config.time_window) => true,
            _ = cancel.cancelled() => false,
        }
    }

    fn log_summary(&self, stats: &RunStats, elapsed: Duration) {
        if self.config.dry_run {
            tracing::info!("── Dry Run Summary ──");
            tracing::info!(
                "  {} files would be downloaded, {} would be verified",
                stats.created,
                stats.unchanged
            );
            tracing::info!("  destination: {}", self.config.directory.display());
            return;
        }
        tracing::info!("── Summary ──");
        tracing::info!(
            "  {} new, {} updated, {} unchanged, {} failed, {} listed",
            stats.created,
            stats.updated,
            stats.unchanged,
            stats.failed,
            stats.listed
        );
        if stats.skipped_by_cursor > 0 {
            tracing::info!("  {} skipped by resume cursor", stats.skipped_by_cursor);
        }
        if stats.timestamp_failures > 0 {
            tracing::warn!("  {} timestamps could not be set", stats.timestamp_failures);
        }
        tracing::info!("  elapsed: {}", format_duration(elapsed));
    }
}

impl RunState {
    fn record(&mut self, report: ItemReport) {
        match report.action {
            ItemAction::Created => self.stats.created += 1,
            ItemAction::Updated => self.stats.updated += 1,
            ItemAction::Unchanged => self.stats.unchanged += 1,
        }
        if !report.timestamp_set {
            self.stats.timestamp_failures += 1;
        }
    }

    fn give_up(&mut self, item: &RemoteItem) {
        self.stats.failed += 1;
        if !self.cursor_held {
            tracing::warn!(
                "Resume cursor held before {}; the next run will retry it",
                item
            );
            self.cursor_held = true;
        }
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
