use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::error::SyncError;
use super::hasher::{self, ContentHasher, Digest};
use super::paths::staging_path;
use super::progress::ProgressSink;
use super::timestamp::TimestampSetter;
use crate::source::{RemoteItem, RemoteSource};
use crate::types::Timezone;

/// Downloaded content that has not yet replaced a final file.
#[derive(Debug)]
pub struct StagedDownload {
    pub path: PathBuf,
    pub digest: Digest,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Existing file already had the remote content; staged copy dropped.
    Unchanged,
    /// Staged copy renamed over the final path.
    Replaced,
}

/// Local side of the sync: staging, digest comparison, atomic promotion and
/// timestamps. Final paths are only ever written by `rename`, so a reader
/// never observes a partially written file.
pub struct LocalStore {
    staging_suffix: String,
    timezone: Timezone,
    timestamps: Arc<dyn TimestampSetter>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("staging_suffix", &self.staging_suffix)
            .field("timezone", &self.timezone)
            .field("timestamps", &self.timestamps.name())
            .finish()
    }
}

impl LocalStore {
    pub fn new(
        staging_suffix: impl Into<String>,
        timezone: Timezone,
        timestamps: Arc<dyn TimestampSetter>,
    ) -> Self {
        Self {
            staging_suffix: staging_suffix.into(),
            timezone,
            timestamps,
        }
    }

    pub fn staging_path(&self, final_path: &Path) -> PathBuf {
        staging_path(final_path, &self.staging_suffix)
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    pub async fn digest_of(&self, path: &Path) -> Result<Digest, SyncError> {
        hasher::digest_file(path)
            .await
            .map_err(|e| SyncError::disk(path, e))
    }

    /// Download `item` next to `final_path` under the staging suffix,
    /// hashing bytes as they arrive. The final path is never touched; on any
    /// error (or cancellation) the staging artifact is removed.
    pub async fn write_staged(
        &self,
        source: &dyn RemoteSource,
        item: &RemoteItem,
        final_path: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<StagedDownload, SyncError> {
        let staging = self.staging_path(final_path);
        if let Some(parent) = staging.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::disk(parent, e))?;
        }
        // Left over from a crashed or force-killed run.
        if fs::try_exists(&staging).await.unwrap_or(false) {
            tracing::debug!("Removing stale staging file {}", staging.display());
            fs::remove_file(&staging)
                .await
                .map_err(|e| SyncError::disk(&staging, e))?;
        }

        progress.start(&item.filename, item.size);
        let result = self
            .stream_to_file(source, item, &staging, progress, cancel)
            .await;
        progress.finish();

        match result {
            Ok((digest, bytes)) => Ok(StagedDownload {
                path: staging,
                digest,
                bytes,
            }),
            Err(e) => {
                if let Err(rm) = fs::remove_file(&staging).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            "Could not remove staging file {}: {}",
                            staging.display(),
                            rm
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        source: &dyn RemoteSource,
        item: &RemoteItem,
        staging: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(Digest, u64), SyncError> {
        let mut stream = source.open_content(item).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(staging)
            .await
            .map_err(|e| SyncError::disk(staging, e))?;

        let mut hasher = ContentHasher::new();
        let mut bytes_written: u64 = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Interrupted),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| {
                tracing::debug!(
                    item = %item.id,
                    bytes_so_far = bytes_written,
                    "Body read failed: {}",
                    e
                );
                SyncError::Remote(e)
            })?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::disk(staging, e))?;
            bytes_written += chunk.len() as u64;
            progress.advance(chunk.len() as u64);
        }
        file.flush().await.map_err(|e| SyncError::disk(staging, e))?;
        file.sync_all()
            .await
            .map_err(|e| SyncError::disk(staging, e))?;

        Ok((hasher.finalize(), bytes_written))
    }

    /// Download a new item: stage it, then rename onto the (absent) final
    /// path. Returns the content digest for logging.
    pub async fn write_direct(
        &self,
        source: &dyn RemoteSource,
        item: &RemoteItem,
        final_path: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Digest, SyncError> {
        let staged = self
            .write_staged(source, item, final_path, progress, cancel)
            .await?;
        let digest = staged.digest;
        self.promote(staged, final_path).await?;
        Ok(digest)
    }

    /// Settle a staged download against the existing file whose digest is
    /// `existing`: equal digests drop the staged copy and leave the final file
    /// untouched, anything else atomically replaces it.
    pub async fn commit(
        &self,
        staged: StagedDownload,
        final_path: &Path,
        existing: Digest,
    ) -> Result<CommitOutcome, SyncError> {
        if staged.digest == existing {
            self.discard(staged).await?;
            return Ok(CommitOutcome::Unchanged);
        }
        self.promote(staged, final_path).await?;
        Ok(CommitOutcome::Replaced)
    }

    /// Remove a staging artifact.
    pub async fn discard(&self, staged: StagedDownload) -> Result<(), SyncError> {
        fs::remove_file(&staged.path)
            .await
            .map_err(|e| SyncError::disk(&staged.path, e))
    }

    async fn promote(&self, staged: StagedDownload, final_path: &Path) -> Result<(), SyncError> {
        if let Err(e) = fs::rename(&staged.path, final_path).await {
            let _ = fs::remove_file(&staged.path).await;
            return Err(SyncError::disk(final_path, e));
        }
        Ok(())
    }

    /// Set the file's times to the declared remote timestamp, interpreted in
    /// the configured timezone.
    pub async fn set_timestamp(
        &self,
        path: &Path,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let local = self.timezone.convert(timestamp);
        let setter = Arc::clone(&self.timestamps);
        let target = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || setter.set_times(&target, local))
            .await
            .map_err(std::io::Error::other)
            .and_then(|r| r);
        match result {
            Ok(()) => {
                tracing::debug!("Set timestamps for {} to {}", path.display(), local);
                Ok(())
            }
            Err(e) => Err(SyncError::Timestamp {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}
