//! Remote item source: enumerates the remote library and opens content
//! streams. The CloudKit-backed [`PhotoLibrary`] is the production source;
//! the engine only sees the [`RemoteSource`] trait.

pub mod cloudkit;
pub mod error;
mod library;
pub mod queries;
pub mod session;

pub use error::SourceError;
pub use library::PhotoLibrary;
pub use session::{HttpSession, SessionFile};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

/// Byte stream of one item's content, chunked as it arrives.
pub type ContentStream = BoxStream<'static, Result<Bytes, SourceError>>;

/// Descriptor of one remote media item. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    /// Stable remote identifier; what the resume cursor records.
    pub id: String,
    /// Display filename, used for the local path.
    pub filename: String,
    pub size: u64,
    /// Declared creation/added time.
    pub timestamp: DateTime<Utc>,
    pub download_url: String,
}

impl std::fmt::Display for RemoteItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.filename, self.id)
    }
}

/// A finite, restartable, stably ordered listing plus per-item content access.
///
/// Neither method retries; that is layered on by the sync engine.
#[async_trait::async_trait]
pub trait RemoteSource: Send + Sync {
    async fn list_items(&self) -> Result<Vec<RemoteItem>, SourceError>;

    async fn open_content(&self, item: &RemoteItem) -> Result<ContentStream, SourceError>;
}
