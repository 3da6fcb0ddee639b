use thiserror::Error;

use crate::retry::RetryAction;

/// Errors raised while listing or reading the remote library.
///
/// `is_transient()` separates hiccups worth retrying (server errors, rate
/// limits, dropped connections) from terminal conditions such as a rejected
/// session.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Session rejected: {0}")]
    Authentication(String),

    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error from {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Photo library has not finished indexing")]
    IndexingNotFinished,
}

impl SourceError {
    /// Classify an HTTP status that came back from the service.
    pub fn from_status(status: u16, url: &str) -> Self {
        match status {
            401 | 403 | 421 => SourceError::Authentication(format!("HTTP {status} from {url}")),
            _ => SourceError::HttpStatus {
                status,
                url: url.to_string(),
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            SourceError::Http { .. } => true,
            SourceError::Malformed { .. } => true,
            SourceError::Authentication(_) => false,
            SourceError::IndexingNotFinished => false,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, SourceError::Authentication(_))
    }

    pub fn retry_action(&self) -> RetryAction {
        if self.is_transient() {
            RetryAction::Retry
        } else {
            RetryAction::Abort
        }
    }
}
