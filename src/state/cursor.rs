//! Resume cursor: the stable id of the last item fully synced.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::error::StateError;

/// Where the resume cursor lives.
///
/// `save` must be durable before it returns: a crash immediately after must
/// leave either the old cursor or the new one, never a torn value.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, StateError>;

    async fn save(&self, id: &str) -> Result<(), StateError>;

    async fn clear(&self) -> Result<(), StateError>;
}

/// Cursor stored as a single line of text in a file.
#[derive(Debug, Clone)]
pub struct FileCursor {
    path: PathBuf,
}

impl FileCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_os_string();
        os.push(".new");
        PathBuf::from(os)
    }

    fn write_err(&self, source: std::io::Error) -> StateError {
        StateError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl CursorStore for FileCursor {
    async fn load(&self) -> Result<Option<String>, StateError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let id = contents.trim();
                if id.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(id.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StateError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn save(&self, id: &str) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.write_err(e))?;
            }
        }
        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| self.write_err(e))?;
        file.write_all(id.as_bytes())
            .await
            .map_err(|e| self.write_err(e))?;
        file.write_all(b"\n").await.map_err(|e| self.write_err(e))?;
        file.sync_all().await.map_err(|e| self.write_err(e))?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.write_err(e))?;
        tracing::debug!("Cursor advanced to {}", id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StateError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.write_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_means_no_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = FileCursor::new(dir.path().join("cursor"));
        assert_eq!(cursor.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_blank_file_means_no_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(FileCursor::new(&path).load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_trims_hand_edited_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor");
        std::fs::write(&path, "  ABC-123\r\n").unwrap();
        assert_eq!(
            FileCursor::new(&path).load().await.unwrap().as_deref(),
            Some("ABC-123")
        );
    }

    #[tokio::test]
    async fn test_save_overwrites_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = FileCursor::new(dir.path().join("nested/cursor"));
        cursor.save("first").await.unwrap();
        cursor.save("second").await.unwrap();
        assert_eq!(cursor.load().await.unwrap().as_deref(), Some("second"));
        assert!(!cursor.temp_path().exists());
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = FileCursor::new(dir.path().join("cursor"));
        cursor.clear().await.unwrap();
        cursor.save("x").await.unwrap();
        cursor.clear().await.unwrap();
        assert_eq!(cursor.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreadable_cursor_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be.
        let cursor = FileCursor::new(dir.path());
        assert!(matches!(
            cursor.load().await,
            Err(StateError::Read { .. })
        ));
    }
}
