//! Advisory lock that keeps two runs out of the same directory.

use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::error::StateError;

/// Held for the lifetime of a sync; released when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    _file: std::fs::File,
}

impl RunLock {
    pub async fn acquire(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| StateError::Lock {
                    path: path.clone(),
                    source,
                })?;
            }
            let file = std::fs::File::create(&path).map_err(|source| StateError::Lock {
                path: path.clone(),
                source,
            })?;
            file.try_lock_exclusive()
                .map_err(|_| StateError::Locked(path.clone()))?;
            tracing::debug!("Acquired run lock {}", path.display());
            Ok(Self { path, _file: file })
        })
        .await?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_lock_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        let _held = RunLock::acquire(&path).await.unwrap();
        let err = RunLock::acquire(&path).await.unwrap_err();
        assert!(matches!(err, StateError::Locked(_)));
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        {
            let held = RunLock::acquire(&path).await.unwrap();
            assert_eq!(held.path(), path);
        }
        RunLock::acquire(&path).await.unwrap();
    }
}
