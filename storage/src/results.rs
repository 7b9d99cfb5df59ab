//! Result files collected below a local directory

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pbench_core::traits::{ResultStore, StorageError};

/// Copies uploaded result files to `<root>/<remote_key>`
#[derive(Debug, Clone)]
pub struct DirResultStore {
    root: PathBuf,
}

impl DirResultStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ResultStore for DirResultStore {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<(), StorageError> {
        let upload_err = |reason: String| StorageError::Upload {
            path: local_path.display().to_string(),
            key: remote_key.to_string(),
            reason,
        };

        let dest = self.root.join(remote_key.trim_start_matches('/'));
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| upload_err(e.to_string()))?;
        }

        let bytes = tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| upload_err(e.to_string()))?;

        tracing::debug!(
            path = %local_path.display(),
            dest = %dest.display(),
            bytes,
            "Result file stored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_copies_under_key() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("pocket_write_0.txt");
        std::fs::write(&local, "12\n15\n").unwrap();

        let store = DirResultStore::new(dir.path().join("results"));
        store
            .upload(&local, "pocket/pocket_write_0.txt")
            .await
            .unwrap();

        let copied =
            std::fs::read_to_string(dir.path().join("results/pocket/pocket_write_0.txt")).unwrap();
        assert_eq!(copied, "12\n15\n");
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirResultStore::new(dir.path());

        let err = store
            .upload(&dir.path().join("absent.txt"), "pocket/absent.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Upload { .. }));
    }
}
