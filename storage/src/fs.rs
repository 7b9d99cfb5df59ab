//! Directory-backed object store

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pbench_core::traits::{JobId, StorageConnector, StorageError, StorageSession};

/// Object store keeping each object as a file at `<root>/<job>/<name>`
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`; the directory is created on connect
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageConnector for FsStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn connect(&self, endpoint: &str) -> Result<Box<dyn StorageSession>, StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Connect {
                endpoint: self.root.display().to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(%endpoint, root = %self.root.display(), "Opening filesystem storage session");

        Ok(Box::new(FsSession {
            root: self.root.clone(),
        }))
    }
}

struct FsSession {
    root: PathBuf,
}

impl FsSession {
    fn object_path(&self, job: &JobId, name: &str) -> PathBuf {
        self.root.join(&job.0).join(name)
    }
}

#[async_trait]
impl StorageSession for FsSession {
    async fn put(&mut self, name: &str, data: &[u8], job: &JobId) -> Result<(), StorageError> {
        let path = self.object_path(job, name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&mut self, name: &str, buf: &mut [u8], job: &JobId) -> Result<(), StorageError> {
        let data = match tokio::fs::read(self.object_path(job, name)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!("{job}/{name}")))
            }
            Err(e) => return Err(e.into()),
        };

        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_writes_file_per_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("objects"));
        let job = JobId::from("job-2");

        let mut session = store.connect("fs").await.unwrap();
        session.put("tmp-4-0", b"abcd", &job).await.unwrap();

        let stored = std::fs::read(dir.path().join("objects/job-2/tmp-4-0")).unwrap();
        assert_eq!(stored, b"abcd");

        let mut buf = vec![0u8; 4];
        session.get("tmp-4-0", &mut buf, &job).await.unwrap();
        assert_eq!(buf, b"abcd");
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = FsStore::new(dir.path()).connect("fs").await.unwrap();

        let mut buf = vec![0u8; 4];
        let err = session
            .get("nope", &mut buf, &JobId::from("job-0"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
