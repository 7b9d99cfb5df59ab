//! In-memory object store

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use pbench_core::traits::{JobId, StorageConnector, StorageError, StorageSession};

type Objects = HashMap<(JobId, String), Vec<u8>>;

/// Object store living in this process
///
/// All sessions opened from one `MemoryStore` (and its clones) see the same
/// objects, so a run with local workers can write and read back.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<Objects>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        lock(&self.objects).is_empty()
    }

    /// Whether `name` exists within `job`
    pub fn contains(&self, job: &JobId, name: &str) -> bool {
        lock(&self.objects).contains_key(&(job.clone(), name.to_string()))
    }
}

fn lock(objects: &Mutex<Objects>) -> MutexGuard<'_, Objects> {
    objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl StorageConnector for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, endpoint: &str) -> Result<Box<dyn StorageSession>, StorageError> {
        tracing::debug!(%endpoint, "Opening in-memory storage session");
        Ok(Box::new(MemorySession {
            objects: Arc::clone(&self.objects),
        }))
    }
}

struct MemorySession {
    objects: Arc<Mutex<Objects>>,
}

#[async_trait]
impl StorageSession for MemorySession {
    async fn put(&mut self, name: &str, data: &[u8], job: &JobId) -> Result<(), StorageError> {
        lock(&self.objects).insert((job.clone(), name.to_string()), data.to_vec());
        Ok(())
    }

    async fn get(&mut self, name: &str, buf: &mut [u8], job: &JobId) -> Result<(), StorageError> {
        let objects = lock(&self.objects);
        let data = objects
            .get(&(job.clone(), name.to_string()))
            .ok_or_else(|| StorageError::NotFound(format!("{job}/{name}")))?;

        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        let job = JobId::from("job-0");
        let mut session = store.connect("10.1.0.10:9070").await.unwrap();

        session.put("tmp-0-0", b"aaaa", &job).await.unwrap();
        let mut buf = vec![b' '; 4];
        session.get("tmp-0-0", &mut buf, &job).await.unwrap();

        assert_eq!(buf, b"aaaa");
        assert!(store.contains(&job, "tmp-0-0"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_objects_are_scoped_by_job() {
        let store = MemoryStore::new();
        let mut session = store.connect("local").await.unwrap();
        session
            .put("tmp-0-0", b"x", &JobId::from("job-0"))
            .await
            .unwrap();

        let mut buf = vec![0u8; 1];
        let err = session
            .get("tmp-0-0", &mut buf, &JobId::from("job-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sessions_share_objects() {
        let store = MemoryStore::new();
        let job = JobId::from("job-0");

        let mut writer = store.connect("local").await.unwrap();
        writer.put("obj", b"shared", &job).await.unwrap();

        let mut reader = store.clone().connect("local").await.unwrap();
        let mut buf = vec![0u8; 6];
        reader.get("obj", &mut buf, &job).await.unwrap();
        assert_eq!(buf, b"shared");
    }
}
