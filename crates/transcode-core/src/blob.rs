//! C1 — uniform put/get/delete over an S3-like backend. Out of scope per the
//! orchestration spec is the actual object-storage transport; this crate
//! carries a trait boundary plus an in-memory reference implementation for
//! tests and local `serve` runs, the same role `ModelProviderClient` plays
//! for LLM backends in the teacher's router.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{OrchestratorError, OrchestratorResult};

const MAX_BATCH_DELETE: usize = 1000;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key`, returning the URL the task row will hold.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> OrchestratorResult<String>;

    async fn get(&self, key: &str) -> OrchestratorResult<Vec<u8>>;

    /// Idempotent bulk delete, batched at `MAX_BATCH_DELETE` keys per call.
    /// Returns the count of keys actually removed.
    async fn delete_prefix(&self, prefix: &str) -> OrchestratorResult<usize>;

    async fn exists(&self, key: &str) -> OrchestratorResult<bool>;
}

struct Object {
    bytes: Vec<u8>,
    #[allow(dead_code)]
    content_type: String,
}

/// Reference `BlobStore`: an in-memory map keyed by object key, addressed
/// through a synthetic `blob://` URL scheme.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<BTreeMap<String, Object>>,
    base_url: String,
}

impl InMemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            base_url: base_url.into(),
        }
    }

    pub fn shared(base_url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(base_url))
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key.trim_start_matches('/'))
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> OrchestratorResult<String> {
        let mut objects = self.objects.write().await;
        objects.insert(
            key.to_string(),
            Object { bytes, content_type: content_type.to_string() },
        );
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> OrchestratorResult<Vec<u8>> {
        let objects = self.objects.read().await;
        objects
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| OrchestratorError::BlobNotFound(key.to_string()))
    }

    async fn delete_prefix(&self, prefix: &str) -> OrchestratorResult<usize> {
        let mut objects = self.objects.write().await;
        let matching: Vec<String> = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .take(MAX_BATCH_DELETE)
            .cloned()
            .collect();
        for key in &matching {
            objects.remove(key);
        }
        Ok(matching.len())
    }

    async fn exists(&self, key: &str) -> OrchestratorResult<bool> {
        let objects = self.objects.read().await;
        Ok(objects.contains_key(key))
    }
}
