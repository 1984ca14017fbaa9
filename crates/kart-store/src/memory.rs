use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStore;

type Bucket = BTreeMap<String, Bytes>;

/// In-memory blob store.
///
/// Intended for tests and embedding. Buckets are created on first write.
/// Payloads are reference-counted, so reads and copies never duplicate data.
pub struct InMemoryBlobStore {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl InMemoryBlobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects across all buckets.
    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .expect("lock poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Returns `true` if no bucket holds any object.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` exists in `bucket`.
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.buckets
            .read()
            .expect("lock poisoned")
            .get(bucket)
            .is_some_and(|b| b.contains_key(key))
    }

    /// Every key in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .expect("lock poisoned")
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove all objects from every bucket.
    pub fn clear(&self) {
        self.buckets.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StoreResult<()> {
        let mut map = self.buckets.write().expect("lock poisoned");
        map.entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        let map = self.buckets.read().expect("lock poisoned");
        map.get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> StoreResult<()> {
        self.copy_to(bucket, source_key, bucket, dest_key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let mut map = self.buckets.write().expect("lock poisoned");
        if let Some(b) = map.get_mut(bucket) {
            b.remove(key);
        }
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let map = self.buckets.read().expect("lock poisoned");
        Ok(map
            .get(bucket)
            .map(|b| {
                b.range(prefix.to_string()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn copy_to(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> StoreResult<()> {
        let mut map = self.buckets.write().expect("lock poisoned");
        let data = map
            .get(source_bucket)
            .and_then(|b| b.get(source_key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(source_bucket, source_key))?;
        map.entry(dest_bucket.to_string())
            .or_default()
            .insert(dest_key.to_string(), data);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("object_count", &self.len())
            .finish()
    }
}
