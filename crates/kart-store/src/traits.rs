use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};

/// Bucketed key-value blob storage.
///
/// All implementations must satisfy these invariants:
/// - Keys are opaque `/`-separated strings; the store never interprets them.
/// - `put` overwrites whatever is stored at the key.
/// - `get` of a missing key fails with [`StoreError::NotFound`].
/// - `delete` is idempotent: deleting a missing key succeeds.
/// - `copy` is performed by the backend, never by streaming through the caller.
/// - The store holds no per-call state and is safe to share between
///   concurrent operations.
///
/// [`StoreError::NotFound`]: crate::StoreError::NotFound
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` at `key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StoreResult<()>;

    /// Read the object at `key`.
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Bytes>;

    /// Copy an object within a bucket.
    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> StoreResult<()>;

    /// Delete the object at `key`. Missing objects are not an error.
    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// List every key in `bucket` starting with `prefix`, in lexical order.
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;

    /// Copy an object, possibly into another bucket.
    ///
    /// The default delegates to [`copy`](Self::copy) within one bucket and
    /// refuses cross-bucket copies with [`StoreError::Backend`]. Backends that
    /// can copy between buckets server-side override it.
    async fn copy_to(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> StoreResult<()> {
        if source_bucket == dest_bucket {
            return self.copy(source_bucket, source_key, dest_key).await;
        }
        Err(StoreError::Backend(format!(
            "cross-bucket copy unsupported ({source_bucket} -> {dest_bucket})"
        )))
    }
}
