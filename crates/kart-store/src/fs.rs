//! Filesystem-backed blob store.
//!
//! Layout: `<root>/<bucket>/<key>`, with `/` in keys mapped to directories.
//! Writes land in a hidden temporary file next to the target and are renamed
//! into place, so readers never observe a partially written object.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStore;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Blob store rooted at a local directory.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> StoreResult<PathBuf> {
        check_relative(bucket)?;
        if bucket.contains('/') {
            return Err(invalid(bucket, "bucket names must not contain '/'"));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        check_relative(key)?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    /// Write `data` to `path` through a temporary file.
    ///
    /// The write and rename run together on the blocking pool, so dropping
    /// the returned future never strands the temporary file.
    async fn write_atomic(path: PathBuf, data: Bytes) -> StoreResult<()> {
        blocking(move || {
            let parent = path
                .parent()
                .ok_or_else(|| invalid(&path.display().to_string(), "no parent directory"))?;
            std::fs::create_dir_all(parent)?;

            let tmp = TempFile::next_to(&path);
            std::fs::write(tmp.path(), &data)?;
            tmp.persist(&path)?;
            Ok(())
        })
        .await
    }
}

/// A temporary file next to its target, removed on drop unless persisted.
struct TempFile {
    path: PathBuf,
    persisted: bool,
}

impl TempFile {
    fn next_to(target: &Path) -> Self {
        Self {
            path: temp_path(target),
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Rename into place.
    fn persist(mut self, target: &Path) -> std::io::Result<()> {
        std::fs::rename(&self.path, target)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Backend(format!("storage task failed: {e}")))?
}

/// Directory to start a listing walk from: the longest whole-directory part
/// of `prefix`. Keys outside it cannot match.
fn walk_root(bucket_dir: &Path, prefix: &str) -> StoreResult<PathBuf> {
    match prefix.rfind('/') {
        Some(end) if end > 0 => {
            let dir_part = &prefix[..end];
            check_relative(dir_part)?;
            Ok(bucket_dir.join(dir_part))
        }
        _ => Ok(bucket_dir.to_path_buf()),
    }
}

fn invalid(key: &str, reason: &str) -> StoreError {
    StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Reject anything that could escape the store root.
fn check_relative(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(invalid(key, "must not be empty"));
    }
    let path = Path::new(key);
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if part.to_string_lossy().starts_with('.') {
                    return Err(invalid(key, "components must not start with '.'"));
                }
            }
            _ => return Err(invalid(key, "must be a plain relative path")),
        }
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{n}.partial", std::process::id()))
}

fn map_not_found(e: std::io::Error, bucket: &str, key: &str) -> StoreError {
    if e.kind() == ErrorKind::NotFound {
        StoreError::not_found(bucket, key)
    } else {
        StoreError::Io(e)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        let size = data.len();
        Self::write_atomic(path, data).await?;
        debug!(bucket, key, bytes = size, "stored object");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        let path = self.object_path(bucket, key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| map_not_found(e, bucket, key))?;
        Ok(Bytes::from(data))
    }

    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> StoreResult<()> {
        self.copy_to(bucket, source_key, bucket, dest_key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let dir = self.bucket_dir(bucket)?;
        let start = walk_root(&dir, prefix)?;
        let prefix = prefix.to_string();

        blocking(move || {
            if !start.exists() {
                return Ok(Vec::new());
            }
            let mut keys = Vec::new();
            for entry in WalkDir::new(&start).follow_links(false) {
                let entry = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = match entry.path().strip_prefix(&dir) {
                    Ok(rel) => rel,
                    Err(_) => continue,
                };
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                // In-flight temporary files.
                if parts.iter().any(|p| p.starts_with('.')) {
                    continue;
                }
                let key = parts.join("/");
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await
    }

    async fn copy_to(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> StoreResult<()> {
        let source = self.object_path(source_bucket, source_key)?;
        let dest = self.object_path(dest_bucket, dest_key)?;
        let (bucket, key) = (source_bucket.to_string(), source_key.to_string());

        blocking(move || {
            if !source.try_exists()? {
                return Err(StoreError::not_found(&bucket, &key));
            }
            let parent = dest
                .parent()
                .ok_or_else(|| invalid(&dest.display().to_string(), "no parent directory"))?;
            std::fs::create_dir_all(parent)?;

            let tmp = TempFile::next_to(&dest);
            std::fs::copy(&source, tmp.path()).map_err(|e| map_not_found(e, &bucket, &key))?;
            tmp.persist(&dest)?;
            Ok(())
        })
        .await?;
        debug!(source_bucket, source_key, dest_bucket, dest_key, "copied object");
        Ok(())
    }
}
