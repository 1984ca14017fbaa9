//! Release manifests.
//!
//! Each (project, track) has one manifest object, `kart.json`, naming the
//! build currently released there. Writes overwrite in place; there is no
//! history.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use kart_config::ProjectConfig;
use kart_store::{with_deadline, BlobStore};
use kart_types::{key, names, Release};

use crate::error::{ReleaseError, ReleaseResult};

/// Reads and writes release manifests in the project bucket.
pub struct ReleaseManifest {
    store: Arc<dyn BlobStore>,
    config: Arc<dyn ProjectConfig>,
}

impl std::fmt::Debug for ReleaseManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseManifest").finish_non_exhaustive()
    }
}

impl ReleaseManifest {
    pub fn new(store: Arc<dyn BlobStore>, config: Arc<dyn ProjectConfig>) -> Self {
        Self { store, config }
    }

    /// Bucket and key of the manifest for `channel` of `project`.
    ///
    /// The key is derived from the channel's configured deploy track, so
    /// every channel deploying to the same track shares one manifest.
    pub fn location(&self, project: &str, channel: &str) -> ReleaseResult<(String, String)> {
        names::validate_project(project)?;
        names::validate_channel(channel)?;
        let bucket = self.config.resolve_bucket(project)?;
        let track = self.config.resolve_channel(project, channel)?.deploy_track;
        Ok((bucket, key::manifest_key(project, &track)))
    }

    /// Record `release` as current for its own project and channel.
    pub async fn write(&self, release: &Release) -> ReleaseResult<()> {
        self.write_for(&release.build.project, &release.build.channel, release)
            .await
    }

    /// Record `record` as current in the manifest of `channel` of `project`.
    pub async fn write_for(
        &self,
        project: &str,
        channel: &str,
        record: &Release,
    ) -> ReleaseResult<()> {
        let (bucket, manifest_key) = self.location(project, channel)?;
        let json = record.to_json()?;
        with_deadline(
            self.config.storage_timeout(),
            self.store.put(&bucket, &manifest_key, Bytes::from(json)),
        )
        .await
        .map_err(|source| ReleaseError::ManifestWrite {
            key: manifest_key.clone(),
            source,
            release: None,
        })?;

        info!(
            bucket = %bucket,
            key = %manifest_key,
            build = %record.key(),
            "wrote release manifest"
        );
        Ok(())
    }

    /// The release currently recorded for `channel` of `project`, if any.
    pub async fn read(&self, project: &str, channel: &str) -> ReleaseResult<Option<Release>> {
        let (bucket, manifest_key) = self.location(project, channel)?;
        let data = match with_deadline(
            self.config.storage_timeout(),
            self.store.get(&bucket, &manifest_key),
        )
        .await
        {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!(key = %manifest_key, "no release manifest");
                return Ok(None);
            }
            Err(source) => {
                return Err(ReleaseError::ManifestRead {
                    key: manifest_key,
                    source,
                })
            }
        };

        Release::from_json(&data)
            .map(Some)
            .map_err(|e| ReleaseError::CorruptManifest {
                key: manifest_key,
                reason: e.to_string(),
            })
    }
}
