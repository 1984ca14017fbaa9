//! The promotion engine.
//!
//! Promoting a build onto a track runs in order:
//!
//! 1. copy the archive to the release key, in the track's deploy bucket
//! 2. stamp the release date
//! 3. overwrite the track's manifest
//!
//! The copy never replaces an archive the catalog stored on the track; that
//! is a [`ReleaseError::ReleaseCollision`]. A failed copy leaves nothing
//! behind. A failed manifest write leaves the copied archive in place and
//! surfaces [`ReleaseError::ManifestWrite`]; [`PromotionEngine::record`]
//! retries that stage alone.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use kart_config::ProjectConfig;
use kart_store::{with_deadline, BlobStore};
use kart_types::{names, Build, Release};

use crate::error::{ReleaseError, ReleaseResult};
use crate::manifest::ReleaseManifest;
use crate::progress::{ProgressEvent, PromotionStage, Reporter};

/// Options for [`PromotionEngine::release`].
#[derive(Clone, Default)]
pub struct PromoteOptions {
    /// Target track. Required.
    pub track: Option<String>,
    /// Naming pattern; defaults to the track's configured pattern.
    pub name_pattern: Option<String>,
    pub reporter: Option<Arc<dyn Reporter>>,
    /// Deadline for the copy; defaults to the configured storage timeout.
    pub timeout: Option<Duration>,
}

impl PromoteOptions {
    pub fn track(track: impl Into<String>) -> Self {
        Self {
            track: Some(track.into()),
            ..Self::default()
        }
    }

    pub fn name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn emit(&self, stage: PromotionStage) {
        if let Some(reporter) = &self.reporter {
            reporter.report(&ProgressEvent::new(stage));
        }
    }
}

impl std::fmt::Debug for PromoteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromoteOptions")
            .field("track", &self.track)
            .field("name_pattern", &self.name_pattern)
            .field("reporter", &self.reporter.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Promotes builds onto release tracks and answers what is released where.
pub struct PromotionEngine {
    store: Arc<dyn BlobStore>,
    config: Arc<dyn ProjectConfig>,
    manifest: ReleaseManifest,
}

impl std::fmt::Debug for PromotionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromotionEngine").finish_non_exhaustive()
    }
}

impl PromotionEngine {
    pub fn new(store: Arc<dyn BlobStore>, config: Arc<dyn ProjectConfig>) -> Self {
        let manifest = ReleaseManifest::new(store.clone(), config.clone());
        Self {
            store,
            config,
            manifest,
        }
    }

    pub fn manifest(&self) -> &ReleaseManifest {
        &self.manifest
    }

    /// Promote `build` onto `opts.track`.
    ///
    /// Returns the promoted release, with its release date set, once both
    /// the copy and the manifest write have succeeded.
    pub async fn release(&self, build: &Build, opts: PromoteOptions) -> ReleaseResult<Release> {
        let track = opts
            .track
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(ReleaseError::MissingTrack)?;
        build.validate()?;
        names::validate_channel(&track)?;

        // Resolve everything up front so a configuration error never strands
        // a copied archive.
        let source_bucket = self.config.resolve_bucket(&build.project)?;
        let target = self.config.resolve_channel(&build.project, &track)?;
        self.manifest.location(&build.project, &track)?;
        let dest_bucket = target
            .deploy_bucket
            .clone()
            .unwrap_or_else(|| source_bucket.clone());

        let name_pattern = opts.name_pattern.clone().or(target.name_pattern);
        let mut release = Release::promote(build, &track, name_pattern);
        opts.emit(PromotionStage::Requested);

        let source_key = build.key();
        let dest_key = release.key();
        let deadline = opts.timeout.or_else(|| self.config.storage_timeout());
        let in_place = source_bucket == dest_bucket && source_key == dest_key;
        if !in_place {
            self.check_target_free(&release, &dest_bucket, &source_key, deadline)
                .await?;
        }

        opts.emit(PromotionStage::Copying);
        with_deadline(
            deadline,
            self.store
                .copy_to(&source_bucket, &source_key, &dest_bucket, &dest_key),
        )
        .await
        .map_err(|source| {
            warn!(source_key = %source_key, dest_key = %dest_key, error = %source, "promotion copy failed");
            ReleaseError::PromotionCopy {
                source_key: source_key.clone(),
                dest_key: dest_key.clone(),
                source,
            }
        })?;

        opts.emit(PromotionStage::Copied);
        release.stamp_release_date();

        opts.emit(PromotionStage::ManifestWriting);
        if let Err(err) = self.record(build, &track).await {
            return Err(match err {
                ReleaseError::ManifestWrite { key, source, .. } => {
                    warn!(key = %key, error = %source, "archive copied but release manifest not written");
                    ReleaseError::ManifestWrite {
                        key,
                        source,
                        release: Some(Box::new(release)),
                    }
                }
                other => other,
            });
        }
        opts.emit(PromotionStage::Done);

        info!(
            project = %build.project,
            from = %build.channel,
            track = %track,
            number = build.number,
            bucket = %dest_bucket,
            key = %dest_key,
            "released build"
        );
        Ok(release)
    }

    /// Refuse to copy over an archive the catalog stored on the track itself.
    ///
    /// A catalog build has a metadata record; a previously promoted copy does
    /// not, so promoting the same build again is allowed.
    async fn check_target_free(
        &self,
        release: &Release,
        dest_bucket: &str,
        source_key: &str,
        deadline: Option<Duration>,
    ) -> ReleaseResult<()> {
        let record_key = release.build.record_key();
        match with_deadline(deadline, self.store.get(dest_bucket, &record_key)).await {
            Ok(_) => {
                warn!(bucket = dest_bucket, key = %release.key(), "release target holds a stored build");
                Err(ReleaseError::ReleaseCollision {
                    bucket: dest_bucket.to_string(),
                    key: release.key(),
                })
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(source) => Err(ReleaseError::PromotionCopy {
                source_key: source_key.to_string(),
                dest_key: release.key(),
                source,
            }),
        }
    }

    /// Write the manifest of `track` to name `build`.
    ///
    /// This is the last stage of [`release`](Self::release) on its own, for
    /// retrying after a [`ReleaseError::ManifestWrite`]. The manifest records
    /// the build as stored, not the promoted copy.
    pub async fn record(&self, build: &Build, track: &str) -> ReleaseResult<()> {
        self.manifest
            .write_for(&build.project, track, &Release::from(build.clone()))
            .await
    }

    /// What is currently released for `channel` of `project`.
    pub async fn status(&self, project: &str, channel: &str) -> ReleaseResult<Option<Release>> {
        self.manifest.read(project, channel).await
    }
}
