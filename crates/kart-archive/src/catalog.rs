//! The build catalog.
//!
//! All state lives in the blob store. For each build the catalog keeps two
//! objects in the project bucket:
//!
//! - the archive at [`key::build_key`], which is the source of truth for
//!   what exists and is what `list` enumerates
//! - a JSON record at [`key::record_key`] carrying metadata the key cannot
//!
//! A build whose record is missing lists with empty metadata; a record
//! without an archive is never listed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use kart_config::ProjectConfig;
use kart_store::{with_deadline, BlobStore};
use kart_types::{key, Build, Metadata, Release, DEFAULT_ARCH, DEFAULT_EXT};

use crate::error::{CatalogError, CatalogResult};
use crate::options::{self, ListOptions, SortOrder};
use crate::package;

/// Everything needed to archive one build.
#[derive(Clone, Debug)]
pub struct StoreRequest {
    pub source_dir: PathBuf,
    pub project: String,
    pub channel: String,
    pub version: String,
    /// Defaults to `all`.
    pub arch: Option<String>,
    /// Default release naming pattern, kept in the build record.
    pub name_pattern: Option<String>,
    /// Defaults to `tar.gz`.
    pub ext: Option<String>,
    pub metadata: Metadata,
}

impl StoreRequest {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        project: impl Into<String>,
        channel: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            project: project.into(),
            channel: channel.into(),
            version: version.into(),
            arch: None,
            name_pattern: None,
            ext: None,
            metadata: Metadata::new(),
        }
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }

    pub fn name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    pub fn ext(mut self, ext: impl Into<String>) -> Self {
        self.ext = Some(ext.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Stores, lists, and removes builds.
///
/// The catalog holds no mutable state between calls and can be shared
/// freely between concurrent tasks.
pub struct Catalog {
    store: Arc<dyn BlobStore>,
    config: Arc<dyn ProjectConfig>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}

impl Catalog {
    pub fn new(store: Arc<dyn BlobStore>, config: Arc<dyn ProjectConfig>) -> Self {
        Self { store, config }
    }

    fn deadline(&self) -> Option<Duration> {
        self.config.storage_timeout()
    }

    /// Resolve the bucket of a configured (project, channel) pair.
    fn resolve(&self, project: &str, channel: &str) -> CatalogResult<String> {
        let bucket = self.config.resolve_bucket(project)?;
        self.config.resolve_channel(project, channel)?;
        Ok(bucket)
    }

    /// Archive `request.source_dir` as a new build.
    ///
    /// The build number is `max(existing numbers in project+channel) + 1`.
    /// Inference is read-then-write with no lock around it: two concurrent
    /// stores into the same pair can be assigned the same number, and the
    /// later write wins. Serialize stores per pair, or put an external
    /// compare-and-swap in front of this call, if that matters.
    pub async fn store(&self, request: StoreRequest) -> CatalogResult<Build> {
        let bucket = self.resolve(&request.project, &request.channel)?;

        let arch = request.arch.unwrap_or_else(|| DEFAULT_ARCH.to_string());
        let ext = request.ext.unwrap_or_else(|| DEFAULT_EXT.to_string());
        // Validate the identity before doing any I/O; the number is patched in below.
        let mut build = Build::new(&request.project, &request.channel, &request.version, 1)
            .with_arch(arch)
            .with_ext(ext)
            .with_metadata(request.metadata);
        build.validate()?;

        check_source(&request.source_dir).await?;
        let source = request.source_dir.clone();
        let archive = tokio::task::spawn_blocking(move || package::pack_dir(&source))
            .await
            .map_err(|e| CatalogError::Package(format!("packaging task failed: {e}")))?
            .map_err(|e| CatalogError::Package(e.to_string()))?;

        build.number = self.next_number_in(&bucket, &build.project, &build.channel).await?;
        let archive_key = build.key();

        let size = archive.len();
        with_deadline(
            self.deadline(),
            self.store.put(&bucket, &archive_key, Bytes::from(archive)),
        )
        .await
        .map_err(|source| CatalogError::ArchiveWrite {
            key: archive_key.clone(),
            source,
        })?;

        if let Err(err) = self.write_record(&bucket, &build, request.name_pattern).await {
            warn!(key = %archive_key, error = %err, "archive stored without its record");
            return Err(err);
        }

        info!(
            project = %build.project,
            channel = %build.channel,
            version = %build.version,
            number = build.number,
            key = %archive_key,
            bytes = size,
            "stored build"
        );
        Ok(build)
    }

    /// Write the metadata record of an already stored build.
    ///
    /// This is the last stage of [`store`](Self::store) on its own, for
    /// retrying after a [`CatalogError::RecordWrite`].
    pub async fn record(&self, build: &Build, name_pattern: Option<String>) -> CatalogResult<()> {
        build.validate()?;
        let bucket = self.config.resolve_bucket(&build.project)?;
        self.write_record(&bucket, build, name_pattern).await
    }

    async fn write_record(
        &self,
        bucket: &str,
        build: &Build,
        name_pattern: Option<String>,
    ) -> CatalogResult<()> {
        let record_key = build.record_key();
        let mut record = Release::from(build.clone());
        record.name_pattern = name_pattern;
        let json = record.to_json()?;
        with_deadline(
            self.deadline(),
            self.store.put(bucket, &record_key, Bytes::from(json)),
        )
        .await
        .map_err(|source| CatalogError::RecordWrite {
            key: record_key,
            source,
            build: Box::new(build.clone()),
        })
    }

    /// The number the next stored build in (project, channel) would receive.
    pub async fn next_number(&self, project: &str, channel: &str) -> CatalogResult<u64> {
        let bucket = self.resolve(project, channel)?;
        self.next_number_in(&bucket, project, channel).await
    }

    async fn next_number_in(&self, bucket: &str, project: &str, channel: &str) -> CatalogResult<u64> {
        let max = self
            .build_keys(bucket, project, channel)
            .await?
            .iter()
            .map(|k| k.number)
            .max()
            .unwrap_or(0);
        max.checked_add(1)
            .ok_or_else(|| CatalogError::NumbersExhausted {
                project: project.to_string(),
                channel: channel.to_string(),
            })
    }

    async fn build_keys(
        &self,
        bucket: &str,
        project: &str,
        channel: &str,
    ) -> CatalogResult<Vec<key::BuildKey>> {
        let prefix = key::channel_prefix(project, channel);
        let keys = with_deadline(self.deadline(), self.store.list(bucket, &prefix)).await?;

        let parsed: Vec<_> = keys
            .iter()
            .filter_map(|k| {
                let parsed = key::parse_build_key(k);
                if parsed.is_none() {
                    debug!(key = %k, "skipping non-build key");
                }
                parsed
            })
            .filter(|k| k.project == project && k.channel == channel)
            .collect();
        debug!(bucket, prefix = %prefix, found = parsed.len(), "listed build keys");
        Ok(parsed)
    }

    /// Load the stored record of a build; `None` if it has none.
    async fn load_record(&self, bucket: &str, build: &Build) -> CatalogResult<Option<Release>> {
        let record_key = build.record_key();
        match with_deadline(self.deadline(), self.store.get(bucket, &record_key)).await {
            Ok(data) => Release::from_json(&data)
                .map(Some)
                .map_err(|e| CatalogError::CorruptRecord {
                    key: record_key,
                    reason: e.to_string(),
                }),
            Err(e) if e.is_not_found() => {
                warn!(key = %record_key, "build has no record, listing without metadata");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List the builds of (project, channel).
    ///
    /// The result reflects the store at some point during the call; builds
    /// removed concurrently may or may not appear.
    pub async fn list(
        &self,
        project: &str,
        channel: &str,
        opts: &ListOptions,
    ) -> CatalogResult<Vec<Build>> {
        let bucket = self.resolve(project, channel)?;

        let sort = opts.compiled_sort()?;
        let Some(filter) = opts.compiled_filter() else {
            debug!(project, channel, "filter names an unknown field, nothing can match");
            return Ok(Vec::new());
        };

        let mut builds = Vec::new();
        for build_key in self.build_keys(&bucket, project, channel).await? {
            let mut build = build_key.into_build(Metadata::new());
            if let Some(record) = self.load_record(&bucket, &build).await? {
                build.metadata = record.build.metadata;
            }
            builds.push(build);
        }

        options::apply(&mut builds, &filter, sort, opts.limit);
        Ok(builds)
    }

    /// The highest-numbered build of (project, channel).
    pub async fn latest(&self, project: &str, channel: &str) -> CatalogResult<Option<Build>> {
        let opts = ListOptions::new()
            .sort_by(["number"], SortOrder::Descending)
            .limit(1);
        Ok(self.list(project, channel, &opts).await?.into_iter().next())
    }

    /// Find a build by number.
    pub async fn get(&self, project: &str, channel: &str, number: u64) -> CatalogResult<Build> {
        let opts = ListOptions::new().filter("number", number.to_string());
        self.list(project, channel, &opts)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::BuildNotFound(format!("{project}/{channel}#{number}")))
    }

    /// Naming pattern recorded when the build was stored.
    pub async fn name_pattern(&self, build: &Build) -> CatalogResult<Option<String>> {
        let bucket = self.config.resolve_bucket(&build.project)?;
        Ok(self
            .load_record(&bucket, build)
            .await?
            .and_then(|r| r.name_pattern))
    }

    /// Read the archive bytes of a build.
    pub async fn fetch(&self, build: &Build) -> CatalogResult<Bytes> {
        let bucket = self.config.resolve_bucket(&build.project)?;
        let archive_key = build.key();
        match with_deadline(self.deadline(), self.store.get(&bucket, &archive_key)).await {
            Ok(data) => Ok(data),
            Err(e) if e.is_not_found() => Err(CatalogError::BuildNotFound(archive_key)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a build's archive and record.
    ///
    /// Removing a build that is already gone succeeds.
    pub async fn remove(&self, build: &Build) -> CatalogResult<()> {
        let bucket = self.config.resolve_bucket(&build.project)?;
        let archive_key = build.key();

        // Archive first: once it is gone the build is no longer listed.
        with_deadline(self.deadline(), self.store.delete(&bucket, &archive_key))
            .await
            .map_err(|source| CatalogError::ArchiveDelete {
                key: archive_key.clone(),
                source,
            })?;
        let record_key = build.record_key();
        with_deadline(self.deadline(), self.store.delete(&bucket, &record_key))
            .await
            .map_err(|source| CatalogError::RecordDelete {
                key: record_key,
                source,
            })?;

        info!(
            project = %build.project,
            channel = %build.channel,
            number = build.number,
            key = %archive_key,
            "removed build"
        );
        Ok(())
    }
}

async fn check_source(path: &Path) -> CatalogResult<()> {
    let not_found = |reason: String| CatalogError::SourceNotFound {
        path: path.to_path_buf(),
        reason,
    };

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| not_found(e.to_string()))?;
    if !meta.is_dir() {
        return Err(not_found("not a directory".into()));
    }
    tokio::fs::read_dir(path)
        .await
        .map_err(|e| not_found(e.to_string()))?;
    Ok(())
}
