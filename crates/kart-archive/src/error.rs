//! Error types for catalog operations.

use std::path::PathBuf;

use kart_config::ConfigError;
use kart_store::StoreError;
use kart_types::{Build, TypeError};

/// Errors that can occur while storing, listing, or removing builds.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The project is not configured.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// The channel is not configured for the project.
    #[error("unknown channel {channel:?} for project {project:?}")]
    UnknownChannel { project: String, channel: String },

    /// The source directory is missing or unreadable.
    #[error("source directory {path:?} not found: {reason}")]
    SourceNotFound { path: PathBuf, reason: String },

    /// A build identity field cannot be used in a storage key.
    #[error("invalid build: {0}")]
    InvalidBuild(#[from] TypeError),

    /// A sort key names no build field.
    #[error("cannot sort by unknown field: {0}")]
    UnknownSortField(String),

    /// Packaging the source directory failed.
    #[error("packaging failed: {0}")]
    Package(String),

    /// The build's archive is not in storage.
    #[error("build not found: {0}")]
    BuildNotFound(String),

    /// A metadata record exists but cannot be decoded.
    #[error("corrupt build record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Writing the archive failed. Nothing was stored.
    #[error("archive write failed at {key}: {source}")]
    ArchiveWrite { key: String, source: StoreError },

    /// The archive was stored but its metadata record was not.
    ///
    /// `build` is listable under its number; retry the record alone with
    /// [`Catalog::record`](crate::Catalog::record).
    #[error("build record write failed at {key} (archive already stored): {source}")]
    RecordWrite {
        key: String,
        source: StoreError,
        build: Box<Build>,
    },

    /// Deleting the archive failed. The build is still listed.
    #[error("archive delete failed at {key}: {source}")]
    ArchiveDelete { key: String, source: StoreError },

    /// The archive was deleted but its record was not. Removing again
    /// finishes the job.
    #[error("build record delete failed at {key} (archive already removed): {source}")]
    RecordDelete { key: String, source: StoreError },

    /// The channel already holds the highest representable build number.
    #[error("build numbers exhausted for {project}/{channel}")]
    NumbersExhausted { project: String, channel: String },

    /// Any other configuration failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<ConfigError> for CatalogError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownProject(project) => Self::UnknownProject(project),
            ConfigError::UnknownChannel { project, channel } => {
                Self::UnknownChannel { project, channel }
            }
            other => Self::Config(other.to_string()),
        }
    }
}

/// Convenience alias for catalog results.
pub type CatalogResult<T> = Result<T, CatalogError>;
