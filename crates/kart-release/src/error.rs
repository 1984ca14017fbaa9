//! Error types for promotion and manifest operations.

use kart_config::ConfigError;
use kart_store::StoreError;
use kart_types::{Release, TypeError};
use thiserror::Error;

/// Errors raised by [`PromotionEngine`](crate::PromotionEngine) and
/// [`ReleaseManifest`](crate::ReleaseManifest).
///
/// Each variant names the stage that failed. Side effects of earlier stages
/// are left in place.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// No target track was given.
    #[error("no track specified")]
    MissingTrack,

    /// The project is not configured.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// The channel or track is not configured for the project.
    #[error("unknown channel {channel:?} for project {project:?}")]
    UnknownChannel { project: String, channel: String },

    /// A build or track name cannot be used in a storage key.
    #[error("invalid release: {0}")]
    Invalid(#[from] TypeError),

    /// The release key already holds a build stored on the target track.
    /// Nothing was copied.
    #[error("release target {bucket}/{key} already holds a stored build")]
    ReleaseCollision { bucket: String, key: String },

    /// Copying the archive to the release location failed. Nothing was recorded.
    #[error("copy to release channel failed ({source_key} -> {dest_key}): {source}")]
    PromotionCopy {
        source_key: String,
        dest_key: String,
        source: StoreError,
    },

    /// Writing the release manifest failed.
    ///
    /// When raised by a promotion the archive has already been copied and
    /// `release` holds the promoted record; retry with
    /// [`PromotionEngine::record`](crate::PromotionEngine::record).
    #[error("release manifest write failed at {key}: {source}")]
    ManifestWrite {
        key: String,
        source: StoreError,
        release: Option<Box<Release>>,
    },

    /// Reading the release manifest failed for a reason other than absence.
    #[error("release manifest read failed at {key}: {source}")]
    ManifestRead { key: String, source: StoreError },

    /// The manifest exists but does not decode.
    #[error("corrupt release manifest at {key}: {reason}")]
    CorruptManifest { key: String, reason: String },

    /// Any other configuration failure.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReleaseError {
    /// Returns `true` if the archive was copied but the manifest not updated.
    pub fn is_copied_but_unrecorded(&self) -> bool {
        matches!(self, Self::ManifestWrite { release: Some(_), .. })
    }
}

impl From<ConfigError> for ReleaseError {
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

/// Convenience alias for release results.
pub type ReleaseResult<T> = Result<T, ReleaseError>;
