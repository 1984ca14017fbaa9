//! Error types for configuration lookups.

use thiserror::Error;

/// Errors raised while loading or querying project configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The project is not registered.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// The channel is not registered for the project.
    #[error("unknown channel {channel:?} for project {project:?}")]
    UnknownChannel { project: String, channel: String },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but names something unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
