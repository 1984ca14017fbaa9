//! Project and channel configuration for kart.
//!
//! The catalog and promotion engine never read global state: they receive a
//! [`ProjectConfig`] at construction time and ask it to resolve project
//! buckets and channel deploy settings. [`KartConfig`] is the TOML-backed
//! implementation used by the CLI and by tests.

pub mod config;
pub mod error;

pub use config::{
    ChannelConfig, ChannelSettings, DeploySettings, KartConfig, ProjectConfig, ProjectSettings,
    StorageSettings,
};
pub use error::{ConfigError, ConfigResult};
