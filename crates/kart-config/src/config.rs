use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kart_types::names;

use crate::error::{ConfigError, ConfigResult};

/// Read-only lookup from project/channel names to storage settings.
///
/// Implementations must be thread-safe; one instance is shared by every
/// in-flight catalog and promotion call.
pub trait ProjectConfig: Send + Sync {
    /// Bucket holding the archives of `project`.
    fn resolve_bucket(&self, project: &str) -> ConfigResult<String>;

    /// Deploy settings for `channel` of `project`.
    fn resolve_channel(&self, project: &str, channel: &str) -> ConfigResult<ChannelConfig>;

    /// Deadline applied to each storage operation, if any.
    fn storage_timeout(&self) -> Option<Duration> {
        None
    }
}

/// Resolved settings for one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Track the channel deploys to; names the release manifest location.
    pub deploy_track: String,
    /// Bucket receiving released archives, when it differs from the project bucket.
    pub deploy_bucket: Option<String>,
    /// Default naming pattern for releases onto this channel.
    pub name_pattern: Option<String>,
}

/// `[storage]` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root directory of the filesystem blob store.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Default bucket for every project.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Per-operation storage deadline in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_bucket() -> String {
    "kart-archive".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: None,
            bucket: default_bucket(),
            timeout_secs: None,
        }
    }
}

/// `[projects.<name>]` table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelSettings>,
}

/// `[projects.<name>.channels.<channel>]` table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChannelSettings {
    #[serde(default)]
    pub name_pattern: Option<String>,
    #[serde(default)]
    pub deploy: DeploySettings,
}

impl ChannelSettings {
    /// Deploy this channel to `track`.
    pub fn track(mut self, track: impl Into<String>) -> Self {
        self.deploy.track = Some(track.into());
        self
    }

    /// Put released archives into `bucket`.
    pub fn deploy_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.deploy.bucket = Some(bucket.into());
        self
    }

    pub fn name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }
}

/// `[projects.<name>.channels.<channel>.deploy]` table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Defaults to the channel name.
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
}

/// TOML-backed configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KartConfig {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectSettings>,
}

impl KartConfig {
    /// An empty configuration whose projects default to `bucket`.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            storage: StorageSettings {
                bucket: bucket.into(),
                ..Default::default()
            },
            projects: BTreeMap::new(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(
            path = %path.display(),
            projects = config.projects.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Register a project, optionally with its own bucket.
    pub fn with_project(mut self, project: impl Into<String>, bucket: Option<String>) -> Self {
        self.projects.entry(project.into()).or_default().bucket = bucket;
        self
    }

    /// Register a channel, creating the project if needed.
    pub fn with_channel(
        mut self,
        project: impl Into<String>,
        channel: impl Into<String>,
        settings: ChannelSettings,
    ) -> Self {
        self.projects
            .entry(project.into())
            .or_default()
            .channels
            .insert(channel.into(), settings);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.storage.timeout_secs = Some(timeout.as_secs());
        self
    }

    fn validate(&self) -> ConfigResult<()> {
        let invalid = |e: kart_types::TypeError| ConfigError::Invalid(e.to_string());

        for (project, settings) in &self.projects {
            names::validate_project(project).map_err(invalid)?;
            for (channel, channel_settings) in &settings.channels {
                names::validate_channel(channel).map_err(invalid)?;
                if let Some(track) = &channel_settings.deploy.track {
                    names::validate_channel(track).map_err(invalid)?;
                }
            }
        }
        Ok(())
    }

    fn project(&self, project: &str) -> ConfigResult<&ProjectSettings> {
        self.projects
            .get(project)
            .ok_or_else(|| ConfigError::UnknownProject(project.to_string()))
    }
}

impl ProjectConfig for KartConfig {
    fn resolve_bucket(&self, project: &str) -> ConfigResult<String> {
        let settings = self.project(project)?;
        Ok(settings
            .bucket
            .clone()
            .unwrap_or_else(|| self.storage.bucket.clone()))
    }

    fn resolve_channel(&self, project: &str, channel: &str) -> ConfigResult<ChannelConfig> {
        let settings = self
            .project(project)?
            .channels
            .get(channel)
            .ok_or_else(|| ConfigError::UnknownChannel {
                project: project.to_string(),
                channel: channel.to_string(),
            })?;

        Ok(ChannelConfig {
            deploy_track: settings
                .deploy
                .track
                .clone()
                .unwrap_or_else(|| channel.to_string()),
            deploy_bucket: settings.deploy.bucket.clone(),
            name_pattern: settings.name_pattern.clone(),
        })
    }

    fn storage_timeout(&self) -> Option<Duration> {
        self.storage.timeout_secs.map(Duration::from_secs)
    }
}
