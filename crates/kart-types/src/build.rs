//! Catalog entities: archived builds and the releases promoted from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::key;
use crate::names;

/// Free-form string metadata attached to a build (e.g. `revision`).
///
/// No key is special-cased; the catalog stores and filters whatever the
/// caller supplies.
pub type Metadata = BTreeMap<String, String>;

/// Architecture used when the caller does not name one.
pub const DEFAULT_ARCH: &str = "all";

/// Extension of archives produced by the packager.
pub const DEFAULT_EXT: &str = "tar.gz";

fn default_arch() -> String {
    DEFAULT_ARCH.to_string()
}

fn default_ext() -> String {
    DEFAULT_EXT.to_string()
}

/// One archived artifact.
///
/// Builds are immutable once stored. The storage key is never set directly;
/// it is always derived from the identity fields by [`Build::key`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub project: String,
    pub channel: String,
    pub version: String,
    /// Sequence number within the (project, channel) pair, starting at 1.
    pub number: u64,
    #[serde(default = "default_arch")]
    pub arch: String,
    #[serde(default = "default_ext")]
    pub ext: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Build {
    /// Create a build with the default arch and extension and no metadata.
    pub fn new(
        project: impl Into<String>,
        channel: impl Into<String>,
        version: impl Into<String>,
        number: u64,
    ) -> Self {
        Self {
            project: project.into(),
            channel: channel.into(),
            version: version.into(),
            number,
            arch: default_arch(),
            ext: default_ext(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn with_ext(mut self, ext: impl Into<String>) -> Self {
        self.ext = ext.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check that every identity field is usable inside a storage key.
    pub fn validate(&self) -> Result<(), TypeError> {
        names::validate_project(&self.project)?;
        names::validate_channel(&self.channel)?;
        names::validate_version(&self.version)?;
        names::validate_arch(&self.arch)?;
        names::validate_ext(&self.ext)?;
        if self.number == 0 {
            return Err(TypeError::InvalidIdentifier {
                field: "number",
                value: "0".into(),
                reason: "build numbers start at 1".into(),
            });
        }
        Ok(())
    }

    /// The storage key of this build's archive.
    pub fn key(&self) -> String {
        key::build_key(self)
    }

    /// The storage key of this build's metadata record.
    pub fn record_key(&self) -> String {
        key::record_key(self)
    }

    /// Serialize to the JSON record format.
    pub fn to_json(&self) -> Result<String, TypeError> {
        serde_json::to_string(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Deserialize from the JSON record format.
    pub fn from_json(data: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(data).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

/// A build promoted onto a distribution track.
///
/// A release is a snapshot: it copies the build's fields at promotion time
/// and keeps no link back to the build. Its `channel` is the target track.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    #[serde(flatten)]
    pub build: Build,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
}

impl Release {
    /// Structurally copy `build` onto `track`.
    pub fn promote(build: &Build, track: impl Into<String>, name_pattern: Option<String>) -> Self {
        let mut build = build.clone();
        build.channel = track.into();
        Self {
            build,
            name_pattern,
            release_date: None,
        }
    }

    /// Set the release date to now.
    pub fn stamp_release_date(&mut self) {
        self.release_date = Some(Utc::now());
    }

    /// The storage key of the released archive.
    pub fn key(&self) -> String {
        self.build.key()
    }

    /// Render the name pattern, falling back to the archive file name.
    ///
    /// Recognized placeholders: `{project}`, `{channel}`, `{version}`,
    /// `{number}`, `{arch}`, `{ext}`.
    pub fn display_name(&self) -> String {
        let b = &self.build;
        match &self.name_pattern {
            Some(pattern) => pattern
                .replace("{project}", &b.project)
                .replace("{channel}", &b.channel)
                .replace("{version}", &b.version)
                .replace("{number}", &b.number.to_string())
                .replace("{arch}", &b.arch)
                .replace("{ext}", &b.ext),
            None => format!("{}-{}-{}_{}.{}", b.project, b.version, b.number, b.arch, b.ext),
        }
    }

    pub fn to_json(&self) -> Result<String, TypeError> {
        serde_json::to_string_pretty(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn from_json(data: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(data).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

/// A bare record of a build, as written to a release manifest.
impl From<Build> for Release {
    fn from(build: Build) -> Self {
        Self {
            build,
            name_pattern: None,
            release_date: None,
        }
    }
}
