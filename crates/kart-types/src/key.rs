//! The storage key scheme.
//!
//! Layout:
//!
//! ```text
//! <project>/<channel>/<version>/<number>_<arch>.<ext>   archive
//! _records/<archive key>.json                          metadata record
//! <project>/<track>/kart.json                          release manifest
//! ```
//!
//! Keys are stable across releases of this crate: existing archives must
//! stay addressable. Because every segment is validated by [`crate::names`],
//! [`build_key`] is injective and [`parse_build_key`] inverts it.

use crate::build::{Build, Metadata};
use crate::names;

/// File name of the per-track release manifest.
pub const MANIFEST_FILE: &str = "kart.json";

/// Namespace holding build metadata records.
pub const RECORD_NAMESPACE: &str = "_records";

/// Key of a build's archive object.
pub fn build_key(build: &Build) -> String {
    format!(
        "{}/{}/{}/{}_{}.{}",
        build.project, build.channel, build.version, build.number, build.arch, build.ext
    )
}

/// Key of a build's metadata record.
pub fn record_key(build: &Build) -> String {
    format!("{RECORD_NAMESPACE}/{}.json", build_key(build))
}

/// Prefix under which all archives of a (project, channel) pair live.
pub fn channel_prefix(project: &str, channel: &str) -> String {
    format!("{project}/{channel}/")
}

/// Key of the release manifest for a (project, deploy track) pair.
pub fn manifest_key(project: &str, track: &str) -> String {
    format!("{project}/{track}/{MANIFEST_FILE}")
}

/// Identity fields recovered from an archive key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildKey {
    pub project: String,
    pub channel: String,
    pub version: String,
    pub number: u64,
    pub arch: String,
    pub ext: String,
}

impl BuildKey {
    /// Materialize a [`Build`] with the given metadata.
    pub fn into_build(self, metadata: Metadata) -> Build {
        Build {
            project: self.project,
            channel: self.channel,
            version: self.version,
            number: self.number,
            arch: self.arch,
            ext: self.ext,
            metadata,
        }
    }
}

/// Parse an archive key. Returns `None` for anything that is not one,
/// including manifests and keys written by foreign tools.
pub fn parse_build_key(key: &str) -> Option<BuildKey> {
    let mut parts = key.split('/');
    let project = parts.next()?;
    let channel = parts.next()?;
    let version = parts.next()?;
    let file = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let (number, rest) = file.split_once('_')?;
    let (arch, ext) = rest.split_once('.')?;

    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let parsed: u64 = number.parse().ok()?;
    // Only the canonical rendering maps back to the same key.
    if parsed == 0 || parsed.to_string() != number {
        return None;
    }

    names::validate_project(project).ok()?;
    names::validate_channel(channel).ok()?;
    names::validate_version(version).ok()?;
    names::validate_arch(arch).ok()?;
    names::validate_ext(ext).ok()?;

    Some(BuildKey {
        project: project.to_string(),
        channel: channel.to_string(),
        version: version.to_string(),
        number: parsed,
        arch: arch.to_string(),
        ext: ext.to_string(),
    })
}
