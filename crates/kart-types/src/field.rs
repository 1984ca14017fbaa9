//! Named build fields used by catalog filtering and sorting.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::build::Build;
use crate::error::TypeError;

/// A field of [`Build`] addressable by name.
///
/// Metadata entries are addressed as `metadata.<name>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BuildField {
    Project,
    Channel,
    Version,
    Number,
    Arch,
    Ext,
    Metadata(String),
}

impl FromStr for BuildField {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "channel" => Ok(Self::Channel),
            "version" => Ok(Self::Version),
            "number" => Ok(Self::Number),
            "arch" => Ok(Self::Arch),
            "ext" => Ok(Self::Ext),
            other => match other.strip_prefix("metadata.") {
                Some(name) if !name.is_empty() => Ok(Self::Metadata(name.to_string())),
                _ => Err(TypeError::UnknownField(s.to_string())),
            },
        }
    }
}

impl fmt::Display for BuildField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => f.write_str("project"),
            Self::Channel => f.write_str("channel"),
            Self::Version => f.write_str("version"),
            Self::Number => f.write_str("number"),
            Self::Arch => f.write_str("arch"),
            Self::Ext => f.write_str("ext"),
            Self::Metadata(name) => write!(f, "metadata.{name}"),
        }
    }
}

impl Build {
    /// Exact-match test of a single field against its string form.
    ///
    /// `number` matches its plain decimal form only, so `012` or `+12` never
    /// match build 12. A metadata key the build does not carry never matches.
    pub fn field_matches(&self, field: &BuildField, value: &str) -> bool {
        match field {
            BuildField::Project => self.project == value,
            BuildField::Channel => self.channel == value,
            BuildField::Version => self.version == value,
            BuildField::Number => self.number.to_string() == value,
            BuildField::Arch => self.arch == value,
            BuildField::Ext => self.ext == value,
            BuildField::Metadata(name) => self.metadata.get(name).is_some_and(|v| v == value),
        }
    }

    /// Natural ordering of two builds on a single field.
    pub fn cmp_field(&self, other: &Self, field: &BuildField) -> Ordering {
        match field {
            BuildField::Project => self.project.cmp(&other.project),
            BuildField::Channel => self.channel.cmp(&other.channel),
            BuildField::Version => cmp_versions(&self.version, &other.version),
            BuildField::Number => self.number.cmp(&other.number),
            BuildField::Arch => self.arch.cmp(&other.arch),
            BuildField::Ext => self.ext.cmp(&other.ext),
            // None sorts before Some.
            BuildField::Metadata(name) => self.metadata.get(name).cmp(&other.metadata.get(name)),
        }
    }
}

/// Compare version strings segment by segment.
///
/// Segments are split on `.`, `-` and `+`. Numeric segments compare
/// numerically and sort before alphanumeric ones; `1.10` is newer than `1.9`.
pub fn cmp_versions(a: &str, b: &str) -> Ordering {
    let split = |s: &str| s.split(['.', '-', '+']).map(str::to_owned).collect::<Vec<_>>();
    let (left, right) = (split(a), split(b));

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}
