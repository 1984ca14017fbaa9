//! Foundation types for kart.
//!
//! This crate provides the entity model and the storage key scheme shared by
//! every other kart crate.
//!
//! # Key Types
//!
//! - [`Build`]: one archived artifact, identified by project/channel/version/number/arch
//! - [`Release`]: a build snapshot promoted onto a distribution track
//! - [`Metadata`]: free-form string metadata carried by builds
//! - [`BuildField`]: field names used for catalog filtering and sorting
//! - [`key`]: deterministic, reversible storage keys

pub mod build;
pub mod error;
pub mod field;
pub mod key;
pub mod names;

pub use build::{Build, Metadata, Release, DEFAULT_ARCH, DEFAULT_EXT};
pub use error::TypeError;
pub use field::{cmp_versions, BuildField};
pub use key::{parse_build_key, BuildKey};
