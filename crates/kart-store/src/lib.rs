//! Blob storage for kart.
//!
//! The catalog and promotion engine drive storage exclusively through the
//! [`BlobStore`] trait: a bucketed key-value store with put, get,
//! server-side copy, idempotent delete, and prefix listing. The store never
//! interprets keys or payloads.
//!
//! # Storage Backends
//!
//! - [`InMemoryBlobStore`] -- map-based store for tests and embedding
//! - [`FsBlobStore`] -- directory-per-bucket store on the local filesystem
//!
//! Any other object service (S3 and friends) plugs in by implementing the
//! trait.

pub mod deadline;
pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use deadline::with_deadline;
pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;
pub use traits::BlobStore;
