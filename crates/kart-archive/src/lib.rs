//! The kart build catalog.
//!
//! Packages build directories into archives, stores them under the kart key
//! scheme, and answers listing queries over what is stored.
//!
//! # Architecture
//!
//! - **[`Catalog`]**: `store`, `list`, `remove`, plus lookups (`get`,
//!   `latest`, `fetch`, `next_number`)
//! - **[`ListOptions`]**: exact-match filters, multi-field natural sort, limit
//! - **[`package`]**: deterministic `.tar.gz` packing and extraction
//!
//! Listing is an in-memory pass over keys fetched from the blob store; there
//! is no query engine and no index beyond the key layout itself.

pub mod catalog;
pub mod error;
pub mod options;
pub mod package;

pub use catalog::{Catalog, StoreRequest};
pub use error::{CatalogError, CatalogResult};
pub use options::{ListOptions, SortOrder, SortSpec};
