//! Release promotion for kart.
//!
//! Moves archived builds onto distribution tracks and keeps a per-track
//! manifest naming the build currently released there.
//!
//! # Architecture
//!
//! - **[`PromotionEngine`]**: `release`, `record`, `status`
//! - **[`ReleaseManifest`]**: read and overwrite `kart.json` manifests
//! - **[`progress`]**: stage events delivered to a caller-supplied [`Reporter`]

pub mod engine;
pub mod error;
pub mod manifest;
pub mod progress;

pub use engine::{PromoteOptions, PromotionEngine};
pub use error::{ReleaseError, ReleaseResult};
pub use manifest::ReleaseManifest;
pub use progress::{
    ChannelReporter, FnReporter, NoOpReporter, ProgressEvent, PromotionStage, Reporter,
    TracingReporter,
};
