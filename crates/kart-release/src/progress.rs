//! Promotion progress reporting.
//!
//! A promotion emits one [`ProgressEvent`] per stage to the caller's
//! [`Reporter`]. Reporting is fire-and-forget: a reporter cannot fail the
//! promotion and must not block it.

use tokio::sync::mpsc;
use tracing::info;

/// Stage of a promotion, in the order they are reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PromotionStage {
    Requested,
    Copying,
    Copied,
    ManifestWriting,
    Done,
}

impl PromotionStage {
    /// Human-readable message for the stage.
    pub fn message(self) -> &'static str {
        match self {
            Self::Requested => "Promotion requested",
            Self::Copying => "Copying file to release channel",
            Self::Copied => "File moved to release channel",
            Self::ManifestWriting => "Updating release manifest",
            Self::Done => "Release recorded",
        }
    }
}

/// One progress notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: PromotionStage,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(stage: PromotionStage) -> Self {
        Self {
            stage,
            message: stage.message().to_string(),
        }
    }
}

/// Receives promotion progress.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Discards every event.
pub struct NoOpReporter;

impl Reporter for NoOpReporter {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Logs every event at `info`.
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &ProgressEvent) {
        info!(stage = ?event.stage, "{}", event.message);
    }
}

/// Forwards events into an unbounded tokio channel.
///
/// Events sent after the receiver is dropped are discarded.
pub struct ChannelReporter {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Reporter for ChannelReporter {
    fn report(&self, event: &ProgressEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Adapts a closure into a [`Reporter`].
pub struct FnReporter<F>(pub F);

impl<F> Reporter for FnReporter<F>
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) {
        (self.0)(event)
    }
}
