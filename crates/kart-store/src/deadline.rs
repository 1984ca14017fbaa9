use std::future::Future;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};

/// Run a storage future under an optional deadline.
///
/// On elapse the future is dropped and [`StoreError::TimedOut`] is returned.
/// Whatever the dropped operation left behind is unspecified; callers must
/// treat it as failed.
pub async fn with_deadline<T, F>(deadline: Option<Duration>, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StoreError::TimedOut(limit))?,
        None => fut.await,
    }
}
