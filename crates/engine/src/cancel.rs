//! Cancellation and timeout helpers for external calls

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult};

/// Run `fut` unless `token` is cancelled first
pub async fn with_cancel<F, T>(token: &CancellationToken, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    if token.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(EngineError::Cancelled),
        res = fut => res,
    }
}

/// Like [`with_cancel`], also bounded by `limit`
pub async fn with_deadline<F, T>(
    token: &CancellationToken,
    what: &str,
    limit: Duration,
    fut: F,
) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    with_cancel(token, async {
        match tokio::time::timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(EngineError::Timeout {
                what: what.to_string(),
                seconds: limit.as_secs(),
            }),
        }
    })
    .await
}

/// Sleep that returns early with `Cancelled`
pub async fn sleep(token: &CancellationToken, duration: Duration) -> EngineResult<()> {
    with_cancel(token, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}
