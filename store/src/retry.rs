use std::future::Future;
use std::time::Duration;

use errors::StoreError;

/// Runs `f` up to `attempts` times with linear backoff (50ms, 100ms, ...)
/// between attempts, returning the last error when the budget is spent.
pub(crate) async fn with_retry<T, F, Fut>(attempts: usize, mut f: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut last = None;
    for i in 0..attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => last = Some(err),
        }
        if i + 1 < attempts {
            tokio::time::sleep(Duration::from_millis(50 * (i as u64 + 1))).await;
        }
    }
    Err(last.unwrap_or(StoreError::ConnectionFailed))
}
