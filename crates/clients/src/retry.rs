use crate::error::{ClientError, Result};
use std::future::Future;
use std::time::Duration;

/// Retries `f` with exponential backoff, bounded to `max_attempts` total
/// tries (§7: "retry with exponential backoff up to a small bound inside
/// the client"). Only retries transient failures (`Request`); `Status`,
/// `Decode`, `DimensionMismatch`, and `Cancelled` are returned immediately
/// since retrying them would not change the outcome.
pub async fn with_retry<F, Fut, T>(max_attempts: u32, base_delay: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= max_attempts || !is_transient(&err) => return Err(err),
            Err(err) => {
                log::warn!("transient client error on attempt {attempt}: {err}");
                tokio::time::sleep(base_delay * 2u32.pow(attempt)).await;
                attempt += 1;
            }
        }
    }
}

fn is_transient(err: &ClientError) -> bool {
    matches!(err, ClientError::Request { .. })
}
