//! Shared HTTP send loop with bounded exponential backoff

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::LlmError;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Fallback when a 429 carries no usable `retry-after`
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Backoff before the given (1-based) retry attempt
pub(crate) fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt.saturating_sub(1)))
}

/// POST a JSON body and decode the JSON answer
///
/// `build` is called once per attempt because a `RequestBuilder` is
/// consumed by `send`. Errors are classified by `LlmError::is_retryable`;
/// rate limiting is reported immediately rather than slept through, so the
/// caller's per-call timeout stays meaningful.
pub(crate) async fn send_json<T, F>(build: F) -> Result<T, LlmError>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let mut last_error = None;
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let backoff = backoff_for(attempt);
            warn!(attempt, backoff_ms = backoff.as_millis() as u64, "send_json: retrying after transient error");
            tokio::time::sleep(backoff).await;
        }

        let error = match build().send().await {
            Ok(response) if response.status().is_success() => {
                debug!("send_json: success");
                return Ok(response.json::<T>().await?);
            }
            Ok(response) => error_from_response(response).await,
            Err(e) => LlmError::Network(e),
        };

        if error.is_rate_limit() || !error.is_retryable() {
            debug!(attempt, error = %error, "send_json: not retrying");
            return Err(error);
        }
        debug!(attempt, error = %error, "send_json: transient error");
        last_error = Some(error);
    }

    Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
}

/// Map a non-success response to `RateLimited` (429) or `ApiError`
async fn error_from_response(response: Response) -> LlmError {
    let status = response.status().as_u16();
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return LlmError::RateLimited {
            retry_after: Duration::from_secs(retry_after),
        };
    }

    let message = response.text().await.unwrap_or_default();
    LlmError::ApiError { status, message }
}
