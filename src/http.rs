//! JSON-over-HTTP calls with retry and exponential backoff.
//!
//! Shared by the remote embedding providers, the completion providers and
//! the HTTP answering system:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every failure is reported as [`HarnessError::ExternalService`].

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use kb_harness_core::error::{HarnessError, Result};

/// Build a client with the given request timeout.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| HarnessError::external(format!("failed to build HTTP client: {}", e)))
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send the request produced by `build` until it succeeds, fails with a
/// non-retryable status, or `max_retries` retries are used up. Returns the
/// parsed JSON body of the successful response.
///
/// `service` names the remote side in error messages.
pub async fn send_json_with_retry<F>(service: &str, max_retries: u32, build: F) -> Result<Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            warn!(
                service,
                attempt,
                delay_secs = delay.as_secs(),
                "Retrying after transient error"
            );
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json::<Value>().await.map_err(|e| {
                        HarnessError::external(format!("{} returned invalid JSON: {}", service, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = HarnessError::external(format!(
                    "{} API error {}: {}",
                    service, status, body_text
                ));
                if is_retryable(status) {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(HarnessError::external(format!(
                    "{} connection error: {}",
                    service, e
                )));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        HarnessError::external(format!("{} request failed after retries", service))
    }))
}
