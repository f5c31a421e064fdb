//! Concrete HTTP providers behind the core capability traits.
//!
//! - **[`openai::OpenAiChat`]** — chat completions with tool calling.
//! - **[`openai::OpenAiEmbedder`]** — `POST /v1/embeddings`.
//! - **[`cohere::CohereReranker`]** — `POST /v2/rerank` cross-encoder.
//! - **[`tavily::TavilySearch`]** — web search snippets.
//!
//! All providers share the same retry strategy for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

pub mod cohere;
pub mod openai;
pub mod tavily;

use std::time::Duration;

use feedback_harness_core::{HarnessError, Result};
use tracing::warn;

/// Send a prepared request with retry/backoff, returning the parsed
/// JSON body on success.
pub(crate) async fn send_json_with_retry(
    request: reqwest::RequestBuilder,
    max_retries: u32,
    what: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let request = request
            .try_clone()
            .ok_or_else(|| HarnessError::Provider(format!("{what}: unclonable request body")))?;

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| HarnessError::Provider(format!("{what}: bad JSON body: {e}")));
                }

                let body = response.text().await.unwrap_or_default();

                // Rate limited or server error: retry.
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(attempt, %status, "{what} transient error, will retry");
                    last_err = Some(HarnessError::Provider(format!(
                        "{what}: HTTP {status}: {body}"
                    )));
                    continue;
                }

                // Other client errors are not retryable.
                return Err(HarnessError::Provider(format!(
                    "{what}: HTTP {status}: {body}"
                )));
            }
            Err(e) => {
                warn!(attempt, "{what} network error, will retry: {e}");
                last_err = Some(HarnessError::Provider(format!("{what}: {e}")));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| HarnessError::Provider(format!("{what}: failed after retries"))))
}

/// Build the shared HTTP client with the configured timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| HarnessError::Provider(format!("failed to build HTTP client: {e}")))
}
