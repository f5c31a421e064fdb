//! Cohere cross-encoder reranking.

use feedback_harness_core::provider::Reranker;
use feedback_harness_core::{HarnessError, Result};

use async_trait::async_trait;
use serde_json::json;

use super::{http_client, send_json_with_retry};

const RERANK_URL: &str = "https://api.cohere.com/v2/rerank";

/// Rerank provider over the Cohere v2 API.
///
/// The API key is optional at construction: availability is reported
/// through [`Reranker::is_available`] so the strategy factory can fail
/// with a credential error before any retrieval happens.
pub struct CohereReranker {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl CohereReranker {
    pub fn from_env(model: &str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key: std::env::var("COHERE_API_KEY").ok(),
            model: model.to_string(),
            max_retries,
        })
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<usize>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| HarnessError::MissingCredential("COHERE_API_KEY".to_string()))?;

        let body = json!({
            "model": self.model,
            "query": query,
            "documents": candidates,
            "top_n": candidates.len(),
        });
        let request = self
            .client
            .post(RERANK_URL)
            .bearer_auth(api_key)
            .json(&body);
        let response = send_json_with_retry(request, self.max_retries, "Cohere rerank").await?;

        let results = response
            .get("results")
            .and_then(|r| r.as_array())
            .ok_or_else(|| {
                HarnessError::MalformedResponse("rerank response missing results array".to_string())
            })?;

        results
            .iter()
            .map(|item| {
                item.get("index")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as usize)
                    .ok_or_else(|| {
                        HarnessError::MalformedResponse(
                            "rerank result missing index".to_string(),
                        )
                    })
            })
            .collect()
    }
}
