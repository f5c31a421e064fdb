//! Tavily web search.

use feedback_harness_core::provider::WebSearch;
use feedback_harness_core::{HarnessError, Result};

use async_trait::async_trait;
use serde_json::json;

use super::{http_client, send_json_with_retry};

const SEARCH_URL: &str = "https://api.tavily.com/search";

pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    max_retries: u32,
}

impl TavilySearch {
    /// Fails fast when `TAVILY_API_KEY` is not set.
    pub fn from_env(timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let api_key = std::env::var("TAVILY_API_KEY")
            .map_err(|_| HarnessError::MissingCredential("TAVILY_API_KEY".to_string()))?;
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            max_retries,
        })
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<String> {
        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
        });
        let request = self.client.post(SEARCH_URL).json(&body);
        let response = send_json_with_retry(request, self.max_retries, "Tavily search").await?;

        let results = response
            .get("results")
            .and_then(|r| r.as_array())
            .ok_or_else(|| {
                HarnessError::MalformedResponse("search response missing results array".to_string())
            })?;

        let snippets: Vec<&str> = results
            .iter()
            .take(max_results)
            .filter_map(|item| item.get("content").and_then(|c| c.as_str()))
            .collect();

        if snippets.is_empty() {
            return Ok("No web results found.".to_string());
        }
        Ok(snippets.join("\n\n"))
    }
}
