//! Capability traits for external providers.
//!
//! The core treats the embedding model, chat model, rerank model, and
//! web search service as black-box capability providers behind async
//! traits. Concrete HTTP implementations live in the app crate; tests
//! substitute deterministic in-process fakes.
//!
//! | Trait | Contract | Failure |
//! |-------|----------|---------|
//! | [`Embedder`] | texts → vectors | [`HarnessError::Provider`] |
//! | [`ChatModel`] | messages (+tools) → message | [`HarnessError::Provider`] / [`HarnessError::MalformedResponse`] |
//! | [`Reranker`] | query + candidates → reordering | [`HarnessError::Provider`]; credential checked up front |
//! | [`WebSearch`] | query → ranked snippets | [`HarnessError::Provider`] (converted to a tool envelope at the loop boundary) |

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ChatMessage;

/// Embedding provider: text in, vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::error::HarnessError::Provider("empty embedding response".into()))
    }
}

/// Declared shape of a tool offered to the chat model.
///
/// Every tool in this system takes a single `query` string, so the
/// spec carries only name and description; providers are responsible
/// for rendering their wire format.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Token accounting reported by a metered chat provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Estimated cost in USD for this call, when the provider meters it.
    pub cost_usd: f64,
}

/// One chat completion: the assistant message plus optional usage.
#[derive(Debug, Clone)]
pub struct Completion {
    pub message: ChatMessage,
    pub usage: Option<TokenUsage>,
}

/// Chat/completion provider.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion over the transcript. When `tools` is
    /// non-empty the model may propose tool calls in the returned
    /// assistant message.
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<Completion>;
}

/// Cross-encoder rerank provider.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Whether the provider is usable (credential present). Checked at
    /// retriever construction, before any retrieval call is made.
    fn is_available(&self) -> bool;

    /// Reorder `candidates` by relevance to `query`, most relevant
    /// first. Returns indices into the input slice.
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<usize>>;
}

/// External web search provider.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Return up to `max_results` ranked text snippets as one block.
    async fn search(&self, query: &str, max_results: usize) -> Result<String>;
}
