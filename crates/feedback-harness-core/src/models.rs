//! Core data types shared across the retrieval and agent pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where a piece of feedback came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackSource {
    SupportTicket,
    AppStoreReview,
    Survey,
    TwitterMention,
}

impl FeedbackSource {
    /// Canonical display name, matching the corpus CSV values.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackSource::SupportTicket => "Support Ticket",
            FeedbackSource::AppStoreReview => "App Store Review",
            FeedbackSource::Survey => "Survey",
            FeedbackSource::TwitterMention => "Twitter Mention",
        }
    }
}

impl FromStr for FeedbackSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Support Ticket" => Ok(FeedbackSource::SupportTicket),
            "App Store Review" => Ok(FeedbackSource::AppStoreReview),
            "Survey" => Ok(FeedbackSource::Survey),
            "Twitter Mention" => Ok(FeedbackSource::TwitterMention),
            other => Err(format!("unknown feedback source: {other:?}")),
        }
    }
}

impl fmt::Display for FeedbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment classification attached to a feedback record at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
        }
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Positive" => Ok(Sentiment::Positive),
            "Negative" => Ok(Sentiment::Negative),
            "Neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment: {other:?}")),
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the feedback corpus. Immutable once loaded.
///
/// Records with empty `text` (after trimming) are dropped by the
/// document store before chunking, so every record reaching the
/// chunker has content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Corpus-unique identifier, e.g. `"FB-001"`.
    pub id: String,
    pub source: FeedbackSource,
    pub date: NaiveDate,
    pub user_id: String,
    /// The feedback content. Non-empty after trimming.
    pub text: String,
    pub sentiment: Sentiment,
}

/// Metadata copied from a record onto each of its chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub source: FeedbackSource,
    pub date: NaiveDate,
    pub user_id: String,
    pub sentiment: Sentiment,
}

impl ChunkMeta {
    pub fn from_record(record: &FeedbackRecord) -> Self {
        Self {
            source: record.source,
            date: record.date,
            user_id: record.user_id.clone(),
            sentiment: record.sentiment,
        }
    }
}

/// A bounded-size slice of a record's text — the atomic indexed item.
///
/// `ordinal` is assigned in corpus order and is stable for a fixed
/// corpus, which keeps index builds and tie-breaking reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Global position in the chunk stream (insertion order).
    pub ordinal: usize,
    /// Back-reference to the source record (not ownership).
    pub record_id: String,
    pub text: String,
    pub meta: ChunkMeta,
}

/// A ranked text passage returned by a retriever.
///
/// Ordering is rank-significant: position 0 is the most relevant item.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceItem {
    /// Zero-based relevance rank within the returned list.
    pub rank: usize,
    /// Raw relevance score from the producing strategy. Comparable only
    /// within a single result list.
    pub score: f64,
    pub text: String,
    /// Ordinal of the chunk this evidence was drawn from.
    pub chunk_ordinal: usize,
    /// Record the chunk was cut from.
    pub record_id: String,
}

/// Uniform envelope every tool call returns to the agent loop.
///
/// Failures are represented as data (`succeeded: false`) rather than
/// raised, so the loop always has a well-formed turn to append.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocationResult {
    pub tool_name: String,
    pub succeeded: bool,
    /// Result text on success, error description on failure.
    pub payload: String,
    pub metadata: BTreeMap<String, String>,
}

impl ToolInvocationResult {
    pub fn success(tool_name: &str, payload: String) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            succeeded: true,
            payload,
            metadata: BTreeMap::new(),
        }
    }

    pub fn failure(tool_name: &str, error: String) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("error".to_string(), error.clone());
        Self {
            tool_name: tool_name.to_string(),
            succeeded: false,
            payload: error,
            metadata,
        }
    }

    pub fn with_meta(mut self, key: &str, value: String) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Message role within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A model-issued request to invoke a tool mid-conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call identifier; tool results are correlated
    /// back to the model through it.
    pub id: String,
    /// Tool name, e.g. `"feedback_search"`.
    pub name: String,
    /// JSON-encoded arguments, e.g. `{"query": "dark mode"}`.
    pub arguments: String,
}

/// One turn of the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool calls proposed by an assistant turn (empty otherwise).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// For `Role::Tool` turns: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Append-only conversation transcript owned by one in-flight request.
///
/// Turns are only ever pushed; existing turns are never rewritten. The
/// transcript is created at request start and discarded when the loop
/// terminates.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Seed a conversation with exactly one user message.
    pub fn seeded(query: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(query)],
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}

/// One retriever's scorecard from an evaluation run. Immutable after
/// creation; collected into a comparison table by the harness.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub retriever_name: String,
    /// Quality metrics, all in `[0.0, 1.0]`.
    pub context_recall: f64,
    pub faithfulness: f64,
    pub answer_relevancy: f64,
    pub context_precision: f64,
    pub avg_latency_seconds: f64,
    pub total_cost_usd: f64,
    pub num_questions: usize,
    /// True when heuristic proxies were used in place of full LLM
    /// scoring. Never silently equivalent to full scoring.
    pub degraded: bool,
}
