//! Grounded answer generation.
//!
//! Retrieves evidence for a query and asks the chat model to answer
//! using **only** the supplied context, suppressing outside knowledge.

use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{ChatMessage, EvidenceItem};
use crate::provider::{ChatModel, Completion, TokenUsage};
use crate::retriever::Retriever;

const GROUNDING_SYSTEM_PROMPT: &str = "You are a helpful product assistant.";

const GROUNDING_TEMPLATE: &str = "Answer the user's question based ONLY on the \
following context from user feedback:\n\n{context}\n\nQuestion: {question}";

/// Prefix attached to degraded-mode answers when the provider fails.
pub const DEGRADED_PREFIX: &str = "Error searching feedback database: ";

/// The prompt sent for a grounded answer: evidence texts joined into a
/// context block, then the question.
pub fn grounding_prompt(query: &str, evidence: &[EvidenceItem]) -> String {
    let context: Vec<&str> = evidence.iter().map(|e| e.text.as_str()).collect();
    GROUNDING_TEMPLATE
        .replace("{context}", &context.join("\n\n"))
        .replace("{question}", query)
}

/// A grounded answer plus the evidence and usage that produced it.
///
/// The evaluation harness needs all three; the agent tool path only
/// needs the text.
pub struct GroundedAnswer {
    pub text: String,
    pub evidence: Vec<EvidenceItem>,
    pub usage: Option<TokenUsage>,
}

/// Retrieve evidence and generate a grounded answer.
///
/// Retrieval and provider errors propagate; callers that need degraded
/// text instead use [`answer`].
pub async fn answer_with_evidence(
    query: &str,
    retriever: &dyn Retriever,
    chat: &dyn ChatModel,
) -> Result<GroundedAnswer> {
    let evidence = retriever.retrieve(query).await?;
    debug!(
        retriever = retriever.name(),
        evidence = evidence.len(),
        "generating grounded answer"
    );

    let messages = [
        ChatMessage::system(GROUNDING_SYSTEM_PROMPT),
        ChatMessage::user(grounding_prompt(query, &evidence)),
    ];
    let Completion { message, usage } = chat.complete(&messages, &[]).await?;

    Ok(GroundedAnswer {
        text: message.content,
        evidence,
        usage,
    })
}

/// Generate a grounded answer, degrading to a prefixed error string on
/// failure. This result is directly user-facing, so a degraded response
/// is preferred over failing the whole request.
pub async fn answer(query: &str, retriever: &dyn Retriever, chat: &dyn ChatModel) -> String {
    match answer_with_evidence(query, retriever, chat).await {
        Ok(grounded) => grounded.text,
        Err(e) => {
            warn!(error = %e, "grounded answer degraded");
            format!("{DEGRADED_PREFIX}{e}")
        }
    }
}
