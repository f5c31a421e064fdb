//! Agent decision loop.
//!
//! The orchestration core: given a user query, the loop repeatedly asks
//! the chat model what to do next. The model either requests tool calls
//! (feedback retrieval, web search) or produces a final answer.
//!
//! # State machine
//!
//! ```text
//!                 ┌──────────────────────────┐
//!                 ▼                          │ tool results appended
//!  AwaitingModelDecision ── tool calls ──▶ ExecutingTool
//!          │
//!          │ no tool calls
//!          ▼
//!      Terminated (response text is the final answer)
//! ```
//!
//! The tool set is closed and static, so dispatch is an enum match
//! rather than dynamically-bound callables. Multiple tool calls in one
//! assistant turn are dispatched concurrently and their results are
//! appended in call order, keyed by call identifier — never by arrival
//! order. A single tool failure becomes a `succeeded: false` envelope
//! turn; only a failure of the decision call itself aborts the request.
//!
//! A hard iteration cap (default 10) bounds worst-case loop length: a
//! model that requests tools indefinitely terminates with a fixed
//! fallback instead of looping forever.

use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::answer;
use crate::error::{HarnessError, Result};
use crate::models::{ChatMessage, Conversation, ToolCallRequest, ToolInvocationResult};
use crate::provider::{ChatModel, ToolSpec, WebSearch};
use crate::retriever::Retriever;

/// Tool name the model uses to search the feedback corpus.
pub const FEEDBACK_TOOL: &str = "feedback_search";
/// Tool name the model uses to search the web.
pub const WEB_TOOL: &str = "web_search";

/// Default bound on decision iterations per request.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Returned when the model terminates without any usable answer text.
pub const FALLBACK_NO_RESPONSE: &str =
    "I apologize, but I couldn't generate a response. Please try again.";

/// Returned when the iteration cap is reached before termination.
pub const FALLBACK_ITERATION_CAP: &str =
    "I could not complete the analysis within the allowed number of steps. \
     Please try a narrower question.";

/// Loop state, tracked for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModelDecision,
    ExecutingTool,
    Terminated,
}

/// Agent tuning knobs.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum decision iterations before the runaway guard trips.
    pub max_iterations: usize,
    /// Result budget passed to the web search tool.
    pub max_web_results: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_web_results: 3,
        }
    }
}

/// Result of one agent run: the final answer plus the full transcript.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    /// The complete conversation, in append order.
    pub transcript: Vec<ChatMessage>,
    /// Decision iterations consumed.
    pub iterations: usize,
}

/// Arguments every tool accepts: a single query string.
#[derive(Debug, Deserialize)]
struct ToolArgs {
    query: String,
}

/// The agent: a chat model bound to the two tool capabilities.
///
/// One instance serves many queries concurrently; each call to
/// [`run`](FeedbackAgent::run) owns its conversation exclusively.
pub struct FeedbackAgent {
    chat: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
    web: Arc<dyn WebSearch>,
    config: AgentConfig,
}

impl FeedbackAgent {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        retriever: Arc<dyn Retriever>,
        web: Arc<dyn WebSearch>,
        config: AgentConfig,
    ) -> Self {
        Self {
            chat,
            retriever,
            web,
            config,
        }
    }

    fn tool_specs() -> [ToolSpec; 2] {
        [
            ToolSpec {
                name: FEEDBACK_TOOL,
                description: "Searches and analyzes the internal user feedback \
                              knowledge base to answer questions about user \
                              complaints, feature requests, or sentiment.",
            },
            ToolSpec {
                name: WEB_TOOL,
                description: "Searches the web for external information when the \
                              internal feedback data is insufficient.",
            },
        ]
    }

    /// Run the decision loop for one query.
    ///
    /// Errors only when the decision call itself fails; tool failures
    /// are folded into the transcript as failure envelopes.
    pub async fn run(&self, query: &str) -> Result<AgentOutcome> {
        let mut conversation = Conversation::seeded(query);
        let mut state = LoopState::AwaitingModelDecision;
        let mut final_answer: Option<String> = None;
        let mut iterations = 0usize;
        let specs = Self::tool_specs();

        while iterations < self.config.max_iterations {
            iterations += 1;
            debug!(iteration = iterations, ?state, "requesting model decision");

            let completion = match self.chat.complete(conversation.messages(), &specs).await {
                Ok(completion) => completion,
                // Unparseable tool-call syntax is treated as "no tool
                // calls": the raw text becomes the final answer.
                Err(HarnessError::MalformedResponse(raw)) => {
                    warn!("malformed model response, terminating with raw text");
                    conversation.push(ChatMessage::assistant(raw.clone()));
                    final_answer = Some(raw);
                    state = LoopState::Terminated;
                    break;
                }
                // Decision-call failure aborts the whole request.
                Err(e) => return Err(e),
            };

            let message = completion.message;
            conversation.push(message.clone());

            if message.tool_calls.is_empty() {
                final_answer = Some(message.content);
                state = LoopState::Terminated;
                break;
            }

            state = LoopState::ExecutingTool;
            debug!(calls = message.tool_calls.len(), "dispatching tool calls");

            // Independent reads against read-only state: dispatch in
            // parallel, then append in call order keyed by call id.
            let results = join_all(
                message
                    .tool_calls
                    .iter()
                    .map(|call| self.execute_tool(call)),
            )
            .await;

            for (call, result) in message.tool_calls.iter().zip(results) {
                if !result.succeeded {
                    warn!(tool = %result.tool_name, "tool call failed: {}", result.payload);
                }
                conversation.push(ChatMessage::tool_result(call.id.clone(), result.payload));
            }
            state = LoopState::AwaitingModelDecision;
        }

        let answer = match final_answer {
            Some(text) if !text.trim().is_empty() => text,
            Some(_) => FALLBACK_NO_RESPONSE.to_string(),
            None => {
                warn!(
                    cap = self.config.max_iterations,
                    "iteration cap reached before termination"
                );
                FALLBACK_ITERATION_CAP.to_string()
            }
        };

        info!(iterations, turns = conversation.len(), "agent run finished");
        Ok(AgentOutcome {
            answer,
            transcript: conversation.into_messages(),
            iterations,
        })
    }

    /// Execute one tool call, always returning a well-formed envelope.
    async fn execute_tool(&self, call: &ToolCallRequest) -> ToolInvocationResult {
        let args: ToolArgs = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                return ToolInvocationResult::failure(
                    &call.name,
                    format!("invalid tool arguments {:?}: {e}", call.arguments),
                );
            }
        };

        match call.name.as_str() {
            FEEDBACK_TOOL => {
                match answer::answer_with_evidence(
                    &args.query,
                    self.retriever.as_ref(),
                    self.chat.as_ref(),
                )
                .await
                {
                    Ok(grounded) => ToolInvocationResult::success(FEEDBACK_TOOL, grounded.text)
                        .with_meta("query", args.query)
                        .with_meta("evidence_count", grounded.evidence.len().to_string()),
                    Err(e) => ToolInvocationResult::failure(
                        FEEDBACK_TOOL,
                        format!("{}{e}", answer::DEGRADED_PREFIX),
                    ),
                }
            }
            WEB_TOOL => match self
                .web
                .search(&args.query, self.config.max_web_results)
                .await
            {
                Ok(snippets) => ToolInvocationResult::success(WEB_TOOL, snippets)
                    .with_meta("query", args.query)
                    .with_meta("max_results", self.config.max_web_results.to_string()),
                Err(e) => {
                    ToolInvocationResult::failure(WEB_TOOL, format!("Error searching the web: {e}"))
                }
            },
            other => ToolInvocationResult::failure(other, format!("unknown tool: {other}")),
        }
    }
}
