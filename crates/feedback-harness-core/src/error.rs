//! Error taxonomy for the retrieval and agent pipeline.
//!
//! Component-level failures (a single tool call, a single retrieval) are
//! caught by the agent loop and converted into
//! [`ToolInvocationResult`](crate::models::ToolInvocationResult) turns,
//! so only the variants below ever cross a public API boundary.

use thiserror::Error;

/// Errors produced by the core pipeline.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// An upstream model, embedding, or search provider failed.
    ///
    /// Transient by nature; the core does not retry automatically.
    #[error("provider error: {0}")]
    Provider(String),

    /// Index construction was attempted over zero chunks.
    ///
    /// Fatal at build time — there is no retrievable content.
    #[error("cannot build index: corpus produced zero chunks")]
    EmptyCorpus,

    /// A required credential is absent.
    ///
    /// Raised during construction, before any network call is made.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// The model produced output the caller could not parse.
    ///
    /// The agent loop treats this as "no tool calls were requested" and
    /// terminates with the raw text rather than crashing.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// A component was constructed with invalid parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, HarnessError>;
