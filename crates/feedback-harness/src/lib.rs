//! Feedback Harness — agentic analysis over a user-feedback corpus.
//!
//! This crate wires the runtime-agnostic core library to real
//! providers and a command-line surface:
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | TOML configuration with defaults and validation |
//! | [`corpus`] | CSV corpus loading and summary statistics |
//! | [`providers`] | OpenAI chat/embeddings, Cohere rerank, Tavily web search |
//! | [`index`] | lazily-built, process-wide shared vector index |
//! | [`strategies`] | retriever strategy factory |
//! | [`analyzer`] | the high-level ask-a-question facade |
//!
//! The core algorithms (chunking, BM25, vector search, rank fusion,
//! the agent loop, evaluation) live in `feedback-harness-core` and
//! know nothing about HTTP or the filesystem.

pub mod analyzer;
pub mod config;
pub mod corpus;
pub mod index;
pub mod providers;
pub mod strategies;
