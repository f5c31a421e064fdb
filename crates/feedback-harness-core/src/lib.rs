//! # Feedback Harness Core
//!
//! Runtime-agnostic logic for Feedback Harness: data models, chunking,
//! the in-memory vector index, retriever strategies, grounded answer
//! generation, the agent decision loop, and the evaluation harness.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or other
//! native-only dependencies. Provider capabilities (embedding, chat,
//! rerank, web search) are expressed as async traits in [`provider`];
//! concrete HTTP-backed implementations live in the `feedback-harness`
//! app crate.

pub mod agent;
pub mod answer;
pub mod bm25;
pub mod chunk;
pub mod error;
pub mod eval;
pub mod index;
pub mod models;
pub mod provider;
pub mod retriever;

pub use error::{HarnessError, Result};
