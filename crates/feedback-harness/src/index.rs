//! Shared, lazily-built vector index.
//!
//! Chunking is cheap and happens eagerly at construction; the
//! embedding pass is the expensive part and is deferred until the
//! first strategy actually needs the vector index. Concurrent callers
//! during the first build await the same in-flight initialization, so
//! the corpus is embedded at most once per process.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use feedback_harness_core::chunk::Chunker;
use feedback_harness_core::index::VectorIndex;
use feedback_harness_core::models::{Chunk, FeedbackRecord};
use feedback_harness_core::provider::Embedder;
use feedback_harness_core::Result;

use crate::config::ChunkingConfig;

pub struct SharedIndex {
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
    cell: OnceCell<Arc<VectorIndex>>,
}

impl SharedIndex {
    /// Chunk the corpus up front; the chunking invariants are
    /// re-validated here so a bad config fails before any network use.
    pub fn new(
        records: &[FeedbackRecord],
        chunking: &ChunkingConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let chunker = Chunker::new(chunking.window_size, chunking.overlap)?;
        let chunks = chunker.chunk_records(records);
        info!(records = records.len(), chunks = chunks.len(), "corpus chunked");
        Ok(Self {
            chunks,
            embedder,
            cell: OnceCell::new(),
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Get the vector index, building it on first use.
    pub async fn vector_index(&self) -> Result<Arc<VectorIndex>> {
        self.cell
            .get_or_try_init(|| async {
                info!(chunks = self.chunks.len(), "building vector index");
                let index = VectorIndex::build(&self.chunks, self.embedder.as_ref()).await?;
                Ok(Arc::new(index))
            })
            .await
            .map(Arc::clone)
    }
}
