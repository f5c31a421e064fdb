//! In-memory vector index over embedded chunks.
//!
//! [`VectorIndex::build`] embeds every chunk once; [`VectorIndex::query`]
//! embeds the query text and scores it against all stored vectors with
//! cosine similarity. Ranking is stable for a fixed corpus and query:
//! ties are broken by chunk ordinal, never randomly.
//!
//! The index is read-only after construction and safe to share across
//! concurrent queries behind an `Arc`. Lazy once-only construction is
//! the app crate's concern (a `tokio::sync::OnceCell` handle); the core
//! index itself is eagerly built by whoever calls `build`.

use tracing::{debug, info};

use crate::error::{HarnessError, Result};
use crate::models::{Chunk, EvidenceItem};
use crate::provider::Embedder;

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force cosine-similarity index over a fixed chunk corpus.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embed all chunks and build the index.
    ///
    /// Fails with [`HarnessError::EmptyCorpus`] when no chunks are
    /// supplied — there would be nothing retrievable.
    pub async fn build(chunks: &[Chunk], embedder: &dyn Embedder) -> Result<Self> {
        if chunks.is_empty() {
            return Err(HarnessError::EmptyCorpus);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(HarnessError::Provider(format!(
                "embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let entries = chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect::<Vec<_>>();

        info!(chunks = entries.len(), "vector index built");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nearest-neighbor lookup: embed `text`, return at most `k`
    /// evidence items, best-first.
    pub async fn query(
        &self,
        embedder: &dyn Embedder,
        text: &str,
        k: usize,
    ) -> Result<Vec<EvidenceItem>> {
        let query_vec = embedder.embed_query(text).await?;
        Ok(self.query_vector(&query_vec, k))
    }

    /// Score a pre-computed query vector against all entries.
    pub fn query_vector(&self, query_vec: &[f32], k: usize) -> Vec<EvidenceItem> {
        let mut scored: Vec<(f64, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query_vec, &entry.vector) as f64, entry))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.chunk.ordinal.cmp(&b.1.chunk.ordinal))
        });
        scored.truncate(k);

        debug!(k, returned = scored.len(), "vector query");

        scored
            .into_iter()
            .enumerate()
            .map(|(rank, (score, entry))| EvidenceItem {
                rank,
                score,
                text: entry.chunk.text.clone(),
                chunk_ordinal: entry.chunk.ordinal,
                record_id: entry.chunk.record_id.clone(),
            })
            .collect()
    }

    /// The chunk stored at a given ordinal, if indexed.
    pub fn chunk_by_ordinal(&self, ordinal: usize) -> Option<&Chunk> {
        self.entries
            .iter()
            .map(|e| &e.chunk)
            .find(|c| c.ordinal == ordinal)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ChunkMeta, FeedbackSource, Sentiment};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    /// Deterministic bag-of-words embedder: each lowercase token is
    /// hashed into one of 64 buckets. Texts sharing tokens get
    /// correlated vectors, which is enough to exercise ranking.
    pub struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| hash_vector(t)).collect())
        }
    }

    pub fn hash_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 64];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 1469598103934665603;
            for b in token.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            v[(h % 64) as usize] += 1.0;
        }
        v
    }

    pub fn chunk(ordinal: usize, text: &str) -> Chunk {
        Chunk {
            ordinal,
            record_id: format!("FB-{ordinal:03}"),
            text: text.to_string(),
            meta: ChunkMeta {
                source: FeedbackSource::AppStoreReview,
                date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                user_id: "user-9".to_string(),
                sentiment: Sentiment::Negative,
            },
        }
    }

    #[tokio::test]
    async fn test_build_empty_corpus_fails() {
        let err = VectorIndex::build(&[], &HashEmbedder)
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, HarnessError::EmptyCorpus));
    }

    #[tokio::test]
    async fn test_query_ranks_matching_chunk_first() {
        let chunks = vec![
            chunk(0, "The dashboard layout is confusing"),
            chunk(1, "Please ship dark mode soon"),
            chunk(2, "Billing invoices render incorrectly"),
        ];
        let index = VectorIndex::build(&chunks, &HashEmbedder).await.unwrap();
        let results = index
            .query(&HashEmbedder, "what about dark mode", 2)
            .await
            .unwrap();
        assert_eq!(results[0].chunk_ordinal, 1);
        assert!(results.len() <= 2);
    }

    #[tokio::test]
    async fn test_query_is_idempotent() {
        let chunks = vec![
            chunk(0, "slow loading on the analytics page"),
            chunk(1, "love the quick add shortcut"),
        ];
        let index = VectorIndex::build(&chunks, &HashEmbedder).await.unwrap();
        let a = index.query(&HashEmbedder, "analytics slow", 2).await.unwrap();
        let b = index.query(&HashEmbedder, "analytics slow", 2).await.unwrap();
        let ord_a: Vec<usize> = a.iter().map(|e| e.chunk_ordinal).collect();
        let ord_b: Vec<usize> = b.iter().map(|e| e.chunk_ordinal).collect();
        assert_eq!(ord_a, ord_b);
    }

    #[tokio::test]
    async fn test_ties_break_by_ordinal() {
        let chunks = vec![chunk(0, "same text"), chunk(1, "same text")];
        let index = VectorIndex::build(&chunks, &HashEmbedder).await.unwrap();
        let results = index.query(&HashEmbedder, "same text", 2).await.unwrap();
        assert_eq!(results[0].chunk_ordinal, 0);
        assert_eq!(results[1].chunk_ordinal, 1);
    }

    #[test]
    fn test_cosine_basics() {
        let a = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
