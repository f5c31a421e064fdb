//! BM25 keyword scoring over the raw chunk corpus.
//!
//! A small in-memory inverted statistics table (document frequencies,
//! per-chunk term frequencies, average document length) supporting the
//! keyword retriever without any embedding dependency.
//!
//! Standard Okapi BM25 with `k1 = 1.2`, `b = 0.75`. Scores are only
//! comparable within a single query's result list.

use std::collections::HashMap;

use crate::models::{Chunk, EvidenceItem};

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Lowercased alphanumeric terms of a text.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

struct IndexedChunk {
    chunk: Chunk,
    term_freqs: HashMap<String, usize>,
    len: usize,
}

/// In-memory BM25 index over a fixed chunk corpus.
pub struct Bm25Index {
    chunks: Vec<IndexedChunk>,
    doc_freqs: HashMap<String, usize>,
    avg_len: f64,
}

impl Bm25Index {
    /// Build the index. Chunk order is preserved, so ranking ties are
    /// broken by corpus position and results are reproducible.
    pub fn build(chunks: &[Chunk]) -> Self {
        let mut indexed = Vec::with_capacity(chunks.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for chunk in chunks {
            let tokens = tokenize(&chunk.text);
            total_len += tokens.len();
            let mut term_freqs: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_default() += 1;
            }
            for term in term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }
            indexed.push(IndexedChunk {
                chunk: chunk.clone(),
                len: tokens.len(),
                term_freqs,
            });
        }

        let avg_len = if indexed.is_empty() {
            0.0
        } else {
            total_len as f64 / indexed.len() as f64
        };

        Self {
            chunks: indexed,
            doc_freqs,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Score every chunk against `query` and return the top `k` as
    /// ranked evidence, best-first. Chunks scoring zero are excluded.
    pub fn search(&self, query: &str, k: usize) -> Vec<EvidenceItem> {
        let terms = tokenize(query);
        if terms.is_empty() || self.chunks.is_empty() {
            return Vec::new();
        }

        let n = self.chunks.len() as f64;
        let mut scored: Vec<(f64, &IndexedChunk)> = Vec::new();

        for indexed in &self.chunks {
            let mut score = 0.0;
            for term in &terms {
                let tf = *indexed.term_freqs.get(term).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let df = *self.doc_freqs.get(term).unwrap_or(&0) as f64;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                let norm = K1 * (1.0 - B + B * indexed.len as f64 / self.avg_len);
                score += idf * (tf * (K1 + 1.0)) / (tf + norm);
            }
            if score > 0.0 {
                scored.push((score, indexed));
            }
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.chunk.ordinal.cmp(&b.1.chunk.ordinal))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .enumerate()
            .map(|(rank, (score, indexed))| EvidenceItem {
                rank,
                score,
                text: indexed.chunk.text.clone(),
                chunk_ordinal: indexed.chunk.ordinal,
                record_id: indexed.chunk.record_id.clone(),
            })
            .collect()
    }
}
