//! Overlapping sliding-window text chunker.
//!
//! Splits feedback record text into fixed-size character windows with a
//! configurable overlap between consecutive windows. A record shorter
//! than one window yields exactly one chunk.
//!
//! # Algorithm
//!
//! 1. Walk the text in strides of `window_size - overlap` characters.
//! 2. Each window spans `window_size` characters (less at the tail).
//! 3. Window boundaries are character boundaries, never byte offsets,
//!    so multi-byte UTF-8 content is always split safely.
//! 4. Stop once a window reaches the end of the text.
//!
//! Because the stride is fixed, concatenating each chunk's leading
//! `stride` characters plus the final chunk's remainder reconstructs
//! the original text losslessly — a property the tests rely on.

use crate::error::{HarnessError, Result};
use crate::models::{Chunk, ChunkMeta, FeedbackRecord};

/// Sliding-window chunker with validated parameters.
///
/// Invariant: `0 <= overlap < window_size`.
#[derive(Debug, Clone)]
pub struct Chunker {
    window_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker, rejecting degenerate window parameters.
    pub fn new(window_size: usize, overlap: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(HarnessError::InvalidConfig(
                "chunk window_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= window_size {
            return Err(HarnessError::InvalidConfig(format!(
                "chunk overlap ({overlap}) must be smaller than window_size ({window_size})"
            )));
        }
        Ok(Self {
            window_size,
            overlap,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk every record, assigning global ordinals in corpus order.
    ///
    /// Records whose text is empty after trimming produce no chunks
    /// (the document store drops them earlier; this is a backstop).
    pub fn chunk_records(&self, records: &[FeedbackRecord]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut ordinal = 0usize;
        for record in records {
            self.chunk_text(
                &record.id,
                &ChunkMeta::from_record(record),
                &record.text,
                &mut ordinal,
                &mut chunks,
            );
        }
        chunks
    }

    /// Chunk a single text, appending to `out` and advancing `ordinal`.
    ///
    /// Exposed for hierarchical (parent/child) indexing, where parent
    /// passages are re-chunked into smaller child windows.
    pub fn chunk_text(
        &self,
        record_id: &str,
        meta: &ChunkMeta,
        text: &str,
        ordinal: &mut usize,
        out: &mut Vec<Chunk>,
    ) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let stride = self.window_size - self.overlap;
        // Byte offset of every char boundary, plus the end of the text.
        let boundaries: Vec<usize> = trimmed
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(trimmed.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        let mut start = 0usize;
        loop {
            let end = (start + self.window_size).min(char_len);
            let piece = &trimmed[boundaries[start]..boundaries[end]];
            out.push(Chunk {
                ordinal: *ordinal,
                record_id: record_id.to_string(),
                text: piece.to_string(),
                meta: meta.clone(),
            });
            *ordinal += 1;

            if end == char_len {
                break;
            }
            start += stride;
        }
    }
}
