//! Deterministic sliding-window chunking.
//!
//! Offsets are character offsets, not byte offsets, so multi-byte text never
//! splits inside a code point. Consecutive chunks of one source always tile
//! the document with exactly the configured overlap; only the final chunk
//! may be shorter than `chunk_size`.

use serde::{Deserialize, Serialize};

/// A contiguous slice of a source document, the unit of retrieval for the
/// RAG strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub source: String,
    pub index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
}

pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        // overlap >= chunk_size would never advance; config validation
        // rejects it, this is the hard floor.
        let chunk_size = chunk_size.max(1);
        let overlap = overlap.min(chunk_size - 1);
        Self {
            chunk_size,
            overlap,
        }
    }

    pub fn chunk(&self, source: &str, text: &str) -> Vec<DocumentChunk> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        if chars.len() <= self.chunk_size {
            return vec![DocumentChunk {
                source: source.to_string(),
                index: 0,
                start_char: 0,
                end_char: chars.len(),
                text: text.to_string(),
            }];
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut index = 0;

        loop {
            let end = (start + self.chunk_size).min(chars.len());
            chunks.push(DocumentChunk {
                source: source.to_string(),
                index,
                start_char: start,
                end_char: end,
                text: chars[start..end].iter().collect(),
            });
            if end == chars.len() {
                break;
            }
            start += step;
            index += 1;
        }

        chunks
    }
}
