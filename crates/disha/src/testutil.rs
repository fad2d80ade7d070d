//! Deterministic stand-ins for the external collaborators, injected through
//! the resource builder so tests never touch the network or model files.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::embeddings::EmbeddingModel;
use crate::llm::AnswerGenerator;

pub const STUB_DIMENSION: usize = 64;

/// Hashed bag-of-words embedder: identical text maps to identical vectors,
/// shared vocabulary maps to nearby ones. Deterministic within a process.
pub struct StubEmbedder;

impl StubEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl EmbeddingModel for StubEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; STUB_DIMENSION];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() % STUB_DIMENSION as u64) as usize] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_query(text)
    }

    fn dimension(&self) -> usize {
        STUB_DIMENSION
    }
}

/// Embedder with hand-picked vectors per exact text, for tests that need
/// precise distances. Unknown text maps to the zero vector.
pub struct VecEmbedder {
    map: std::collections::HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl VecEmbedder {
    pub fn of<const N: usize>(entries: [(&str, Vec<f32>); N]) -> Self {
        let dimension = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
        let map = entries
            .into_iter()
            .map(|(text, vector)| (text.to_string(), vector))
            .collect();
        Self { map, dimension }
    }
}

impl EmbeddingModel for VecEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .map
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimension]))
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_query(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Generator that replays a fixed response (or fails) and records prompts.
pub struct ScriptedGenerator {
    response: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }
}
