use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::{Category, StrategyKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub thresholds: ThresholdConfig,
    pub chunking: ChunkingConfig,
    pub history: HistoryConfig,
    pub routing: RoutingTable,
    pub endpoints: EndpointConfig,
}

/// Confidence gates for routing and for each strategy. These values are the
/// primary hallucination defence; lowering them trades accuracy for coverage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Top-k QA entries retrieved by the similarity lookup.
    pub lookup_top_k: usize,
    /// Similarity at or above which a lookup answer is confident.
    pub lookup_high_similarity: f32,
    /// Similarity below which the lookup refuses to answer.
    pub lookup_min_similarity: f32,
    /// Ranking bonus for candidates whose domain tag matches the hint.
    pub domain_boost: f32,
    /// Top-k document chunks retrieved by the RAG strategy.
    pub rag_top_k: usize,
    /// Retrieval confidence below which the RAG strategy refuses to generate.
    pub rag_min_confidence: f32,
    /// Classifier confidence treated as a strong category signal.
    pub classifier_high_confidence: f32,
    /// Classifier confidence below which the domain hint is dropped.
    pub classifier_mid_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, in characters.
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Conversation turns kept before any use; older turns are dropped.
    pub max_turns: usize,
    /// Character budget per retrieved chunk slot when assembling context.
    pub max_context_chars_per_turn: usize,
}

/// Per-category strategy execution order, loaded from data so reordering or
/// new categories never require code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingTable {
    pub chains: HashMap<Category, Vec<StrategyKind>>,
    pub default_chain: Vec<StrategyKind>,
}

impl RoutingTable {
    /// Execution order for a classified category; `None` (no usable hint)
    /// gets the default chain.
    pub fn chain_for(&self, category: Option<Category>) -> &[StrategyKind] {
        category
            .and_then(|c| self.chains.get(&c))
            .map(Vec::as_slice)
            .unwrap_or(&self.default_chain)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        let lookup_first = vec![StrategyKind::Lookup, StrategyKind::Rules, StrategyKind::Rag];
        let mut chains = HashMap::new();
        // Admissions questions have dense rule coverage; exact matches go first.
        chains.insert(
            Category::Admissions,
            vec![StrategyKind::Rules, StrategyKind::Lookup, StrategyKind::Rag],
        );
        for category in Category::ALL {
            chains.entry(category).or_insert_with(|| lookup_first.clone());
        }
        Self {
            chains,
            default_chain: lookup_first,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// OpenAI-compatible chat-completions endpoint for answer synthesis.
    pub generation_url: String,
    pub generation_model: String,
    pub generation_api_key: Option<String>,
    /// Tavily API key; `None` disables web search entirely.
    pub tavily_api_key: Option<String>,
    /// TTL for the in-memory web search cache.
    pub web_cache_ttl_secs: u64,
    /// Upper bound on any single collaborator call.
    pub request_timeout_secs: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            lookup_top_k: 3,
            lookup_high_similarity: 0.65,
            lookup_min_similarity: 0.45,
            domain_boost: 0.1,
            rag_top_k: 5,
            rag_min_confidence: 0.5,
            classifier_high_confidence: 0.75,
            classifier_mid_confidence: 0.45,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 50,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 5,
            max_context_chars_per_turn: 500,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            generation_url: "http://localhost:11434/v1/chat/completions".to_string(),
            generation_model: "llama3".to_string(),
            generation_api_key: None,
            tavily_api_key: None,
            web_cache_ttl_secs: 3600,
            request_timeout_secs: 30,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("disha");

        Self {
            data_dir,
            thresholds: ThresholdConfig::default(),
            chunking: ChunkingConfig::default(),
            history: HistoryConfig::default(),
            routing: RoutingTable::default(),
            endpoints: EndpointConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken setups.
    pub fn validate(&self) -> Result<(), String> {
        let t = &self.thresholds;
        if t.lookup_top_k == 0 || t.rag_top_k == 0 {
            return Err("thresholds.lookup_top_k and rag_top_k must be > 0".into());
        }
        if !(0.0..=1.0).contains(&t.lookup_min_similarity)
            || !(0.0..=1.0).contains(&t.lookup_high_similarity)
        {
            return Err("lookup similarity thresholds must be in [0.0, 1.0]".into());
        }
        if t.lookup_min_similarity > t.lookup_high_similarity {
            return Err("lookup_min_similarity must be <= lookup_high_similarity".into());
        }
        if !(0.0..=1.0).contains(&t.rag_min_confidence) {
            return Err("thresholds.rag_min_confidence must be in [0.0, 1.0]".into());
        }
        if t.classifier_mid_confidence > t.classifier_high_confidence {
            return Err("classifier_mid_confidence must be <= classifier_high_confidence".into());
        }
        if self.chunking.chunk_size == 0 {
            return Err("chunking.chunk_size must be > 0".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err("chunking.chunk_overlap must be < chunk_size".into());
        }
        if self.routing.default_chain.is_empty() {
            return Err("routing.default_chain must not be empty".into());
        }
        if self.endpoints.request_timeout_secs == 0 {
            return Err("endpoints.request_timeout_secs must be > 0".into());
        }
        Ok(())
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.data_dir.join("classifier.json")
    }

    pub fn rules_path(&self) -> PathBuf {
        self.data_dir.join("rules.json")
    }

    pub fn qa_corpus_path(&self) -> PathBuf {
        self.data_dir.join("qa_dataset.json")
    }

    pub fn qa_index_dir(&self) -> PathBuf {
        self.data_dir.join("indices").join("qa")
    }

    pub fn chunk_index_dir(&self) -> PathBuf {
        self.data_dir.join("indices").join("chunks")
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.data_dir.join("docs")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("logs").join("audit.log")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join("query_stats.json")
    }

    pub fn gaps_path(&self) -> PathBuf {
        self.data_dir.join("unresolved_queries.json")
    }

    /// Load config from a JSON file, falling back to defaults for missing
    /// fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_routing_puts_rules_first_for_admissions() {
        let table = RoutingTable::default();
        assert_eq!(
            table.chain_for(Some(Category::Admissions))[0],
            StrategyKind::Rules
        );
        assert_eq!(
            table.chain_for(Some(Category::Financial))[0],
            StrategyKind::Lookup
        );
        assert_eq!(table.chain_for(None)[0], StrategyKind::Lookup);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = EngineConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let mut config = EngineConfig::default();
        config.thresholds.lookup_min_similarity = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"thresholds":{"lookup_top_k":7}}"#).unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.thresholds.lookup_top_k, 7);
        assert_eq!(config.chunking.chunk_size, 400);
    }
}
