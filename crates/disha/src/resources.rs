//! Shared resources, constructed once at startup and injected everywhere.
//!
//! No ambient globals: everything a pipeline stage needs lives in a
//! [`Resources`] value behind an `Arc`, so tests substitute fakes per test
//! without cross-test leakage. Indices load from persisted artifacts when
//! present and rebuild from the raw corpus when missing or empty; rebuilds
//! swap completed buckets, never mutate in place.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLog;
use crate::classify::CategoryClassifier;
use crate::config::EngineConfig;
use crate::embeddings::EmbeddingModel;
use crate::llm::{AnswerGenerator, HttpGenerator};
use crate::retrieval::{Chunker, ChunkStore, QaStore};
use crate::stats::{KnowledgeGapLog, UsageStats};
use crate::strategies::RuleMatcher;
use crate::types::QaEntry;
use crate::web_search::WebSearch;

pub struct Resources {
    pub config: EngineConfig,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub classifier: CategoryClassifier,
    pub rules: RuleMatcher,
    pub qa: QaStore,
    pub chunks: ChunkStore,
    pub generator: Option<Box<dyn AnswerGenerator>>,
    pub web: WebSearch,
    pub audit: AuditLog,
    pub stats: UsageStats,
    pub gaps: KnowledgeGapLog,
}

impl Resources {
    pub fn builder(config: EngineConfig) -> ResourcesBuilder {
        ResourcesBuilder::new(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.endpoints.request_timeout_secs)
    }

    pub fn chunker(&self) -> Chunker {
        Chunker::new(
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        )
    }

    /// Rebuild every QA domain index from the raw corpus file and persist
    /// the result. Readers keep serving the old buckets until each new one
    /// swaps in.
    pub fn rebuild_qa_indices(&self) -> Result<usize> {
        let entries = QaStore::load_corpus(&self.config.qa_corpus_path())?;
        let total = entries.len();
        self.qa.rebuild(self.embedder.as_ref(), entries)?;
        self.qa
            .persist(&self.config.qa_index_dir())
            .context("Failed to persist QA indices")?;
        Ok(total)
    }

    /// Rebuild the chunk index from the document directory and persist it.
    pub fn rebuild_chunk_index(&self) -> Result<usize> {
        let total = self.chunks.rebuild_from_dir(
            self.embedder.as_ref(),
            &self.chunker(),
            &self.config.docs_dir(),
        )?;
        self.chunks
            .persist(&self.config.chunk_index_dir())
            .context("Failed to persist chunk index")?;
        Ok(total)
    }

    /// Promote reviewed entries (typically recovered knowledge gaps) into
    /// the lookup corpus: the affected domain indices are rebuilt and
    /// swapped, and the artifacts persisted.
    pub fn promote_entries(&self, entries: Vec<QaEntry>) -> Result<()> {
        self.qa.add_entries(self.embedder.as_ref(), entries)?;
        self.qa
            .persist(&self.config.qa_index_dir())
            .context("Failed to persist QA indices after promotion")?;
        Ok(())
    }
}

pub struct ResourcesBuilder {
    config: EngineConfig,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    generator: Option<Box<dyn AnswerGenerator>>,
    generator_disabled: bool,
    audit: Option<AuditLog>,
}

impl ResourcesBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            embedder: None,
            generator: None,
            generator_disabled: false,
            audit: None,
        }
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingModel>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn generator(mut self, generator: Box<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Run without any generation collaborator; the RAG strategy degrades to
    /// extractive answers.
    pub fn without_generator(mut self) -> Self {
        self.generator_disabled = true;
        self
    }

    pub fn audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> Result<Resources> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
        let config = self.config;

        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => default_embedder()?,
        };

        let classifier = CategoryClassifier::load(&config.classifier_path());
        let rules = RuleMatcher::load(&config.rules_path());

        let qa = QaStore::load(&config.qa_index_dir());
        if qa.is_empty() && config.qa_corpus_path().exists() {
            tracing::info!("QA indices missing or empty, rebuilding from corpus");
            let entries = QaStore::load_corpus(&config.qa_corpus_path())?;
            qa.rebuild(embedder.as_ref(), entries)?;
            if let Err(e) = qa.persist(&config.qa_index_dir()) {
                tracing::warn!(error = %e, "Failed to persist rebuilt QA indices");
            }
        }

        let chunks = ChunkStore::load(&config.chunk_index_dir());
        if chunks.is_empty() && config.docs_dir().exists() {
            tracing::info!("Chunk index missing or empty, rebuilding from documents");
            let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
            chunks.rebuild_from_dir(embedder.as_ref(), &chunker, &config.docs_dir())?;
            if let Err(e) = chunks.persist(&config.chunk_index_dir()) {
                tracing::warn!(error = %e, "Failed to persist rebuilt chunk index");
            }
        }

        let generator: Option<Box<dyn AnswerGenerator>> = if self.generator_disabled {
            None
        } else if let Some(generator) = self.generator {
            Some(generator)
        } else {
            match HttpGenerator::new(
                &config.endpoints.generation_url,
                &config.endpoints.generation_model,
                config.endpoints.generation_api_key.clone(),
            ) {
                Ok(generator) => Some(Box::new(generator)),
                Err(e) => {
                    tracing::warn!(error = %e, "Generation collaborator unavailable");
                    None
                }
            }
        };

        let web = WebSearch::new(
            config.endpoints.tavily_api_key.clone(),
            Duration::from_secs(config.endpoints.web_cache_ttl_secs),
        );

        let audit = match self.audit {
            Some(audit) => audit,
            None => AuditLog::to_file(&config.audit_log_path())
                .context("Failed to open audit log")?,
        };

        let stats = UsageStats::new(config.stats_path());
        let gaps = KnowledgeGapLog::new(config.gaps_path());

        Ok(Resources {
            config,
            embedder,
            classifier,
            rules,
            qa,
            chunks,
            generator,
            web,
            audit,
            stats,
            gaps,
        })
    }
}

#[cfg(feature = "local-embeddings")]
fn default_embedder() -> Result<Arc<dyn EmbeddingModel>> {
    Ok(Arc::new(crate::embeddings::local::LocalEmbedder::new()?))
}

#[cfg(not(feature = "local-embeddings"))]
fn default_embedder() -> Result<Arc<dyn EmbeddingModel>> {
    anyhow::bail!(
        "No embedding model injected; provide one via ResourcesBuilder::embedder \
         or enable the 'local-embeddings' feature"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubEmbedder;
    use crate::types::Category;

    fn temp_config(dir: &tempfile::TempDir) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config
    }

    #[test]
    fn test_build_with_empty_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resources = Resources::builder(temp_config(&dir))
            .embedder(Arc::new(StubEmbedder::new()))
            .without_generator()
            .audit(AuditLog::in_memory())
            .build()
            .unwrap();

        assert!(resources.qa.is_empty());
        assert!(resources.chunks.is_empty());
        assert!(!resources.classifier.is_loaded());
        assert!(resources.rules.is_empty());
        assert!(resources.generator.is_none());
    }

    #[test]
    fn test_build_rebuilds_qa_from_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        std::fs::write(
            config.qa_corpus_path(),
            r#"[{"question":"What is the hostel fee?","answer":"Rs 45,000.","domain":"Financial Matters"}]"#,
        )
        .unwrap();

        let resources = Resources::builder(config)
            .embedder(Arc::new(StubEmbedder::new()))
            .without_generator()
            .audit(AuditLog::in_memory())
            .build()
            .unwrap();

        assert_eq!(resources.qa.total_entries(), 1);
        assert_eq!(resources.qa.bucket(Category::Financial).entries.len(), 1);
        // Rebuild also persisted artifacts for the next startup.
        assert!(resources
            .config
            .qa_index_dir()
            .join("financial")
            .join("index.json")
            .exists());
    }

    #[test]
    fn test_build_rebuilds_chunks_from_docs() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        std::fs::create_dir_all(config.docs_dir()).unwrap();
        std::fs::write(
            config.docs_dir().join("hostel.txt"),
            "The hostel has 400 rooms and a common mess hall.",
        )
        .unwrap();

        let resources = Resources::builder(config)
            .embedder(Arc::new(StubEmbedder::new()))
            .without_generator()
            .audit(AuditLog::in_memory())
            .build()
            .unwrap();

        assert!(!resources.chunks.is_empty());
    }

    #[test]
    fn test_rebuild_on_demand_after_corpus_update() {
        let dir = tempfile::tempdir().unwrap();
        let resources = Resources::builder(temp_config(&dir))
            .embedder(Arc::new(StubEmbedder::new()))
            .without_generator()
            .audit(AuditLog::in_memory())
            .build()
            .unwrap();
        assert!(resources.qa.is_empty());

        // Corpus lands after startup; an on-demand rebuild picks it up.
        std::fs::write(
            resources.config.qa_corpus_path(),
            r#"[{"question":"Bus routes?","answer":"Routes 1-4 cover the city.","domain":"Student Services"}]"#,
        )
        .unwrap();
        let total = resources.rebuild_qa_indices().unwrap();
        assert_eq!(total, 1);
        assert_eq!(
            resources.qa.bucket(Category::StudentServices).entries.len(),
            1
        );
    }

    #[test]
    fn test_promotion_rebuilds_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let resources = Resources::builder(temp_config(&dir))
            .embedder(Arc::new(StubEmbedder::new()))
            .without_generator()
            .audit(AuditLog::in_memory())
            .build()
            .unwrap();

        resources
            .promote_entries(vec![QaEntry {
                question: "When is the tech fest?".into(),
                answer: "Every February.".into(),
                domain: Category::CampusLife,
            }])
            .unwrap();

        assert_eq!(resources.qa.bucket(Category::CampusLife).entries.len(), 1);
        let reloaded = QaStore::load(&resources.config.qa_index_dir());
        assert_eq!(reloaded.total_entries(), 1);
    }
}
