//! Domain-partitioned stores for the lookup corpus and the RAG chunk corpus.
//!
//! Buckets are read under a read lock and replaced wholesale under a write
//! lock: a rebuild assembles the complete bucket first and swaps it in only
//! when finished, so readers never observe a half-built index. Loading is
//! best-effort — a missing or corrupt artifact degrades to an empty bucket
//! and the strategies answer unconfidently.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::embeddings::EmbeddingModel;
use crate::retrieval::chunker::{Chunker, DocumentChunk};
use crate::retrieval::index::FlatIndex;
use crate::types::{Category, QaEntry};

/// One domain's QA entries plus the index over their question embeddings.
/// Entry ordinals in the index map 1:1 to positions in `entries`.
pub struct QaBucket {
    pub index: FlatIndex,
    pub entries: Vec<QaEntry>,
}

impl QaBucket {
    pub fn empty() -> Self {
        Self {
            index: FlatIndex::new(0),
            entries: Vec::new(),
        }
    }

    fn build(embedder: &dyn EmbeddingModel, entries: Vec<QaEntry>) -> Result<Self> {
        let questions: Vec<&str> = entries.iter().map(|e| e.question.as_str()).collect();
        let vectors = embedder
            .embed_documents(&questions)
            .context("Failed to embed QA questions")?;

        let mut index = FlatIndex::new(embedder.dimension());
        index
            .add_all(vectors)
            .context("Failed to index QA embeddings")?;

        Ok(Self { index, entries })
    }
}

pub struct QaStore {
    buckets: HashMap<Category, RwLock<Arc<QaBucket>>>,
}

impl QaStore {
    pub fn empty() -> Self {
        let buckets = Category::ALL
            .iter()
            .map(|c| (*c, RwLock::new(Arc::new(QaBucket::empty()))))
            .collect();
        Self { buckets }
    }

    /// Snapshot of a domain's bucket. Cheap: clones the `Arc`, not the data.
    pub fn bucket(&self, category: Category) -> Arc<QaBucket> {
        self.buckets[&category].read().clone()
    }

    /// Replace a domain's bucket with a fully-built one.
    pub fn swap(&self, category: Category, bucket: QaBucket) {
        *self.buckets[&category].write() = Arc::new(bucket);
    }

    pub fn total_entries(&self) -> usize {
        Category::ALL
            .iter()
            .map(|c| self.bucket(*c).entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_entries() == 0
    }

    /// Rebuild every domain bucket from a full corpus. Each bucket is built
    /// completely before it replaces the old one; domains absent from the
    /// corpus are cleared.
    pub fn rebuild(&self, embedder: &dyn EmbeddingModel, entries: Vec<QaEntry>) -> Result<()> {
        let mut grouped: HashMap<Category, Vec<QaEntry>> = HashMap::new();
        for entry in entries {
            grouped.entry(entry.domain).or_default().push(entry);
        }

        for category in Category::ALL {
            let domain_entries = grouped.remove(&category).unwrap_or_default();
            let bucket = if domain_entries.is_empty() {
                QaBucket::empty()
            } else {
                QaBucket::build(embedder, domain_entries)
                    .with_context(|| format!("Failed to build '{}' index", category.slug()))?
            };
            tracing::info!(
                domain = category.slug(),
                entries = bucket.entries.len(),
                "QA index built"
            );
            self.swap(category, bucket);
        }
        Ok(())
    }

    /// Add entries to their domains' buckets (e.g. promoting reviewed
    /// knowledge gaps) and rebuild just those domains.
    pub fn add_entries(&self, embedder: &dyn EmbeddingModel, new: Vec<QaEntry>) -> Result<()> {
        let mut grouped: HashMap<Category, Vec<QaEntry>> = HashMap::new();
        for entry in new {
            grouped.entry(entry.domain).or_default().push(entry);
        }

        for (category, additions) in grouped {
            let mut entries: Vec<QaEntry> = self.bucket(category).entries.clone();
            entries.extend(additions);
            let bucket = QaBucket::build(embedder, entries)
                .with_context(|| format!("Failed to rebuild '{}' index", category.slug()))?;
            self.swap(category, bucket);
        }
        Ok(())
    }

    /// Persist every domain bucket under `dir/{slug}/`.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        for category in Category::ALL {
            let bucket = self.bucket(category);
            let domain_dir = dir.join(category.slug());
            std::fs::create_dir_all(&domain_dir)?;
            bucket
                .index
                .persist(&domain_dir.join("index.json"))
                .with_context(|| format!("Failed to persist '{}' index", category.slug()))?;
            let entries = serde_json::to_vec(&bucket.entries)?;
            std::fs::write(domain_dir.join("entries.json"), entries)?;
        }
        Ok(())
    }

    /// Best-effort load of previously persisted buckets. Missing or corrupt
    /// domains degrade to empty buckets.
    pub fn load(dir: &Path) -> Self {
        let store = Self::empty();
        for category in Category::ALL {
            let domain_dir = dir.join(category.slug());
            let index_path = domain_dir.join("index.json");
            let entries_path = domain_dir.join("entries.json");
            if !index_path.exists() || !entries_path.exists() {
                continue;
            }

            let index = match FlatIndex::load(&index_path) {
                Ok(index) => index,
                Err(e) => {
                    tracing::warn!(domain = category.slug(), error = %e, "Failed to load QA index");
                    continue;
                }
            };
            let entries: Vec<QaEntry> = match std::fs::read_to_string(&entries_path)
                .map_err(anyhow::Error::from)
                .and_then(|c| serde_json::from_str(&c).map_err(anyhow::Error::from))
            {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(domain = category.slug(), error = %e, "Failed to load QA entries");
                    continue;
                }
            };

            if index.len() != entries.len() {
                tracing::warn!(
                    domain = category.slug(),
                    index_len = index.len(),
                    entries_len = entries.len(),
                    "QA index/entries mismatch, skipping domain"
                );
                continue;
            }
            store.swap(category, QaBucket { index, entries });
        }
        store
    }

    /// Load the raw QA corpus file (a JSON array of entries).
    pub fn load_corpus(path: &Path) -> Result<Vec<QaEntry>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read QA corpus at {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse QA corpus")
    }
}

/// The RAG document corpus: all chunks plus the index over their embeddings.
pub struct ChunkBucket {
    pub index: FlatIndex,
    pub chunks: Vec<DocumentChunk>,
}

impl ChunkBucket {
    pub fn empty() -> Self {
        Self {
            index: FlatIndex::new(0),
            chunks: Vec::new(),
        }
    }
}

pub struct ChunkStore {
    inner: RwLock<Arc<ChunkBucket>>,
}

impl ChunkStore {
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(Arc::new(ChunkBucket::empty())),
        }
    }

    pub fn bucket(&self) -> Arc<ChunkBucket> {
        self.inner.read().clone()
    }

    pub fn swap(&self, bucket: ChunkBucket) {
        *self.inner.write() = Arc::new(bucket);
    }

    pub fn is_empty(&self) -> bool {
        self.bucket().chunks.is_empty()
    }

    /// Chunk and embed every `.txt` document under `docs_dir`, then swap the
    /// finished bucket in. Files are visited in sorted order so re-indexing
    /// the same tree yields identical ordinals.
    pub fn rebuild_from_dir(
        &self,
        embedder: &dyn EmbeddingModel,
        chunker: &Chunker,
        docs_dir: &Path,
    ) -> Result<usize> {
        let mut files: Vec<_> = WalkDir::new(docs_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path().extension().map(|x| x == "txt").unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();

        let mut chunks = Vec::new();
        for path in files {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                    continue;
                }
            };
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            chunks.extend(chunker.chunk(&source, content.trim()));
        }

        if chunks.is_empty() {
            tracing::warn!(dir = %docs_dir.display(), "No document chunks found");
            self.swap(ChunkBucket::empty());
            return Ok(0);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedder
            .embed_documents(&texts)
            .context("Failed to embed document chunks")?;

        let mut index = FlatIndex::new(embedder.dimension());
        index
            .add_all(vectors)
            .context("Failed to index chunk embeddings")?;

        let total = chunks.len();
        tracing::info!(chunks = total, "Chunk index built");
        self.swap(ChunkBucket { index, chunks });
        Ok(total)
    }

    pub fn persist(&self, dir: &Path) -> Result<()> {
        let bucket = self.bucket();
        std::fs::create_dir_all(dir)?;
        bucket
            .index
            .persist(&dir.join("index.json"))
            .context("Failed to persist chunk index")?;
        std::fs::write(dir.join("chunks.json"), serde_json::to_vec(&bucket.chunks)?)?;
        Ok(())
    }

    /// Best-effort load; degrades to an empty bucket.
    pub fn load(dir: &Path) -> Self {
        let store = Self::empty();
        let index_path = dir.join("index.json");
        let chunks_path = dir.join("chunks.json");
        if !index_path.exists() || !chunks_path.exists() {
            return store;
        }

        let loaded = FlatIndex::load(&index_path)
            .map_err(anyhow::Error::from)
            .and_then(|index| {
                let content = std::fs::read_to_string(&chunks_path)?;
                let chunks: Vec<DocumentChunk> = serde_json::from_str(&content)?;
                Ok((index, chunks))
            });

        match loaded {
            Ok((index, chunks)) if index.len() == chunks.len() => {
                store.swap(ChunkBucket { index, chunks });
            }
            Ok((index, chunks)) => {
                tracing::warn!(
                    index_len = index.len(),
                    chunks_len = chunks.len(),
                    "Chunk index/metadata mismatch, starting empty"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load chunk store, starting empty");
            }
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubEmbedder;

    fn corpus() -> Vec<QaEntry> {
        vec![
            QaEntry {
                question: "What is the hostel fee?".into(),
                answer: "The hostel fee is Rs 45,000 per year including mess.".into(),
                domain: Category::Financial,
            },
            QaEntry {
                question: "How do I apply for admission?".into(),
                answer: "Submit the online application with your rank card.".into(),
                domain: Category::Admissions,
            },
        ]
    }

    #[test]
    fn test_rebuild_partitions_by_domain() {
        let store = QaStore::empty();
        let embedder = StubEmbedder::new();
        store.rebuild(&embedder, corpus()).unwrap();

        assert_eq!(store.bucket(Category::Financial).entries.len(), 1);
        assert_eq!(store.bucket(Category::Admissions).entries.len(), 1);
        assert!(store.bucket(Category::CampusLife).entries.is_empty());
        assert_eq!(store.total_entries(), 2);
    }

    #[test]
    fn test_indexed_question_is_nearest_to_itself() {
        let store = QaStore::empty();
        let embedder = StubEmbedder::new();
        store.rebuild(&embedder, corpus()).unwrap();

        let bucket = store.bucket(Category::Financial);
        let query = embedder.embed_query("What is the hostel fee?").unwrap();
        let (distances, ordinals) = bucket.index.search(&query, 1).unwrap();
        assert_eq!(ordinals, vec![0]);
        assert!(distances[0] < 1e-6);
    }

    #[test]
    fn test_add_entries_rebuilds_only_target_domain() {
        let store = QaStore::empty();
        let embedder = StubEmbedder::new();
        store.rebuild(&embedder, corpus()).unwrap();

        store
            .add_entries(
                &embedder,
                vec![QaEntry {
                    question: "Is there a gym on campus?".into(),
                    answer: "Yes, open 6am to 9pm.".into(),
                    domain: Category::CampusLife,
                }],
            )
            .unwrap();

        assert_eq!(store.bucket(Category::CampusLife).entries.len(), 1);
        assert_eq!(store.bucket(Category::Financial).entries.len(), 1);
        assert_eq!(store.total_entries(), 3);
    }

    #[test]
    fn test_persist_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = QaStore::empty();
        let embedder = StubEmbedder::new();
        store.rebuild(&embedder, corpus()).unwrap();
        store.persist(dir.path()).unwrap();

        let reloaded = QaStore::load(dir.path());
        assert_eq!(reloaded.total_entries(), 2);
        assert_eq!(
            reloaded.bucket(Category::Financial).entries[0].answer,
            corpus()[0].answer
        );
    }

    #[test]
    fn test_load_missing_dir_is_empty() {
        let store = QaStore::load(Path::new("/nonexistent/indices"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_chunk_store_rebuild_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(
            docs.join("hostel.txt"),
            "The hostel has 400 rooms. Mess timings are 7am to 9pm. \
             Wardens are available around the clock for emergencies.",
        )
        .unwrap();
        std::fs::write(docs.join("notes.md"), "ignored non-txt file").unwrap();

        let store = ChunkStore::empty();
        let embedder = StubEmbedder::new();
        let chunker = Chunker::new(60, 10);
        let total = store.rebuild_from_dir(&embedder, &chunker, &docs).unwrap();
        assert!(total > 0);
        assert_eq!(store.bucket().chunks.len(), total);
        assert_eq!(store.bucket().chunks[0].source, "hostel.txt");

        // Round-trip through disk.
        let out = dir.path().join("chunks");
        store.persist(&out).unwrap();
        let reloaded = ChunkStore::load(&out);
        assert_eq!(reloaded.bucket().chunks.len(), total);
    }
}
