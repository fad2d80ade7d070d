//! Usage statistics and knowledge-gap tracking.
//!
//! Both stores are small JSON files shared across concurrent queries; all
//! writers go through a mutex so concurrent increments never lose updates or
//! corrupt records. Failures are logged and swallowed — neither store may
//! fail a query.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Query-frequency counter backing the "popular questions" surface.
pub struct UsageStats {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UsageStats {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> HashMap<String, u64> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if !content.trim().is_empty() => {
                serde_json::from_str(&content).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Corrupt usage stats file, resetting");
                    HashMap::new()
                })
            }
            _ => HashMap::new(),
        }
    }

    fn save(&self, stats: &HashMap<String, u64>) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(stats) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.path, content) {
                    tracing::warn!(error = %e, "Failed to save usage stats");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize usage stats"),
        }
    }

    /// Increment the frequency count for a query. The key keeps the original
    /// wording with the first letter capitalized so variants aggregate while
    /// staying displayable.
    pub fn increment(&self, query: &str) {
        let trimmed = query.trim();
        if trimmed.len() < 3 {
            return;
        }
        let mut chars = trimmed.chars();
        let key = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => return,
        };

        let _guard = self.lock.lock();
        let mut stats = self.load();
        *stats.entry(key).or_insert(0) += 1;
        self.save(&stats);
    }

    /// Top `n` most frequent queries, with cold-start defaults when no
    /// traffic has been recorded yet.
    pub fn top_queries(&self, n: usize) -> Vec<String> {
        let stats = {
            let _guard = self.lock.lock();
            self.load()
        };

        if stats.is_empty() {
            return [
                "Is hostel facility available?",
                "What is the admission process?",
                "What is the tuition fee?",
                "Where is the library?",
            ]
            .iter()
            .take(n)
            .map(|s| s.to_string())
            .collect();
        }

        let mut sorted: Vec<(String, u64)> = stats.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted.into_iter().take(n).map(|(q, _)| q).collect()
    }
}

/// A query no strategy could answer confidently, queued for manual review
/// and potential promotion into the lookup corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub query: String,
    pub category: String,
    pub lookup_similarity: f32,
    pub retrieval_confidence: f32,
    pub timestamp: String,
    pub status: String,
}

impl KnowledgeGap {
    pub fn unresolved(
        query: &str,
        category: &str,
        lookup_similarity: f32,
        retrieval_confidence: f32,
    ) -> Self {
        Self {
            query: query.to_string(),
            category: category.to_string(),
            lookup_similarity,
            retrieval_confidence,
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: "unresolved".to_string(),
        }
    }
}

pub struct KnowledgeGapLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl KnowledgeGapLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Vec<KnowledgeGap> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if !content.trim().is_empty() => {
                serde_json::from_str(&content).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Corrupt knowledge-gap file, resetting");
                    Vec::new()
                })
            }
            _ => Vec::new(),
        }
    }

    /// Append a gap entry, suppressing exact-duplicate queries.
    pub fn record(&self, gap: KnowledgeGap) {
        let _guard = self.lock.lock();
        let mut entries = self.load();
        if entries.iter().any(|e| e.query == gap.query) {
            tracing::debug!(query = %gap.query, "Ignored duplicate unresolved query");
            return;
        }
        tracing::info!(query = %gap.query, "Logged unresolved query for review");
        entries.push(gap);

        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&entries) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.path, content) {
                    tracing::warn!(error = %e, "Failed to save knowledge gaps");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize knowledge gaps"),
        }
    }

    pub fn entries(&self) -> Vec<KnowledgeGap> {
        let _guard = self.lock.lock();
        self.load()
    }
}
