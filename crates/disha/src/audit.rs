//! Append-only audit trail.
//!
//! Every pipeline stage transition produces one structured record: routing
//! decisions, retrieval quality, answer generation, answer rejection, errors,
//! and end-to-end latency. Records are tagged variants with fixed field sets,
//! serialized as one JSON object per line, and carry the query id for
//! correlation. Writers are mutex-serialized so concurrent queries never
//! interleave partial records.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::types::StrategyKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    RoutingDecision {
        query_id: String,
        timestamp: String,
        /// First 200 chars of the query, for privacy.
        query: String,
        validation: String,
        scope: String,
        category: String,
        confidence: f32,
        probabilities: BTreeMap<String, f32>,
        routed_to: String,
        similarity: Option<f32>,
        reason: String,
    },
    RetrievalQuality {
        query_id: String,
        timestamp: String,
        strategy: StrategyKind,
        top_k: usize,
        distances: Vec<f32>,
        best_similarity: f32,
        passed_threshold: bool,
        threshold: f32,
        retrieved: usize,
    },
    AnswerGeneration {
        query_id: String,
        timestamp: String,
        strategy: StrategyKind,
        answer_chars: usize,
        confidence: f32,
        sources: Vec<String>,
    },
    AnswerRejection {
        query_id: String,
        timestamp: String,
        strategy: StrategyKind,
        reason: String,
        score: Option<f32>,
        threshold: Option<f32>,
    },
    Error {
        query_id: String,
        timestamp: String,
        stage: String,
        kind: String,
        message: String,
    },
    Latency {
        query_id: String,
        timestamp: String,
        total_ms: u64,
        stages: BTreeMap<String, u64>,
    },
}

impl AuditEvent {
    pub fn query_id(&self) -> &str {
        match self {
            AuditEvent::RoutingDecision { query_id, .. }
            | AuditEvent::RetrievalQuality { query_id, .. }
            | AuditEvent::AnswerGeneration { query_id, .. }
            | AuditEvent::AnswerRejection { query_id, .. }
            | AuditEvent::Error { query_id, .. }
            | AuditEvent::Latency { query_id, .. } => query_id,
        }
    }
}

/// Current UTC timestamp in RFC 3339, as stored in every audit record.
pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Truncate a query for inclusion in a record.
pub fn clip_query(query: &str) -> String {
    query.chars().take(200).collect()
}

enum Sink {
    File(BufWriter<File>),
    Memory(Vec<AuditEvent>),
}

pub struct AuditLog {
    sink: Mutex<Sink>,
}

impl AuditLog {
    /// Open (or create) an append-only JSON-lines audit file.
    pub fn to_file(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            sink: Mutex::new(Sink::File(BufWriter::new(file))),
        })
    }

    /// In-memory sink for tests; records are retrievable via [`events`].
    ///
    /// [`events`]: AuditLog::events
    pub fn in_memory() -> Self {
        Self {
            sink: Mutex::new(Sink::Memory(Vec::new())),
        }
    }

    /// Append a record. Sink failures are logged and swallowed; auditing
    /// must never fail a query.
    pub fn record(&self, event: AuditEvent) {
        let mut sink = self.sink.lock();
        match &mut *sink {
            Sink::File(writer) => {
                let line = match serde_json::to_string(&event) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to serialize audit event");
                        return;
                    }
                };
                if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
                    tracing::warn!(error = %e, "Failed to write audit record");
                }
            }
            Sink::Memory(events) => events.push(event),
        }
    }

    /// Snapshot of recorded events. Only meaningful for the in-memory sink;
    /// a file-backed log returns an empty list.
    pub fn events(&self) -> Vec<AuditEvent> {
        match &*self.sink.lock() {
            Sink::Memory(events) => events.clone(),
            Sink::File(_) => Vec::new(),
        }
    }
}
