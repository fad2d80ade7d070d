//! Per-query context accumulation.
//!
//! A `QueryContext` is created at pipeline entry, mutated additively as each
//! stage completes, read once at the end for the latency audit record, then
//! discarded. Nothing here is persisted beyond the audit log.

use std::collections::BTreeMap;
use std::time::Instant;
use uuid::Uuid;

use crate::classify::Prediction;
use crate::types::{ConversationTurn, StrategyKind};

#[derive(Debug)]
pub struct QueryContext {
    /// Short correlation id carried by every log line and audit record.
    pub query_id: String,
    pub query: String,
    pub started: Instant,
    pub validation_passed: Option<bool>,
    pub scope_reason: Option<String>,
    pub prediction: Option<Prediction>,
    pub planned_chain: Vec<StrategyKind>,
    pub answered_by: Option<StrategyKind>,
    pub answer_confidence: Option<f32>,
    pub lookup_similarity: Option<f32>,
    pub retrieval_confidence: Option<f32>,
    pub error: Option<String>,
    stage_times: BTreeMap<String, u64>,
    stage_started: Instant,
}

impl QueryContext {
    pub fn new(query: &str) -> Self {
        let now = Instant::now();
        Self {
            query_id: Uuid::new_v4().to_string()[..8].to_string(),
            query: query.to_string(),
            started: now,
            validation_passed: None,
            scope_reason: None,
            prediction: None,
            planned_chain: Vec::new(),
            answered_by: None,
            answer_confidence: None,
            lookup_similarity: None,
            retrieval_confidence: None,
            error: None,
            stage_times: BTreeMap::new(),
            stage_started: now,
        }
    }

    /// Close the current stage under `name` and start timing the next one.
    pub fn finish_stage(&mut self, name: &str) {
        let elapsed = self.stage_started.elapsed().as_millis() as u64;
        self.stage_times.insert(name.to_string(), elapsed);
        self.stage_started = Instant::now();
    }

    pub fn stage_times(&self) -> &BTreeMap<String, u64> {
        &self.stage_times
    }

    pub fn total_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Truncate history to its most recent `max_turns` entries. Older turns are
/// dropped, never summarized.
pub fn bounded_history(history: &[ConversationTurn], max_turns: usize) -> &[ConversationTurn] {
    if history.len() > max_turns {
        &history[history.len() - max_turns..]
    } else {
        history
    }
}
