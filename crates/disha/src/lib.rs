//! Disha: a confidence-gated query routing and answer orchestration engine
//! for a college help desk.
//!
//! Incoming questions flow through validation, scope gating, and category
//! classification, then across up to three answer strategies (rule matcher,
//! similarity lookup, retrieval-augmented generation) in a per-category
//! order until one is confident, with the whole decision trail written to an
//! append-only audit log.

pub mod audit;
pub mod classify;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod guard;
pub mod llm;
pub mod orchestrator;
pub mod resources;
pub mod retrieval;
pub mod stats;
pub mod strategies;
pub mod types;
pub mod web_search;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export primary types for convenience
pub use config::EngineConfig;
pub use orchestrator::Orchestrator;
pub use resources::{Resources, ResourcesBuilder};
pub use types::{Category, ConversationTurn, QaEntry, StrategyKind};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
