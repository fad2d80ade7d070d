//! The three answer-producing strategies the orchestrator chains across:
//! deterministic rule matching, similarity lookup over the QA corpus, and
//! retrieval-augmented generation. Each strategy gates its own confidence;
//! the orchestrator only decides ordering and fallback.

pub mod lookup;
pub mod rag;
pub mod rules;

pub use lookup::{LookupAnswer, SimilarityLookup};
pub use rag::{route_sources, RagAnswer, RagPipeline, SourceRoute};
pub use rules::RuleMatcher;
