//! Input safety and domain-scope gating, applied before any strategy runs.

pub mod scope;
pub mod validator;

pub use scope::{check_scope, is_greeting, requires_deterministic_answer, ScopeReason};
pub use validator::{validate, Verdict};
