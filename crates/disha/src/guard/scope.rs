//! Domain-scope gating.
//!
//! Greetings short-circuit the pipeline; explicit off-topic patterns are
//! refused; explicit college keywords are allowed; everything else is
//! neutral-allowed and the strategies are trusted to say "no information"
//! rather than guess.

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

const COLLEGE_SCOPE_KEYWORDS: &[&str] = &[
    "admission", "apply", "application", "eligibility", "documents",
    "fees", "fee", "refund", "scholarship",
    "hostel", "mess", "transport", "bus",
    "exam", "results", "revaluation", "hall ticket",
    "semester", "timetable", "syllabus", "attendance", "internal",
    "department", "course", "branch", "faculty",
    "bonafide", "noc", "certificate", "id card",
    "placement", "internship", "training", "cdc", "tpo",
    "library", "lab", "campus", "club",
];

static OUT_OF_SCOPE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(bitcoin|crypto|stock|share market)\b",
        r"(?i)\b(virat|kohli|cricket|ipl|football|messi|ronaldo)\b",
        r"(?i)\b(movie|actor|actress|netflix|anime)\b",
        r"(?i)\b(politics|election|minister|prime minister)\b",
        r"(?i)\b(girlfriend|boyfriend|love letter|breakup)\b",
        r"(?i)\b(black hole|galaxy|universe|space)\b",
    ])
    .expect("out-of-scope patterns are valid")
});

static PROGRAMMING: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(python|java|c\+\+|javascript|react|node|flask|django)\b",
        r"(?i)\b(write code|program|bug|error|exception|stack trace)\b",
        r"(?i)\b(leetcode|dsa|binary search|dp)\b",
    ])
    .expect("programming patterns are valid")
});

// Topics where a generated answer is too risky: the exact fact (an address,
// a phone number, office hours) must come from the rule base or not at all.
static DETERMINISTIC_ONLY: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(location|address|where is the college|map)\b",
        r"(?i)\b(phone|contact|number|email|call)\b",
        r"(?i)\b(timing|opening hours|working hours|office hours)\b",
    ])
    .expect("deterministic-only patterns are valid")
});

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeReason {
    Greeting,
    CollegeScope,
    OutOfScope,
    ProgrammingOutOfScope,
    NeutralAllow,
}

impl fmt::Display for ScopeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeReason::Greeting => "greeting",
            ScopeReason::CollegeScope => "college_scope",
            ScopeReason::OutOfScope => "out_of_scope",
            ScopeReason::ProgrammingOutOfScope => "programming_out_of_scope",
            ScopeReason::NeutralAllow => "neutral_allow",
        };
        f.write_str(name)
    }
}

/// True when the query is nothing but a greeting phrase.
pub fn is_greeting(query: &str) -> bool {
    let stripped: String = query
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    GREETINGS.contains(&normalized.as_str())
}

/// Decide whether the query belongs to the college domain.
pub fn check_scope(query: &str) -> (bool, ScopeReason) {
    if is_greeting(query) {
        return (true, ScopeReason::Greeting);
    }

    if OUT_OF_SCOPE.is_match(query) {
        return (false, ScopeReason::OutOfScope);
    }

    // Programming chatter is allowed when it is about the curriculum
    // ("python course"), blocked when it asks us to write code.
    if PROGRAMMING.is_match(query) {
        let q = query.to_lowercase();
        if q.contains("code") || q.contains("program") {
            return (false, ScopeReason::ProgrammingOutOfScope);
        }
    }

    let q = query.to_lowercase();
    if COLLEGE_SCOPE_KEYWORDS.iter().any(|k| q.contains(k)) {
        return (true, ScopeReason::CollegeScope);
    }

    // No match either way: allow, and rely on the strategies to answer
    // "no information" instead of hallucinating.
    (true, ScopeReason::NeutralAllow)
}

/// Queries about location, contact details, or operating hours must be
/// answered by the rule matcher only, never generated.
pub fn requires_deterministic_answer(query: &str) -> bool {
    DETERMINISTIC_ONLY.is_match(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_detected() {
        assert!(is_greeting("hello"));
        assert!(is_greeting("Good Morning!"));
        assert!(is_greeting("  hey  "));
        assert!(!is_greeting("hello, what is the fee?"));
    }

    #[test]
    fn test_greeting_scope() {
        let (in_scope, reason) = check_scope("hello");
        assert!(in_scope);
        assert_eq!(reason, ScopeReason::Greeting);
    }

    #[test]
    fn test_out_of_scope_patterns() {
        let (in_scope, reason) = check_scope("who won the ipl final?");
        assert!(!in_scope);
        assert_eq!(reason, ScopeReason::OutOfScope);

        let (in_scope, _) = check_scope("best netflix anime this year");
        assert!(!in_scope);
    }

    #[test]
    fn test_programming_blocked_only_with_code_intent() {
        let (in_scope, reason) = check_scope("write code for binary search in python");
        assert!(!in_scope);
        assert_eq!(reason, ScopeReason::ProgrammingOutOfScope);

        // Curriculum question mentioning a language is fine.
        let (in_scope, reason) = check_scope("is python taught in the cse syllabus?");
        assert!(in_scope);
        assert_eq!(reason, ScopeReason::CollegeScope);
    }

    #[test]
    fn test_college_keywords_in_scope() {
        let (in_scope, reason) = check_scope("what is the hostel fee?");
        assert!(in_scope);
        assert_eq!(reason, ScopeReason::CollegeScope);
    }

    #[test]
    fn test_neutral_allow() {
        let (in_scope, reason) = check_scope("tell me about the annual fest");
        assert!(in_scope);
        assert_eq!(reason, ScopeReason::NeutralAllow);
    }

    #[test]
    fn test_deterministic_only_topics() {
        assert!(requires_deterministic_answer("what is the college phone number?"));
        assert!(requires_deterministic_answer("office hours of the registrar"));
        assert!(requires_deterministic_answer("where is the college located, any map?"));
        assert!(!requires_deterministic_answer("what is the hostel fee?"));
    }
}
