//! Strategy A: deterministic rule matcher.
//!
//! Rules come from a declarative JSON file of pattern→template entries.
//! Queries are uppercased and stripped to alphanumerics before matching;
//! patterns may contain `*` wildcards. No rule matched means "not
//! confident", never an error — the matcher has no numeric confidence at
//! all, only a binary fired/not-fired.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Fixed reply when the forced-deterministic route finds no rule.
pub const NO_RULE_MESSAGE: &str =
    "Sorry, I don't have information on that. Please contact the college office for exact details.";

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub patterns: Vec<String>,
    pub template: String,
}

pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
}

struct CompiledRule {
    patterns: Vec<String>,
    template: String,
}

impl RuleMatcher {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let compiled = rules
            .into_iter()
            .map(|rule| CompiledRule {
                patterns: rule
                    .patterns
                    .iter()
                    .map(|p| normalize_pattern(p))
                    .filter(|p| !p.is_empty())
                    .collect(),
                template: rule.template,
            })
            .filter(|rule| !rule.patterns.is_empty())
            .collect();
        Self { rules: compiled }
    }

    /// Load the rule file. A missing file is tolerated — the matcher simply
    /// never fires and the orchestrator falls through.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(matcher) => {
                tracing::info!(path = %path.display(), rules = matcher.len(), "Rule file loaded");
                matcher
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Rule file unavailable, matcher disabled");
                Self::empty()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rule file at {}", path.display()))?;
        let rules: Vec<Rule> =
            serde_json::from_str(&content).context("Failed to parse rule file")?;
        Ok(Self::from_rules(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First matching rule's template, or `None` when nothing fires.
    pub fn respond(&self, query: &str) -> Option<String> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| glob_match(&normalized, p)))
            .map(|rule| rule.template.clone())
    }
}

/// Uppercase, strip everything but alphanumerics, collapse whitespace.
fn normalize_query(query: &str) -> String {
    let kept: String = query
        .to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Same normalization, but `*` survives as the wildcard marker.
fn normalize_pattern(pattern: &str) -> String {
    let kept: String = pattern
        .to_uppercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '*' {
                c
            } else {
                ' '
            }
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Glob match with `*` matching any (possibly empty) run of characters.
fn glob_match(text: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return text == pattern;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0;

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(segment) {
                return false;
            }
            pos = segment.len();
        } else if i == segments.len() - 1 {
            let rest = &text[pos.min(text.len())..];
            if !rest.ends_with(segment) || rest.len() < segment.len() {
                return false;
            }
        } else {
            match text[pos.min(text.len())..].find(segment) {
                Some(offset) => pos = pos + offset + segment.len(),
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> RuleMatcher {
        RuleMatcher::from_rules(vec![
            Rule {
                patterns: vec!["WHAT IS THE COLLEGE PHONE NUMBER".into(), "* PHONE NUMBER *".into()],
                template: "You can reach the college office at 0863-2293356.".into(),
            },
            Rule {
                patterns: vec!["WHERE IS THE COLLEGE *".into()],
                template: "The college is located at Chowdavaram, Guntur, Andhra Pradesh.".into(),
            },
        ])
    }

    #[test]
    fn test_exact_match_after_normalization() {
        let response = matcher().respond("What is the college phone number?");
        assert_eq!(
            response.unwrap(),
            "You can reach the college office at 0863-2293356."
        );
    }

    #[test]
    fn test_wildcard_prefix_and_suffix() {
        let response = matcher().respond("Tell me the phone number of the office");
        assert!(response.is_some());

        let response = matcher().respond("where is the college located exactly");
        assert!(response.unwrap().contains("Chowdavaram"));
    }

    #[test]
    fn test_no_match_returns_none() {
        assert!(matcher().respond("what is the hostel fee?").is_none());
        assert!(matcher().respond("").is_none());
    }

    #[test]
    fn test_punctuation_and_case_insensitive() {
        let a = matcher().respond("WHAT IS THE COLLEGE PHONE NUMBER???");
        let b = matcher().respond("what is the college phone number");
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn test_missing_rule_file_gives_empty_matcher() {
        let matcher = RuleMatcher::load(Path::new("/nonexistent/rules.json"));
        assert!(matcher.is_empty());
        assert!(matcher.respond("anything at all").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"patterns": ["HOSTEL TIMINGS *"], "template": "Hostel gates close at 9pm."}]"#,
        )
        .unwrap();
        let matcher = RuleMatcher::load(&path);
        assert_eq!(matcher.len(), 1);
        assert!(matcher
            .respond("hostel timings please")
            .unwrap()
            .contains("9pm"));
    }

    #[test]
    fn test_glob_middle_segment() {
        assert!(glob_match("A B C D", "A * D"));
        assert!(glob_match("A D", "A*D"));
        assert!(!glob_match("A B C", "A * D"));
        assert!(glob_match("THE PHONE NUMBER PLEASE", "*PHONE NUMBER*"));
    }
}
