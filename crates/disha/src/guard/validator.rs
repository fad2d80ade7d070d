//! Query validation: format and safety checks, first match wins.
//!
//! Check order is severity order — self-harm outranks everything else, so a
//! query matching both a self-harm and an abuse pattern always gets the
//! crisis message. Pure function over the query string; no I/O.

use regex::{Regex, RegexSet};
use std::sync::LazyLock;

static SELF_HARM: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(kill|suicide|hang|cut wrist|slit|overdose|jump off)\b",
        r"(?i)\b(hurt myself|harm myself|end (?:my )?life|die|die soon)\b",
    ])
    .expect("self-harm patterns are valid")
});

static ABUSE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(fuck|bitch|madarchod|chutiya)\b",
        r"(?i)\b(asshole|bastard|damn|crap)\b",
        r"(?i)\b(idiot|moron|stupid|retard)\b",
    ])
    .expect("abuse patterns are valid")
});

static PROMPT_INJECTION: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(ignore previous|disregard|forget|system prompt)\b",
        r"(?i)\b(role-play as|pretend|you are now|you are a)\b",
        r"(?i)\b(from now on|henceforth|starting now)\b",
        r"(?i)\b(follow these instructions|new instructions|updated rules)\b",
        // SQL injection tokens
        r"\b(DROP|DELETE|INSERT|UPDATE|SELECT|UNION|WHERE 1=1)\b",
        // Code injection tokens
        r"(?i)\b(eval|exec|__import__|compile|globals|locals)\b",
    ])
    .expect("injection patterns are valid")
});

static SENSITIVE_EXTRACTION: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(all student names|list of password|admin account|secret|api key|access token)\b",
        r"(?i)\b(all emails|all phone number|database dump|backup)\b",
    ])
    .expect("extraction patterns are valid")
});

static KEYBOARD_MASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(asdf|qwer|zxcv|1234|0000)+$").expect("mash pattern is valid"));

const CRISIS_MESSAGE: &str = "**Crisis Support**\n\n\
If you're having thoughts of self-harm, please reach out:\n\
- National Suicide Prevention Lifeline: 988 (US)\n\
- International Association for Suicide Prevention: https://www.iasp.info/resources/Crisis_Centres/\n\
- Your university counseling center or campus healthcare\n\n\
I'm here to help with academic questions, not crisis support.";

const INJECTION_MESSAGE: &str = "**Invalid Query**\n\n\
Your query appears to contain instructions to modify my behavior. \
I can only answer questions about college administrative support.\n\
Please ask a direct question.";

const ACCESS_DENIED_MESSAGE: &str = "**Access Denied**\n\n\
I cannot provide sensitive student or administrative data. \
For official information, please contact the registrar or student services directly.";

/// Outcome of validation. `reason` is a stable short code for audit records;
/// `message` is what the caller shows the user when `valid` is false.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub valid: bool,
    pub reason: &'static str,
    pub message: String,
}

impl Verdict {
    fn rejected(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason,
            message: message.into(),
        }
    }
}

/// Comprehensive query validation with safety checks, most severe first.
pub fn validate(query: &str) -> Verdict {
    let q = query.trim();

    if q.is_empty() {
        return Verdict::rejected("empty", "Query is empty. Please type your question.");
    }

    // Exact greeting phrases are valid by definition (they would otherwise
    // trip the length checks); the scope guard gives them their response.
    if crate::guard::scope::is_greeting(q) {
        return Verdict {
            valid: true,
            reason: "greeting",
            message: String::new(),
        };
    }

    if SELF_HARM.is_match(q) {
        return Verdict::rejected("self_harm", CRISIS_MESSAGE);
    }

    if ABUSE.is_match(q) {
        return Verdict::rejected(
            "abusive",
            "Please use respectful language. This assistant is here to help you.",
        );
    }

    if PROMPT_INJECTION.is_match(q) {
        return Verdict::rejected("prompt_injection", INJECTION_MESSAGE);
    }

    if SENSITIVE_EXTRACTION.is_match(q) {
        return Verdict::rejected("sensitive_extraction", ACCESS_DENIED_MESSAGE);
    }

    if is_gibberish(q) {
        return Verdict::rejected(
            "gibberish",
            "Your message looks invalid. Please ask a proper question.",
        );
    }

    if q.split_whitespace().count() < 2 {
        return Verdict::rejected(
            "too_short",
            "Please provide more detail. Example: 'What is the hostel fee?'",
        );
    }

    Verdict {
        valid: true,
        reason: "valid",
        message: String::new(),
    }
}

/// Gibberish detection: excessive special characters, digit-only input,
/// repeated short chunks, or known keyboard-mash prefixes.
pub(crate) fn is_gibberish(query: &str) -> bool {
    let compact: String = query
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if compact.chars().count() <= 2 {
        return true;
    }

    let total = query.chars().count().max(1);
    let special = query.chars().filter(|c| !c.is_alphanumeric()).count();
    if special as f32 / total as f32 > 0.5 {
        return true;
    }

    if compact.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    if KEYBOARD_MASH.is_match(&compact) {
        return true;
    }

    is_repeated_chunk(&compact)
}

/// True when the string is the same 1-4 char chunk repeated, e.g.
/// "abcdabcdabcd" or "hahaha".
fn is_repeated_chunk(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    for width in 1..=4usize {
        if chars.len() >= width * 2 && chars.len() % width == 0 {
            let chunk = &chars[..width];
            if chars.chunks(width).all(|c| c == chunk) {
                return true;
            }
        }
    }
    false
}
