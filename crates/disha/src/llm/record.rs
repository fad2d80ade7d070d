//! Structured answer records.
//!
//! The generator is never allowed to answer in free prose: it must emit a
//! small JSON record (title, a handful of label/value fields, an optional
//! note) which we render into display text ourselves. Constraining the shape
//! this hard keeps an inventive model from smuggling unsupported claims into
//! the answer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Hard cap on rendered label/value lines, regardless of what the model sent.
pub const MAX_RECORD_ITEMS: usize = 6;

/// System instructions handed to the generation collaborator.
pub const RECORD_INSTRUCTIONS: &str = "You answer college administrative questions \
using ONLY the provided context. Respond with a single JSON object and nothing else:\n\
{\"title\": \"Topic Name\", \"items\": [{\"label\": \"Label\", \"value\": \"Value\"}], \"notes\": \"optional short note\"}\n\
Rules:\n\
- At most 5 items.\n\
- Every value must come from the context; if the context does not answer the \
question, return {\"title\": \"\", \"items\": []}.\n\
- No markdown, no prose outside the JSON object.";

static LABEL_SANITIZER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s,:.\-₹$€£%()]").expect("label sanitizer is valid"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub items: Vec<AnswerItem>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerItem {
    pub label: String,
    pub value: String,
}

/// Extract an [`AnswerRecord`] from raw generator output. Tolerates markdown
/// fences and prose around the JSON object; returns `None` when no valid
/// record can be found.
pub fn parse_record(raw: &str) -> Option<AnswerRecord> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => return None,
    };

    serde_json::from_str(json_str).ok()
}

/// Render a record into display text. Returns `None` when the record has no
/// usable items, so callers can fall back to an extractive answer.
pub fn render_record(record: &AnswerRecord) -> Option<String> {
    let mut lines = Vec::new();

    let title = record.title.trim();
    if !title.is_empty() {
        lines.push(format!("**{}**", title));
    }

    let mut rendered = 0;
    for item in &record.items {
        if rendered >= MAX_RECORD_ITEMS {
            break;
        }
        let label = LABEL_SANITIZER.replace_all(item.label.trim(), "");
        let label = label.trim();
        let value = item.value.trim();
        if label.is_empty() || value.is_empty() {
            continue;
        }
        lines.push(format!("**{}:** {}", label, value));
        rendered += 1;
    }

    if rendered == 0 {
        return None;
    }

    let notes = record.notes.trim();
    if !notes.is_empty() {
        lines.push(format!("\n_{}_", notes));
    }

    Some(lines.join("\n"))
}
