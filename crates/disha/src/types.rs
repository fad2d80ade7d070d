use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Closed set of topical domains a query or corpus entry belongs to.
/// Classifier output outside this set degrades to `General` and is routed
/// conservatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Admissions,
    Financial,
    Academic,
    StudentServices,
    CampusLife,
    General,
    CrossDomain,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Admissions,
        Category::Financial,
        Category::Academic,
        Category::StudentServices,
        Category::CampusLife,
        Category::General,
        Category::CrossDomain,
    ];

    /// Human-readable label as emitted by the offline classifier.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Admissions => "Admissions & Registrations",
            Category::Financial => "Financial Matters",
            Category::Academic => "Academic Affairs",
            Category::StudentServices => "Student Services",
            Category::CampusLife => "Campus Life",
            Category::General => "General Information",
            Category::CrossDomain => "Cross-Domain Queries",
        }
    }

    /// Directory/file-safe name used for per-domain index artifacts.
    pub fn slug(&self) -> &'static str {
        match self {
            Category::Admissions => "admissions",
            Category::Financial => "financial",
            Category::Academic => "academic",
            Category::StudentServices => "student_services",
            Category::CampusLife => "campus_life",
            Category::General => "general",
            Category::CrossDomain => "cross_domain",
        }
    }

    /// Parse a classifier label or artifact slug, case-insensitively.
    /// Returns `None` for unrecognized names so callers can pick their own
    /// conservative fallback.
    pub fn from_label(name: &str) -> Option<Category> {
        let needle = name.trim().to_lowercase();
        Category::ALL
            .iter()
            .find(|c| c.label().to_lowercase() == needle || c.slug() == needle)
            .copied()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The three answer-producing strategies the orchestrator chains across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Rules,
    Lookup,
    Rag,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Rules => "rules",
            StrategyKind::Lookup => "lookup",
            StrategyKind::Rag => "rag",
        };
        f.write_str(name)
    }
}

/// One curated question/answer pair. Immutable once indexed; the domain tag
/// always maps into the fixed category set, with unparseable tags landing in
/// the cross-domain bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    #[serde(deserialize_with = "domain_or_cross_domain", default = "cross_domain")]
    pub domain: Category,
}

fn cross_domain() -> Category {
    Category::CrossDomain
}

/// Accept either the classifier label ("Financial Matters") or the slug
/// ("financial"); anything else falls back to the cross-domain bucket.
fn domain_or_cross_domain<'de, D>(deserializer: D) -> Result<Category, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(Category::from_label(&raw).unwrap_or(Category::CrossDomain))
}

/// One prior (user, assistant) exchange supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

impl ConversationTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}
