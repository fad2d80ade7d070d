//! Category classification over a fixed topical domain set.
//!
//! The model itself is trained offline; at query time we load a linear
//! artifact (per-token weight rows plus per-category bias) and score with a
//! bag-of-tokens dot product followed by softmax, so the returned
//! distribution always sums to 1 and confidence is the maximum probability.
//! A missing or corrupt artifact degrades to `General` with confidence 0.0
//! instead of raising, which pushes routing onto its most conservative path.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::types::Category;

#[derive(Debug, Clone)]
pub struct Prediction {
    pub category: Category,
    pub confidence: f32,
    pub probabilities: BTreeMap<String, f32>,
}

impl Prediction {
    /// The conservative default used when no artifact is available.
    fn degraded() -> Self {
        Self {
            category: Category::General,
            confidence: 0.0,
            probabilities: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClassifierArtifact {
    categories: Vec<String>,
    /// token -> one weight per category, same order as `categories`.
    vocabulary: HashMap<String, Vec<f32>>,
    bias: Vec<f32>,
}

impl ClassifierArtifact {
    fn check(&self) -> Result<(), String> {
        if self.categories.is_empty() {
            return Err("artifact has no categories".into());
        }
        if self.bias.len() != self.categories.len() {
            return Err("bias length does not match category count".into());
        }
        if let Some((token, row)) = self
            .vocabulary
            .iter()
            .find(|(_, row)| row.len() != self.categories.len())
        {
            return Err(format!(
                "weight row for '{}' has {} entries, expected {}",
                token,
                row.len(),
                self.categories.len()
            ));
        }
        Ok(())
    }
}

pub struct CategoryClassifier {
    artifact: Option<ClassifierArtifact>,
}

impl CategoryClassifier {
    /// Load the classifier artifact. Missing or corrupt artifacts are
    /// tolerated: the classifier still works, it just always degrades.
    pub fn load(path: &Path) -> Self {
        let artifact = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<ClassifierArtifact>(&content) {
                Ok(artifact) => match artifact.check() {
                    Ok(()) => {
                        tracing::info!(
                            path = %path.display(),
                            categories = artifact.categories.len(),
                            vocabulary = artifact.vocabulary.len(),
                            "Classifier artifact loaded"
                        );
                        Some(artifact)
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Invalid classifier artifact, degrading");
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Unparseable classifier artifact, degrading");
                    None
                }
            },
            Err(_) => {
                tracing::warn!(path = %path.display(), "Classifier artifact missing, degrading");
                None
            }
        };
        Self { artifact }
    }

    /// A classifier with no artifact; always returns the degraded prediction.
    pub fn disabled() -> Self {
        Self { artifact: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.artifact.is_some()
    }

    /// Classify a query. Deterministic for a given artifact.
    pub fn classify(&self, query: &str) -> Prediction {
        let Some(artifact) = &self.artifact else {
            return Prediction::degraded();
        };

        let mut scores = artifact.bias.clone();
        for token in tokenize(query) {
            if let Some(row) = artifact.vocabulary.get(&token) {
                for (score, weight) in scores.iter_mut().zip(row) {
                    *score += weight;
                }
            }
        }

        let probabilities = softmax(&scores);

        let (best_idx, best_prob) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((0, 0.0));

        let label = &artifact.categories[best_idx];
        let category = Category::from_label(label).unwrap_or(Category::General);

        let distribution: BTreeMap<String, f32> = artifact
            .categories
            .iter()
            .cloned()
            .zip(probabilities.iter().copied())
            .collect();

        Prediction {
            category,
            confidence: best_prob,
            probabilities: distribution,
        }
    }
}

fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact_json() -> String {
        // Two-token toy model: "fee" votes Financial, "admission" votes
        // Admissions.
        serde_json::json!({
            "categories": ["Financial Matters", "Admissions & Registrations", "General Information"],
            "vocabulary": {
                "fee": [3.0, 0.0, 0.0],
                "hostel": [1.0, 0.0, 0.5],
                "admission": [0.0, 3.0, 0.0],
            },
            "bias": [0.0, 0.0, 0.5],
        })
        .to_string()
    }

    fn loaded_classifier() -> CategoryClassifier {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        std::fs::write(&path, artifact_json()).unwrap();
        CategoryClassifier::load(&path)
    }

    #[test]
    fn test_distribution_sums_to_one() {
        let classifier = loaded_classifier();
        let prediction = classifier.classify("what is the hostel fee?");
        let sum: f32 = prediction.probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(prediction.probabilities.len(), 3);
    }

    #[test]
    fn test_classifies_financial() {
        let classifier = loaded_classifier();
        let prediction = classifier.classify("what is the hostel fee?");
        assert_eq!(prediction.category, Category::Financial);
        assert!(prediction.confidence > 0.5);
    }

    #[test]
    fn test_deterministic() {
        let classifier = loaded_classifier();
        let a = classifier.classify("admission process details");
        let b = classifier.classify("admission process details");
        assert_eq!(a.category, b.category);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_missing_artifact_degrades() {
        let classifier = CategoryClassifier::load(Path::new("/nonexistent/classifier.json"));
        assert!(!classifier.is_loaded());
        let prediction = classifier.classify("what is the hostel fee?");
        assert_eq!(prediction.category, Category::General);
        assert_eq!(prediction.confidence, 0.0);
        assert!(prediction.probabilities.is_empty());
    }

    #[test]
    fn test_corrupt_artifact_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        std::fs::write(&path, "{not json").unwrap();
        let classifier = CategoryClassifier::load(&path);
        assert!(!classifier.is_loaded());
    }

    #[test]
    fn test_mismatched_rows_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        std::fs::write(
            &path,
            r#"{"categories":["A","B"],"vocabulary":{"x":[1.0]},"bias":[0.0,0.0]}"#,
        )
        .unwrap();
        let classifier = CategoryClassifier::load(&path);
        assert!(!classifier.is_loaded());
    }
}
