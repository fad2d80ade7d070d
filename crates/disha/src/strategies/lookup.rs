//! Strategy B: similarity lookup over the curated QA corpus.
//!
//! Searches the hinted domain's index (falling back to the general bucket),
//! converts squared-L2 distances to similarities, prefers domain-consistent
//! candidates through a clamped ranking boost, and runs a cross-domain
//! recovery pass when the primary domain's best match is too weak — that
//! pass is what rescues queries the classifier put in the wrong bucket.

use anyhow::Result;

use crate::audit::{now_ts, AuditEvent, AuditLog};
use crate::config::ThresholdConfig;
use crate::embeddings::EmbeddingModel;
use crate::retrieval::{similarity_from_distance, QaStore};
use crate::types::{Category, StrategyKind};

const UNAVAILABLE_MESSAGE: &str =
    "The answer lookup service is not available right now. Please try again later.";

const LOW_CONFIDENCE_MESSAGE: &str = "I found some related information, but I'm not confident \
enough to answer. Please ask more specifically or contact student services.";

#[derive(Debug, Clone)]
pub struct LookupAnswer {
    pub text: String,
    /// Unboosted similarity of the chosen candidate.
    pub similarity: f32,
    pub confident: bool,
}

impl LookupAnswer {
    fn unavailable() -> Self {
        Self {
            text: UNAVAILABLE_MESSAGE.to_string(),
            similarity: 0.0,
            confident: false,
        }
    }
}

pub struct SimilarityLookup<'a> {
    store: &'a QaStore,
    embedder: &'a dyn EmbeddingModel,
    thresholds: &'a ThresholdConfig,
    audit: &'a AuditLog,
}

impl<'a> SimilarityLookup<'a> {
    pub fn new(
        store: &'a QaStore,
        embedder: &'a dyn EmbeddingModel,
        thresholds: &'a ThresholdConfig,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            store,
            embedder,
            thresholds,
            audit,
        }
    }

    /// Answer a query, gated by the similarity thresholds. Faults are caught
    /// here so a bad search can never take the whole pipeline down.
    pub fn answer(&self, query: &str, hint: Option<Category>, query_id: &str) -> LookupAnswer {
        match self.try_answer(query, hint, query_id) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(query_id = query_id, error = %e, "Similarity lookup failed");
                self.audit.record(AuditEvent::Error {
                    query_id: query_id.to_string(),
                    timestamp: now_ts(),
                    stage: "similarity_lookup".to_string(),
                    kind: "LOOKUP_ERROR".to_string(),
                    message: e.to_string(),
                });
                LookupAnswer {
                    text: "Error during semantic search. Please try again.".to_string(),
                    similarity: 0.0,
                    confident: false,
                }
            }
        }
    }

    fn try_answer(
        &self,
        query: &str,
        hint: Option<Category>,
        query_id: &str,
    ) -> Result<LookupAnswer> {
        let t = self.thresholds;

        // Select the domain index; a missing or empty hint bucket falls back
        // to the general one.
        let mut searched = hint.unwrap_or(Category::General);
        let mut bucket = self.store.bucket(searched);
        if bucket.entries.is_empty() && searched != Category::General {
            tracing::info!(
                query_id = query_id,
                domain = searched.slug(),
                "Domain index empty, falling back to general"
            );
            searched = Category::General;
            bucket = self.store.bucket(searched);
        }

        if bucket.entries.is_empty() {
            tracing::warn!(query_id = query_id, "Lookup index not available");
            self.audit.record(AuditEvent::RetrievalQuality {
                query_id: query_id.to_string(),
                timestamp: now_ts(),
                strategy: StrategyKind::Lookup,
                top_k: 0,
                distances: Vec::new(),
                best_similarity: 0.0,
                passed_threshold: false,
                threshold: t.lookup_high_similarity,
                retrieved: 0,
            });
            return Ok(LookupAnswer::unavailable());
        }

        let query_vector = self.embedder.embed_query(query)?;
        let (distances, ordinals) = bucket.index.search(&query_vector, t.lookup_top_k)?;

        // A bad ordinal skips that candidate, never the whole search.
        let candidates: Vec<(usize, f32, f32)> = distances
            .iter()
            .zip(&ordinals)
            .filter(|(_, &ordinal)| ordinal < bucket.entries.len())
            .map(|(&distance, &ordinal)| (ordinal, distance, similarity_from_distance(distance)))
            .collect();

        if candidates.is_empty() {
            tracing::warn!(query_id = query_id, "No valid lookup candidates");
            self.audit.record(AuditEvent::RetrievalQuality {
                query_id: query_id.to_string(),
                timestamp: now_ts(),
                strategy: StrategyKind::Lookup,
                top_k: t.lookup_top_k,
                distances,
                best_similarity: 0.0,
                passed_threshold: false,
                threshold: t.lookup_high_similarity,
                retrieved: 0,
            });
            return Ok(LookupAnswer::unavailable());
        }

        // Rank by boosted score, return the winner's unboosted similarity.
        let best = candidates
            .iter()
            .max_by(|a, b| {
                let a_score = boosted_score(a.2, bucket.entries[a.0].domain, hint, t.domain_boost);
                let b_score = boosted_score(b.2, bucket.entries[b.0].domain, hint, t.domain_boost);
                a_score
                    .partial_cmp(&b_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied()
            .unwrap_or(candidates[0]);

        let mut best_similarity = best.2;
        let mut best_entry = bucket.entries[best.0].clone();

        self.audit.record(AuditEvent::RetrievalQuality {
            query_id: query_id.to_string(),
            timestamp: now_ts(),
            strategy: StrategyKind::Lookup,
            top_k: t.lookup_top_k,
            distances: candidates.iter().map(|(_, d, _)| *d).collect(),
            best_similarity,
            passed_threshold: best_similarity >= t.lookup_high_similarity,
            threshold: t.lookup_high_similarity,
            retrieved: candidates.len(),
        });

        // Cross-domain recovery: the classifier may have picked the wrong
        // bucket. Accept the first other-domain hit that is strictly better
        // AND clears the minimum.
        if best_similarity < t.lookup_min_similarity && hint.is_some() {
            if let Some((recovered_from, similarity, entry)) =
                self.recover_across_domains(&query_vector, searched, best_similarity)?
            {
                tracing::info!(
                    query_id = query_id,
                    domain = recovered_from.slug(),
                    similarity = similarity,
                    "Cross-domain recovery accepted"
                );
                best_similarity = similarity;
                best_entry = entry;
            }
        }

        if best_similarity < t.lookup_min_similarity {
            self.audit.record(AuditEvent::AnswerRejection {
                query_id: query_id.to_string(),
                timestamp: now_ts(),
                strategy: StrategyKind::Lookup,
                reason: "Below minimum similarity threshold".to_string(),
                score: Some(best_similarity),
                threshold: Some(t.lookup_min_similarity),
            });
            return Ok(LookupAnswer {
                text: LOW_CONFIDENCE_MESSAGE.to_string(),
                similarity: best_similarity,
                confident: false,
            });
        }

        let confident = best_similarity >= t.lookup_high_similarity;
        if confident {
            self.audit.record(AuditEvent::AnswerGeneration {
                query_id: query_id.to_string(),
                timestamp: now_ts(),
                strategy: StrategyKind::Lookup,
                answer_chars: best_entry.answer.chars().count(),
                confidence: best_similarity,
                sources: vec![best_entry.question.clone()],
            });
        } else {
            self.audit.record(AuditEvent::AnswerRejection {
                query_id: query_id.to_string(),
                timestamp: now_ts(),
                strategy: StrategyKind::Lookup,
                reason: "Similarity below high-confidence threshold".to_string(),
                score: Some(best_similarity),
                threshold: Some(t.lookup_high_similarity),
            });
        }

        Ok(LookupAnswer {
            text: best_entry.answer,
            similarity: best_similarity,
            confident,
        })
    }

    /// Top-1 search over every other domain, in declaration order, accepting
    /// the first strictly-better hit that clears the minimum threshold.
    fn recover_across_domains(
        &self,
        query_vector: &[f32],
        searched: Category,
        original_best: f32,
    ) -> Result<Option<(Category, f32, crate::types::QaEntry)>> {
        for candidate_domain in Category::ALL {
            if candidate_domain == searched {
                continue;
            }
            let bucket = self.store.bucket(candidate_domain);
            if bucket.entries.is_empty() {
                continue;
            }

            let (distances, ordinals) = bucket.index.search(query_vector, 1)?;
            let Some((&distance, &ordinal)) = distances.iter().zip(&ordinals).next() else {
                continue;
            };
            if ordinal >= bucket.entries.len() {
                continue;
            }

            let similarity = similarity_from_distance(distance);
            if similarity > original_best && similarity >= self.thresholds.lookup_min_similarity {
                return Ok(Some((
                    candidate_domain,
                    similarity,
                    bucket.entries[ordinal].clone(),
                )));
            }
        }
        Ok(None)
    }
}

/// Ranking score: similarity plus the domain boost when the entry's tag
/// matches the hint, clamped so the boost can never push past 1.0.
fn boosted_score(similarity: f32, entry_domain: Category, hint: Option<Category>, boost: f32) -> f32 {
    match hint {
        Some(hint) if hint == entry_domain => (similarity + boost).min(1.0),
        _ => similarity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{FlatIndex, QaBucket};
    use crate::testutil::VecEmbedder;
    use crate::types::QaEntry;

    fn entry(question: &str, answer: &str, domain: Category) -> QaEntry {
        QaEntry {
            question: question.into(),
            answer: answer.into(),
            domain,
        }
    }

    /// Build a bucket from (vector, entry) pairs.
    fn bucket(dimension: usize, rows: Vec<(Vec<f32>, QaEntry)>) -> QaBucket {
        let mut index = FlatIndex::new(dimension);
        let mut entries = Vec::new();
        for (vector, entry) in rows {
            index.add(vector).unwrap();
            entries.push(entry);
        }
        QaBucket { index, entries }
    }

    fn thresholds() -> ThresholdConfig {
        ThresholdConfig::default()
    }

    #[test]
    fn test_boost_is_clamped_at_one() {
        assert_eq!(
            boosted_score(0.97, Category::Financial, Some(Category::Financial), 0.1),
            1.0
        );
        let boosted = boosted_score(0.5, Category::Financial, Some(Category::Financial), 0.1);
        assert!((boosted - 0.6).abs() < 1e-6);
        // No hint, or mismatched domain: no boost at all.
        assert_eq!(boosted_score(0.5, Category::Financial, None, 0.1), 0.5);
        assert_eq!(
            boosted_score(0.5, Category::Academic, Some(Category::Financial), 0.1),
            0.5
        );
    }

    #[test]
    fn test_boost_reranks_but_similarity_is_unboosted() {
        // Off-domain candidate is slightly closer (d=0.20, s≈0.833) than the
        // hint-domain one (d=0.35, s≈0.741); the boost flips the ranking and
        // the returned similarity is the winner's unboosted score.
        let embedder = VecEmbedder::of([("which fee", vec![0.0, 0.0])]);
        let store = QaStore::empty();
        store.swap(
            Category::Financial,
            bucket(
                2,
                vec![
                    (
                        vec![0.2_f32.sqrt(), 0.0],
                        entry("exam schedule", "Off-domain answer", Category::Academic),
                    ),
                    (
                        vec![0.35_f32.sqrt(), 0.0],
                        entry("hostel fee", "The hostel fee is Rs 45,000.", Category::Financial),
                    ),
                ],
            ),
        );

        let audit = AuditLog::in_memory();
        let t = thresholds();
        let lookup = SimilarityLookup::new(&store, &embedder, &t, &audit);
        let answer = lookup.answer("which fee", Some(Category::Financial), "t1");

        assert_eq!(answer.text, "The hostel fee is Rs 45,000.");
        assert!(answer.confident);
        // Unboosted similarity of the winner, not its boosted ranking score
        // and not the off-domain candidate's score.
        assert!((answer.similarity - 1.0 / 1.35).abs() < 1e-4);
    }

    #[test]
    fn test_exact_match_is_confident() {
        let embedder = VecEmbedder::of([("what is the hostel fee", vec![1.0, 0.0])]);
        let store = QaStore::empty();
        store.swap(
            Category::Financial,
            bucket(
                2,
                vec![(
                    vec![1.0, 0.0],
                    entry("what is the hostel fee", "Rs 45,000 per year.", Category::Financial),
                )],
            ),
        );

        let audit = AuditLog::in_memory();
        let t = thresholds();
        let lookup = SimilarityLookup::new(&store, &embedder, &t, &audit);
        let answer = lookup.answer("what is the hostel fee", Some(Category::Financial), "t2");

        assert!(answer.confident);
        assert_eq!(answer.similarity, 1.0);
        assert_eq!(answer.text, "Rs 45,000 per year.");
    }

    #[test]
    fn test_empty_store_is_unavailable() {
        let embedder = VecEmbedder::of([("any query", vec![1.0, 0.0])]);
        let store = QaStore::empty();
        let audit = AuditLog::in_memory();
        let t = thresholds();
        let lookup = SimilarityLookup::new(&store, &embedder, &t, &audit);

        let answer = lookup.answer("any query", Some(Category::Financial), "t3");
        assert!(!answer.confident);
        assert_eq!(answer.similarity, 0.0);
        assert!(answer.text.contains("not available"));

        // Unavailability is still audited as retrieval quality.
        let events = audit.events();
        assert!(matches!(
            events[0],
            AuditEvent::RetrievalQuality { retrieved: 0, .. }
        ));
    }

    #[test]
    fn test_cross_domain_recovery_fires_on_weak_primary() {
        // Primary (Financial) best: d=4.0 → s=0.2, below min. Academic holds
        // a strong match: d=0.25 → s=0.8, strictly better and above min.
        let embedder = VecEmbedder::of([("revaluation fee details", vec![0.0, 0.0])]);
        let store = QaStore::empty();
        store.swap(
            Category::Financial,
            bucket(
                2,
                vec![(vec![2.0, 0.0], entry("bus pass cost", "Bus pass answer", Category::Financial))],
            ),
        );
        store.swap(
            Category::Academic,
            bucket(
                2,
                vec![(
                    vec![0.5, 0.0],
                    entry(
                        "revaluation fee details",
                        "Revaluation costs Rs 1,000 per subject.",
                        Category::Academic,
                    ),
                )],
            ),
        );

        let audit = AuditLog::in_memory();
        let t = thresholds();
        let lookup = SimilarityLookup::new(&store, &embedder, &t, &audit);
        let answer = lookup.answer("revaluation fee details", Some(Category::Financial), "t4");

        assert_eq!(answer.text, "Revaluation costs Rs 1,000 per subject.");
        assert!((answer.similarity - 0.8).abs() < 1e-4);
        assert!(answer.confident);
    }

    #[test]
    fn test_recovery_requires_strict_improvement_and_minimum() {
        // Primary best s≈0.4 (below min); other domain offers s≈0.41 — above
        // the primary but still below the minimum, so recovery must NOT fire.
        let embedder = VecEmbedder::of([("odd query", vec![0.0, 0.0])]);
        let store = QaStore::empty();
        store.swap(
            Category::Financial,
            bucket(
                2,
                vec![(vec![1.5_f32.sqrt(), 0.0], entry("a", "primary", Category::Financial))],
            ),
        );
        store.swap(
            Category::Academic,
            bucket(
                2,
                vec![(
                    vec![1.43_f32.sqrt(), 0.0],
                    entry("b", "tempting but weak", Category::Academic),
                )],
            ),
        );

        let audit = AuditLog::in_memory();
        let t = thresholds();
        let lookup = SimilarityLookup::new(&store, &embedder, &t, &audit);
        let answer = lookup.answer("odd query", Some(Category::Financial), "t5");

        assert!(!answer.confident);
        assert!(answer.text.contains("not confident"));
        // Similarity stays the primary's best; the rejected recovery result
        // never leaks through.
        assert!((answer.similarity - 0.4).abs() < 1e-3);
    }

    #[test]
    fn test_no_recovery_when_primary_clears_high_threshold() {
        // Primary is already confident; even a perfect match elsewhere must
        // not be consulted.
        let embedder = VecEmbedder::of([("hostel fee", vec![0.0, 0.0])]);
        let store = QaStore::empty();
        store.swap(
            Category::Financial,
            bucket(
                2,
                vec![(vec![0.3_f32.sqrt(), 0.0], entry("hostel fee", "Primary answer", Category::Financial))],
            ),
        );
        store.swap(
            Category::Academic,
            bucket(
                2,
                vec![(vec![0.0, 0.0], entry("hostel fee", "Perfect elsewhere", Category::Academic))],
            ),
        );

        let audit = AuditLog::in_memory();
        let t = thresholds();
        let lookup = SimilarityLookup::new(&store, &embedder, &t, &audit);
        let answer = lookup.answer("hostel fee", Some(Category::Financial), "t6");

        assert_eq!(answer.text, "Primary answer");
        assert!(answer.confident);
    }

    #[test]
    fn test_out_of_range_ordinal_is_skipped() {
        // Index has two vectors but only one entry; the dangling ordinal must
        // be skipped silently instead of failing the search.
        let embedder = VecEmbedder::of([("hostel fee", vec![0.0, 0.0])]);
        let mut index = FlatIndex::new(2);
        index.add(vec![0.0, 0.0]).unwrap();
        index.add(vec![0.1, 0.0]).unwrap();
        let store = QaStore::empty();
        store.swap(
            Category::Financial,
            QaBucket {
                index,
                entries: vec![entry("hostel fee", "Only valid entry", Category::Financial)],
            },
        );

        let audit = AuditLog::in_memory();
        let t = thresholds();
        let lookup = SimilarityLookup::new(&store, &embedder, &t, &audit);
        let answer = lookup.answer("hostel fee", Some(Category::Financial), "t7");
        assert_eq!(answer.text, "Only valid entry");
        assert!(answer.confident);
    }

    #[test]
    fn test_hint_with_empty_bucket_falls_back_to_general() {
        let embedder = VecEmbedder::of([("library timings today", vec![0.0, 0.0])]);
        let store = QaStore::empty();
        store.swap(
            Category::General,
            bucket(
                2,
                vec![(
                    vec![0.0, 0.0],
                    entry("library timings today", "Open 8am to 8pm.", Category::General),
                )],
            ),
        );

        let audit = AuditLog::in_memory();
        let t = thresholds();
        let lookup = SimilarityLookup::new(&store, &embedder, &t, &audit);
        let answer = lookup.answer("library timings today", Some(Category::CampusLife), "t8");
        assert_eq!(answer.text, "Open 8am to 8pm.");
        assert!(answer.confident);
    }
}
