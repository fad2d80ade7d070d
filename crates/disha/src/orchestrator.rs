//! The routing state machine: VALIDATE → SCOPE → CLASSIFY → ROUTE → EXECUTE
//! → RESPOND.
//!
//! Strategies run in the per-category configured order until one returns a
//! confident answer. A strategy fault is contained at its boundary and the
//! chain continues; anything escaping stage handling is caught at the top so
//! the caller always receives a response. Every query leaves a routing
//! record, per-strategy quality records, and a latency record in the audit
//! trail, and queries no strategy could answer are queued as knowledge gaps.

use anyhow::Result;
use std::sync::Arc;

use crate::audit::{clip_query, now_ts, AuditEvent};
use crate::classify::Prediction;
use crate::context::QueryContext;
use crate::guard::{check_scope, requires_deterministic_answer, validate, ScopeReason};
use crate::resources::Resources;
use crate::stats::KnowledgeGap;
use crate::strategies::rules::NO_RULE_MESSAGE;
use crate::strategies::{RagPipeline, SimilarityLookup};
use crate::types::{Category, ConversationTurn, StrategyKind};

/// Audit-trail confidence recorded when a rule fires; the matcher itself is
/// binary.
const RULE_CONFIDENCE: f32 = 0.9;

const GREETING_RESPONSE: &str = "Hello! I can help with admissions, fees, exams, hostel, \
placements, and other campus services. What would you like to know?";

const OUT_OF_SCOPE_RESPONSE: &str = "I can only help with college administrative questions.\n\n\
I'm designed to answer questions about:\n\
- Admissions, eligibility, application documents\n\
- Fees, scholarships, financial aid\n\
- Academic programs, courses, syllabus\n\
- Exams, results, revaluation, timetable\n\
- Hostel, mess, transport, campus facilities\n\
- Bonafide, NOC, certificates, ID cards\n\
- Placements, internships, training\n\n\
Please ask a question related to these topics, or contact student services.";

const FINAL_FALLBACK_RESPONSE: &str = "I couldn't find a confident answer to your question. \
Please contact student services or the college office for help. Your question has been \
recorded so we can improve our knowledge base.";

const CRITICAL_ERROR_RESPONSE: &str =
    "A critical error occurred. Please try again or contact support.";

pub struct Orchestrator {
    resources: Arc<Resources>,
}

impl Orchestrator {
    pub fn new(resources: Arc<Resources>) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Handle one query end to end. Never fails: every path, including a
    /// catastrophic fault, produces a response string and a latency record.
    pub async fn handle_query(&self, query: &str, history: &[ConversationTurn]) -> String {
        let mut ctx = QueryContext::new(query);
        tracing::info!(
            query_id = %ctx.query_id,
            query = %clip_query(query),
            history_turns = history.len(),
            "Query received"
        );

        let response = match self.run_stages(&mut ctx, history).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(query_id = %ctx.query_id, error = %e, "Critical orchestrator fault");
                ctx.error = Some(e.to_string());
                self.resources.audit.record(AuditEvent::Error {
                    query_id: ctx.query_id.clone(),
                    timestamp: now_ts(),
                    stage: "orchestrator".to_string(),
                    kind: "ORCHESTRATOR_ERROR".to_string(),
                    message: e.to_string(),
                });
                CRITICAL_ERROR_RESPONSE.to_string()
            }
        };

        self.resources.audit.record(AuditEvent::Latency {
            query_id: ctx.query_id.clone(),
            timestamp: now_ts(),
            total_ms: ctx.total_ms(),
            stages: ctx.stage_times().clone(),
        });

        tracing::info!(
            query_id = %ctx.query_id,
            answered_by = ?ctx.answered_by,
            confidence = ctx.answer_confidence.unwrap_or(0.0),
            latency_ms = ctx.total_ms(),
            error = ctx.error.as_deref().unwrap_or("none"),
            "Query completed"
        );

        response
    }

    async fn run_stages(
        &self,
        ctx: &mut QueryContext,
        history: &[ConversationTurn],
    ) -> Result<String> {
        let res = &*self.resources;
        let query = ctx.query.clone();

        // [1] Validation.
        let verdict = validate(&query);
        ctx.validation_passed = Some(verdict.valid);
        ctx.finish_stage("validation");
        if !verdict.valid {
            tracing::info!(query_id = %ctx.query_id, reason = verdict.reason, "Query failed validation");
            res.audit
                .record(routing_record(ctx, "FAILED", "NOT_CHECKED", None, "none", verdict.reason));
            return Ok(verdict.message);
        }

        // [2] Scope check.
        let (in_scope, scope_reason) = check_scope(&query);
        ctx.scope_reason = Some(scope_reason.to_string());
        ctx.finish_stage("scope_check");
        if scope_reason == ScopeReason::Greeting {
            res.audit
                .record(routing_record(ctx, "PASSED", "GREETING", None, "none", "greeting"));
            return Ok(GREETING_RESPONSE.to_string());
        }
        if !in_scope {
            tracing::info!(query_id = %ctx.query_id, reason = %scope_reason, "Query out of scope");
            let scope = scope_reason.to_string().to_uppercase();
            res.audit
                .record(routing_record(ctx, "PASSED", &scope, None, "none", &scope_reason.to_string()));
            return Ok(OUT_OF_SCOPE_RESPONSE.to_string());
        }
        res.stats.increment(&query);

        // [3] Classification.
        let prediction = res.classifier.classify(&query);
        tracing::info!(
            query_id = %ctx.query_id,
            category = %prediction.category,
            confidence = prediction.confidence,
            "Query classified"
        );
        ctx.prediction = Some(prediction.clone());
        ctx.finish_stage("classification");

        // [4] Routing decision.
        let thresholds = &res.config.thresholds;
        let forced = requires_deterministic_answer(&query);
        let (plan, hint, reason) = if forced {
            (
                vec![StrategyKind::Rules],
                None,
                "deterministic-only topic (location/contact/hours)".to_string(),
            )
        } else if prediction.confidence >= thresholds.classifier_mid_confidence {
            let level = if prediction.confidence >= thresholds.classifier_high_confidence {
                "high"
            } else {
                "medium"
            };
            (
                res.config.routing.chain_for(Some(prediction.category)).to_vec(),
                Some(prediction.category),
                format!(
                    "{} classifier confidence ({:.4}) for {}",
                    level, prediction.confidence, prediction.category
                ),
            )
        } else {
            (
                res.config.routing.chain_for(None).to_vec(),
                None,
                format!(
                    "low classifier confidence ({:.4} < {}), conservative default chain",
                    prediction.confidence, thresholds.classifier_mid_confidence
                ),
            )
        };
        ctx.planned_chain = plan.clone();

        let plan_label = plan
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" > ");
        tracing::info!(query_id = %ctx.query_id, plan = %plan_label, reason = %reason, "Routing decided");
        let scope = scope_reason.to_string().to_uppercase();
        res.audit
            .record(routing_record(ctx, "PASSED", &scope, Some(&prediction), &plan_label, &reason));
        ctx.finish_stage("routing");

        // [5] Execution: first confident answer wins; faults are contained
        // per strategy and the chain continues.
        for strategy in &plan {
            match strategy {
                StrategyKind::Rules => {
                    if let Some(text) = res.rules.respond(&query) {
                        tracing::info!(query_id = %ctx.query_id, "Rule matcher answered");
                        res.audit.record(AuditEvent::AnswerGeneration {
                            query_id: ctx.query_id.clone(),
                            timestamp: now_ts(),
                            strategy: StrategyKind::Rules,
                            answer_chars: text.chars().count(),
                            confidence: RULE_CONFIDENCE,
                            sources: Vec::new(),
                        });
                        ctx.answered_by = Some(StrategyKind::Rules);
                        ctx.answer_confidence = Some(RULE_CONFIDENCE);
                        ctx.finish_stage("answer_generation");
                        return Ok(text);
                    }
                    res.audit.record(AuditEvent::AnswerRejection {
                        query_id: ctx.query_id.clone(),
                        timestamp: now_ts(),
                        strategy: StrategyKind::Rules,
                        reason: "No matching rule".to_string(),
                        score: None,
                        threshold: None,
                    });
                    if forced {
                        // Exact-fact topics never fall through to the
                        // generative strategies.
                        ctx.finish_stage("answer_generation");
                        return Ok(NO_RULE_MESSAGE.to_string());
                    }
                }

                StrategyKind::Lookup => {
                    let lookup = SimilarityLookup::new(
                        &res.qa,
                        res.embedder.as_ref(),
                        thresholds,
                        &res.audit,
                    );
                    let answer = lookup.answer(&query, hint, &ctx.query_id);
                    ctx.lookup_similarity = Some(answer.similarity);
                    if answer.confident {
                        ctx.answered_by = Some(StrategyKind::Lookup);
                        ctx.answer_confidence = Some(answer.similarity);
                        ctx.finish_stage("answer_generation");
                        return Ok(answer.text);
                    }
                    tracing::info!(
                        query_id = %ctx.query_id,
                        similarity = answer.similarity,
                        "Lookup unconfident, falling through"
                    );
                }

                StrategyKind::Rag => {
                    let rag = RagPipeline::new(
                        &res.chunks,
                        res.embedder.as_ref(),
                        res.generator.as_deref(),
                        &res.web,
                        thresholds,
                        &res.config.history,
                        &res.audit,
                        res.request_timeout(),
                    );
                    let answer = rag.answer(&query, history, &ctx.query_id).await;
                    ctx.retrieval_confidence = Some(answer.confidence);
                    if answer.confident {
                        ctx.answered_by = Some(StrategyKind::Rag);
                        ctx.answer_confidence = Some(answer.confidence);
                        ctx.finish_stage("answer_generation");
                        return Ok(answer.text);
                    }
                    tracing::info!(
                        query_id = %ctx.query_id,
                        confidence = answer.confidence,
                        "RAG unconfident, falling through"
                    );
                }
            }
        }
        ctx.finish_stage("answer_generation");

        // Chain exhausted: queue the query for knowledge-gap review and send
        // the caller to a human.
        let category_label = ctx
            .prediction
            .as_ref()
            .map(|p| p.category)
            .unwrap_or(Category::General)
            .label();
        res.gaps.record(KnowledgeGap::unresolved(
            &query,
            category_label,
            ctx.lookup_similarity.unwrap_or(0.0),
            ctx.retrieval_confidence.unwrap_or(0.0),
        ));
        tracing::info!(query_id = %ctx.query_id, "All strategies exhausted, returning fallback");
        Ok(FINAL_FALLBACK_RESPONSE.to_string())
    }
}

fn routing_record(
    ctx: &QueryContext,
    validation: &str,
    scope: &str,
    prediction: Option<&Prediction>,
    routed_to: &str,
    reason: &str,
) -> AuditEvent {
    AuditEvent::RoutingDecision {
        query_id: ctx.query_id.clone(),
        timestamp: now_ts(),
        query: clip_query(&ctx.query),
        validation: validation.to_string(),
        scope: scope.to_string(),
        category: prediction
            .map(|p| p.category.label().to_string())
            .unwrap_or_else(|| "none".to_string()),
        confidence: prediction.map(|p| p.confidence).unwrap_or(0.0),
        probabilities: prediction
            .map(|p| p.probabilities.clone())
            .unwrap_or_default(),
        routed_to: routed_to.to_string(),
        similarity: ctx.lookup_similarity,
        reason: reason.to_string(),
    }
}
