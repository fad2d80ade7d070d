//! Strategy C: retrieval-augmented generation over long-form documents.
//!
//! The last-resort strategy, and the one with the most ways to hallucinate,
//! so every step is gated: retrieval below the confidence floor refuses to
//! generate at all, the generator may only emit a structured record, and an
//! unusable generation degrades to an extractive answer built from the best
//! chunk. Any fault inside this strategy becomes a generic error answer —
//! one bad query must never crash the service.

use anyhow::Result;
use std::time::Duration;

use crate::audit::{now_ts, AuditEvent, AuditLog};
use crate::config::{HistoryConfig, ThresholdConfig};
use crate::context::bounded_history;
use crate::embeddings::EmbeddingModel;
use crate::llm::record::{parse_record, render_record, RECORD_INSTRUCTIONS};
use crate::llm::AnswerGenerator;
use crate::retrieval::{similarity_from_distance, ChunkStore, DocumentChunk};
use crate::types::{ConversationTurn, StrategyKind};
use crate::web_search::WebSearch;

const NO_INFO_MESSAGE: &str = "**No Official Information Found**\n\n\
I don't have information about this topic in the official college database. \
Please contact Student Services, the Registrar's Office, or your academic advisor.";

const LOW_CONFIDENCE_MESSAGE: &str = "**Low Confidence Answer**\n\n\
I found some related information, but I'm not confident it accurately answers \
your question. Please contact student services or check the official college \
website for accurate information.";

const SYSTEM_ERROR_MESSAGE: &str = "Error generating answer. Please try again later.";

/// Confidence attached to answers grounded only in web results.
const WEB_CONFIDENCE: f32 = 0.7;

const LOCAL_KEYWORDS: &[&str] = &[
    "college", "department", "fee", "tuition", "placement", "campus",
    "hostel", "library", "exam", "syllabus", "faculty", "admission",
    "laboratory", "professors", "bus", "transport", "canteen", "calendar",
    "result",
];

const WEB_KEYWORDS: &[&str] = &[
    "news", "event", "hackathon", "technology", "ai", "compare",
    "ranking", "current affairs", "world", "india", "global",
    "latest", "google", "microsoft", "trend", "weather",
];

const HYBRID_KEYWORDS: &[&str] = &[
    "compare", "vs", "better than", "difference between", "ranking",
    "market trend", "industry demand",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRoute {
    Local,
    Web,
    Hybrid,
}

fn matches_keyword(query: &str, tokens: &[&str], keyword: &str) -> bool {
    if keyword.contains(' ') {
        query.contains(keyword)
    } else {
        tokens.contains(&keyword)
    }
}

/// Decide which retrieval sources serve a query. Comparative questions that
/// also reference the college force both sources; with no signal either way
/// a college bot stays local.
pub fn route_sources(query: &str) -> SourceRoute {
    let q = query.to_lowercase();
    let tokens: Vec<&str> = q
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let is_local = LOCAL_KEYWORDS.iter().any(|k| matches_keyword(&q, &tokens, k));
    let is_web = WEB_KEYWORDS.iter().any(|k| matches_keyword(&q, &tokens, k));

    let is_hybrid = HYBRID_KEYWORDS.iter().any(|k| matches_keyword(&q, &tokens, k));
    if is_hybrid && (is_local || tokens.contains(&"our") || tokens.contains(&"us")) {
        return SourceRoute::Hybrid;
    }

    match (is_local, is_web) {
        (true, false) => SourceRoute::Local,
        (false, true) => SourceRoute::Web,
        (true, true) => SourceRoute::Hybrid,
        (false, false) => SourceRoute::Local,
    }
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub text: String,
    pub confidence: f32,
    pub confident: bool,
}

impl RagAnswer {
    fn rejected(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            confident: false,
        }
    }
}

pub struct RagPipeline<'a> {
    chunks: &'a ChunkStore,
    embedder: &'a dyn EmbeddingModel,
    generator: Option<&'a dyn AnswerGenerator>,
    web: &'a WebSearch,
    thresholds: &'a ThresholdConfig,
    history_config: &'a HistoryConfig,
    audit: &'a AuditLog,
    timeout: Duration,
}

impl<'a> RagPipeline<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chunks: &'a ChunkStore,
        embedder: &'a dyn EmbeddingModel,
        generator: Option<&'a dyn AnswerGenerator>,
        web: &'a WebSearch,
        thresholds: &'a ThresholdConfig,
        history_config: &'a HistoryConfig,
        audit: &'a AuditLog,
        timeout: Duration,
    ) -> Self {
        Self {
            chunks,
            embedder,
            generator,
            web,
            thresholds,
            history_config,
            audit,
            timeout,
        }
    }

    pub async fn answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
        query_id: &str,
    ) -> RagAnswer {
        match self.try_answer(query, history, query_id).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(query_id = query_id, error = %e, "RAG strategy failed");
                self.audit.record(AuditEvent::Error {
                    query_id: query_id.to_string(),
                    timestamp: now_ts(),
                    stage: "rag_generation".to_string(),
                    kind: "RAG_ERROR".to_string(),
                    message: e.to_string(),
                });
                RagAnswer::rejected(SYSTEM_ERROR_MESSAGE, 0.0)
            }
        }
    }

    async fn try_answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
        query_id: &str,
    ) -> Result<RagAnswer> {
        let recent = bounded_history(history, self.history_config.max_turns);
        let route = route_sources(query);
        tracing::info!(query_id = query_id, route = ?route, turns = recent.len(), "RAG route decided");

        let (hits, retrieval_confidence) = if route == SourceRoute::Web {
            (Vec::new(), 0.0)
        } else {
            self.retrieve(query, query_id)?
        };
        let local_ok =
            !hits.is_empty() && retrieval_confidence >= self.thresholds.rag_min_confidence;

        let web_context = if route == SourceRoute::Local {
            String::new()
        } else {
            match tokio::time::timeout(self.timeout, self.web.search_context(query)).await {
                Ok(context) => context,
                Err(_) => {
                    tracing::warn!(query_id = query_id, "Web search timed out");
                    String::new()
                }
            }
        };

        match route {
            SourceRoute::Local => {
                if hits.is_empty() {
                    self.reject(query_id, "No documents retrieved", 0.0);
                    return Ok(RagAnswer::rejected(NO_INFO_MESSAGE, 0.0));
                }
                if !local_ok {
                    self.reject(query_id, "Low retrieval confidence", retrieval_confidence);
                    return Ok(RagAnswer::rejected(LOW_CONFIDENCE_MESSAGE, retrieval_confidence));
                }

                let context = self.assemble_context(&hits);
                let text = self
                    .synthesize(query, recent, &context, hits.first(), retrieval_confidence)
                    .await;
                self.record_generation(query_id, &text, retrieval_confidence, &hits);
                Ok(RagAnswer {
                    text,
                    confidence: retrieval_confidence,
                    confident: true,
                })
            }

            SourceRoute::Web => {
                if web_context.is_empty() {
                    self.reject(query_id, "No web information available", 0.0);
                    return Ok(RagAnswer::rejected(NO_INFO_MESSAGE, 0.0));
                }
                let text = self
                    .synthesize(query, recent, &web_context, None, WEB_CONFIDENCE)
                    .await;
                self.record_generation(query_id, &text, WEB_CONFIDENCE, &[]);
                Ok(RagAnswer {
                    text,
                    confidence: WEB_CONFIDENCE,
                    confident: true,
                })
            }

            SourceRoute::Hybrid => {
                if !local_ok && web_context.is_empty() {
                    self.reject(query_id, "No local or web information", retrieval_confidence);
                    return Ok(RagAnswer::rejected(NO_INFO_MESSAGE, retrieval_confidence));
                }

                let local_section = if local_ok {
                    self.assemble_context(&hits)
                } else {
                    "No local information found.".to_string()
                };
                let web_section = if web_context.is_empty() {
                    "No web information found.".to_string()
                } else {
                    web_context
                };
                let context = format!(
                    "=== LOCAL COLLEGE KNOWLEDGE ===\n{}\n\n=== WEB KNOWLEDGE ===\n{}",
                    local_section, web_section
                );

                let confidence = if local_ok { retrieval_confidence } else { WEB_CONFIDENCE };
                let best = if local_ok { hits.first() } else { None };
                let text = self.synthesize(query, recent, &context, best, confidence).await;
                self.record_generation(query_id, &text, confidence, &hits);
                Ok(RagAnswer {
                    text,
                    confidence,
                    confident: true,
                })
            }
        }
    }

    /// Top-k chunk retrieval with distance-to-confidence conversion. An
    /// empty or missing index degrades to no hits; bad ordinals are skipped.
    fn retrieve(&self, query: &str, query_id: &str) -> Result<(Vec<DocumentChunk>, f32)> {
        let bucket = self.chunks.bucket();
        if bucket.chunks.is_empty() {
            tracing::warn!(query_id = query_id, "Chunk index not available");
            return Ok((Vec::new(), 0.0));
        }

        let query_vector = self.embedder.embed_query(query)?;
        let (distances, ordinals) = bucket
            .index
            .search(&query_vector, self.thresholds.rag_top_k)?;

        let valid: Vec<(f32, usize)> = distances
            .iter()
            .zip(&ordinals)
            .filter(|(_, &ordinal)| ordinal < bucket.chunks.len())
            .map(|(&distance, &ordinal)| (distance, ordinal))
            .collect();

        if valid.is_empty() {
            tracing::info!(query_id = query_id, "No valid chunks retrieved");
            return Ok((Vec::new(), 0.0));
        }

        let best_confidence = similarity_from_distance(valid[0].0);
        self.audit.record(AuditEvent::RetrievalQuality {
            query_id: query_id.to_string(),
            timestamp: now_ts(),
            strategy: StrategyKind::Rag,
            top_k: self.thresholds.rag_top_k,
            distances: valid.iter().map(|(d, _)| *d).collect(),
            best_similarity: best_confidence,
            passed_threshold: best_confidence >= self.thresholds.rag_min_confidence,
            threshold: self.thresholds.rag_min_confidence,
            retrieved: valid.len(),
        });

        let chunks = valid
            .iter()
            .map(|(_, ordinal)| bucket.chunks[*ordinal].clone())
            .collect();
        Ok((chunks, best_confidence))
    }

    /// Concatenate retrieved chunks, each tagged with its source, greedily in
    /// rank order up to the character budget.
    fn assemble_context(&self, hits: &[DocumentChunk]) -> String {
        let budget = self.history_config.max_context_chars_per_turn * self.thresholds.rag_top_k;
        let mut parts = Vec::new();
        let mut total = 0;

        for chunk in hits {
            let block = format!("[Source: {}, Chunk {}]\n{}", chunk.source, chunk.index, chunk.text);
            if total + block.chars().count() > budget {
                break;
            }
            total += block.chars().count();
            parts.push(block);
        }

        parts.join("\n\n---\n\n")
    }

    /// Ask the generator for a structured record and render it; fall back to
    /// an extractive answer from the best chunk (or a clipped context
    /// passthrough when there is no chunk at all).
    async fn synthesize(
        &self,
        query: &str,
        history: &[ConversationTurn],
        context: &str,
        best_chunk: Option<&DocumentChunk>,
        confidence: f32,
    ) -> String {
        if let Some(generator) = self.generator {
            let prompt = build_prompt(query, history, context);
            match tokio::time::timeout(self.timeout, generator.generate(RECORD_INSTRUCTIONS, &prompt))
                .await
            {
                Ok(Ok(raw)) => {
                    if let Some(text) = parse_record(&raw).and_then(|r| render_record(&r)) {
                        return match best_chunk {
                            Some(chunk) => format!(
                                "{}\n\n**Source:** {} (Chunk {})",
                                text, chunk.source, chunk.index
                            ),
                            None => text,
                        };
                    }
                    tracing::warn!("Generator output unparseable, using extractive fallback");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Generation failed, using extractive fallback");
                }
                Err(_) => {
                    tracing::warn!("Generation timed out, using extractive fallback");
                }
            }
        }

        match best_chunk {
            Some(chunk) => extractive_answer(chunk, confidence),
            None => clip_chars(context, self.history_config.max_context_chars_per_turn),
        }
    }

    fn reject(&self, query_id: &str, reason: &str, score: f32) {
        self.audit.record(AuditEvent::AnswerRejection {
            query_id: query_id.to_string(),
            timestamp: now_ts(),
            strategy: StrategyKind::Rag,
            reason: reason.to_string(),
            score: Some(score),
            threshold: Some(self.thresholds.rag_min_confidence),
        });
    }

    fn record_generation(
        &self,
        query_id: &str,
        text: &str,
        confidence: f32,
        hits: &[DocumentChunk],
    ) {
        let mut sources: Vec<String> = hits.iter().map(|c| c.source.clone()).collect();
        sources.dedup();
        self.audit.record(AuditEvent::AnswerGeneration {
            query_id: query_id.to_string(),
            timestamp: now_ts(),
            strategy: StrategyKind::Rag,
            answer_chars: text.chars().count(),
            confidence,
            sources,
        });
    }
}

fn build_prompt(query: &str, history: &[ConversationTurn], context: &str) -> String {
    let mut parts = Vec::new();
    for turn in history {
        parts.push(format!("User: {}\nAssistant: {}", turn.user, turn.assistant));
    }
    parts.push(format!("Context:\n{}\n\nQuestion: {}\nJSON:", context, query));
    parts.join("\n\n")
}

/// Extract the first few sentences of the best chunk and attach the source
/// citation and a confidence label.
fn extractive_answer(chunk: &DocumentChunk, confidence: f32) -> String {
    let sentences: Vec<&str> = chunk
        .text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(3)
        .collect();

    let body = if sentences.is_empty() {
        chunk.text.trim().to_string()
    } else {
        format!("{}.", sentences.join(". "))
    };

    let level = if confidence >= 0.75 {
        "High"
    } else if confidence >= 0.5 {
        "Medium"
    } else {
        "Low"
    };

    format!(
        "{}\n\n**Source:** {} (Chunk {})\n\n---\n**Confidence:** {}\n\n\
         _For more information, contact Student Services or visit the college website._",
        body, chunk.source, chunk.index, level
    )
}

fn clip_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect::<String>().trim().to_string()
}
