//! Retrieval-augmented question answering.
//!
//! [`QaPipeline`] retrieves the `top_k` chunks most similar to a question,
//! renders them into a prompt, and asks a [`CompletionProvider`] for the
//! final answer. The response carries the retrieved context and one
//! [`Evidence`] entry per chunk, in retrieval order, so callers can cite
//! sources.
//!
//! Retrieval is deterministic for a fixed index and embedder; the answer
//! text is not, since it comes from a generative model.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::benchmark::{AnswerResult, AnswerSystem};
use crate::collection::VectorCollection;
use crate::completion::CompletionProvider;
use crate::error::{HarnessError, Result};
use crate::models::{Metadata, SearchResult};

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 2;

/// Canonical answer when nothing relevant was retrieved.
pub const NOT_AVAILABLE_ANSWER: &str =
    "I don't have information about that in the knowledge base.";

/// Prompt used by [`QaPipeline`] unless another template is supplied.
pub const DEFAULT_PROMPT: &str = "You are a helpful assistant for a software development team. \
Use the following context to answer the question. \
If you don't know the answer, just say you don't know. \
If the context does not contain the answer, reply exactly: \
\"I don't have information about that in the knowledge base.\" \
Always mention the source of your information.\n\n\
Context:\n{context}\n\n\
Question: {question}\n\n\
Answer:";

/// A prompt with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in ["{context}", "{question}"] {
            if !template.contains(placeholder) {
                return Err(HarnessError::validation(format!(
                    "prompt template is missing the {} placeholder",
                    placeholder
                )));
            }
        }
        Ok(Self { template })
    }

    /// Fill in the placeholders. Text inside `context` is never
    /// re-interpreted as a placeholder.
    pub fn render(&self, context: &str, question: &str) -> String {
        self.template
            .split("{context}")
            .map(|part| part.replace("{question}", question))
            .collect::<Vec<_>>()
            .join(context)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// One chunk handed to the model as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub content: String,
    /// `1 - cosine distance`, clamped to `[0, 1]`. Opposed vectors score 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

fn relevance(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Citation data derived from a retrieved chunk's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Id of the source document (`original_id` for chunks).
    pub source_id: String,
    /// Human-readable source: `source`, `title` or `url` metadata.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    /// Chunk length in characters.
    pub chunk_size: usize,
}

impl Evidence {
    pub fn from_hit(hit: &SearchResult) -> Self {
        let source_id = meta_string(&hit.metadata, "original_id").unwrap_or_else(|| hit.id.clone());
        let source = ["source", "title", "url"]
            .iter()
            .find_map(|key| meta_string(&hit.metadata, key))
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            source_id,
            source,
            page: meta_string(&hit.metadata, "page"),
            chunk_size: hit.content.chars().count(),
        }
    }
}

fn meta_string(metadata: &Metadata, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The pipeline's answer plus everything it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResponse {
    pub question: String,
    pub answer: String,
    pub retrieved_context: Vec<RetrievedChunk>,
    pub evidence: Vec<Evidence>,
    /// RFC 3339 time the answer was produced.
    pub timestamp: String,
}

/// Retrieval plus generation over one collection.
pub struct QaPipeline {
    name: String,
    collection: Arc<VectorCollection>,
    completion: Arc<dyn CompletionProvider>,
    top_k: usize,
    template: PromptTemplate,
}

impl QaPipeline {
    pub fn new(collection: Arc<VectorCollection>, completion: Arc<dyn CompletionProvider>) -> Self {
        Self {
            name: format!("RAG pipeline ({})", completion.model_name()),
            collection,
            completion,
            top_k: DEFAULT_TOP_K,
            template: PromptTemplate::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer one question.
    ///
    /// Blank questions are rejected before any retrieval. When retrieval
    /// finds nothing, the canonical [`NOT_AVAILABLE_ANSWER`] is returned
    /// without calling the model.
    pub async fn ask(&self, question: &str) -> Result<QaResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(HarnessError::validation("question must be non-empty"));
        }

        let hits = self.collection.search(question, self.top_k, None).await?;
        debug!(hits = hits.len(), "Retrieved context");

        let retrieved_context: Vec<RetrievedChunk> = hits
            .iter()
            .map(|hit| RetrievedChunk {
                chunk_id: hit.id.clone(),
                content: hit.content.clone(),
                relevance_score: Some(relevance(hit.distance)),
            })
            .collect();
        let evidence: Vec<Evidence> = hits.iter().map(Evidence::from_hit).collect();

        let answer = if hits.is_empty() {
            NOT_AVAILABLE_ANSWER.to_string()
        } else {
            let context = format_context(&hits);
            let prompt = self.template.render(&context, question);
            self.completion.complete(&prompt).await?.trim().to_string()
        };

        Ok(QaResponse {
            question: question.to_string(),
            answer,
            retrieved_context,
            evidence,
            timestamp: Utc::now().to_rfc3339(),
        })
    }
}

/// Join retrieved chunks into the prompt's context block.
pub fn format_context(hits: &[SearchResult]) -> String {
    hits.iter()
        .map(|hit| {
            let evidence = Evidence::from_hit(hit);
            format!("[Source: {}]\n{}", evidence.source, hit.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl AnswerSystem for QaPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    async fn answer(&self, query: &str) -> Result<AnswerResult> {
        let response = self.ask(query).await?;
        let details = serde_json::to_value(&response).ok();
        Ok(AnswerResult {
            answer: response.answer,
            details,
        })
    }
}
