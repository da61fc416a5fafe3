//! Chat engine: retrieval-augmented answers from the hosted model.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::ai::{CompletionRequest, OpenAIClient};
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::error::ChatError;
use crate::index::VectorIndex;
use crate::state::{ChatResponse, SourceRef};

/// Rough chars-per-token ratio used to budget the context window.
const CHARS_PER_TOKEN: usize = 4;

/// Tokens kept free in the context window for the model's answer.
const DEFAULT_NUM_OUTPUT: usize = 256;

const CONTEXT_HEADER: &str = "Context information is below.\n---------------------\n";
const CONTEXT_FOOTER: &str = "\n---------------------\n\
Given the context information and not prior knowledge, answer the query.\nQuery: ";
const ANSWER_SUFFIX: &str = "\nAnswer: ";

/// Anything that can turn a query into a reply.
#[async_trait]
pub trait ChatEngine: Send + Sync {
    async fn chat(&self, query: &str) -> Result<ChatResponse, ChatError>;
}

/// Model and retrieval settings for [`RagChatEngine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub model: String,
    pub temperature: f32,
    pub context_window: usize,
    pub num_output: usize,
    pub similarity_top_k: usize,
    pub system_prompt: String,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            context_window: config.context_window,
            num_output: DEFAULT_NUM_OUTPUT,
            similarity_top_k: config.similarity_top_k,
            system_prompt: config.system_prompt.clone(),
        }
    }
}

/// Retrieves the closest index nodes for a query and asks the hosted model to
/// answer with them as context.
pub struct RagChatEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    client: OpenAIClient,
    settings: EngineSettings,
}

impl RagChatEngine {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        client: OpenAIClient,
        settings: EngineSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            client,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Tokens left for the query once the system prompt, the template and
    /// the answer are accounted for.
    fn query_budget(&self) -> usize {
        self.settings.context_window.saturating_sub(
            estimate_tokens(&self.settings.system_prompt)
                + estimate_tokens(CONTEXT_HEADER)
                + estimate_tokens(CONTEXT_FOOTER)
                + estimate_tokens(ANSWER_SUFFIX)
                + self.settings.num_output,
        )
    }

    fn build_prompt(&self, query: &str, chunks: &[&str]) -> String {
        let overhead = estimate_tokens(&self.settings.system_prompt)
            + estimate_tokens(query)
            + estimate_tokens(CONTEXT_HEADER)
            + estimate_tokens(CONTEXT_FOOTER)
            + estimate_tokens(ANSWER_SUFFIX)
            + self.settings.num_output;
        let budget = self.settings.context_window.saturating_sub(overhead);
        if budget == 0 {
            warn!(
                context_window = self.settings.context_window,
                overhead, "query leaves no room for retrieved context"
            );
        }

        let context = pack_context(chunks, budget);
        if context.is_empty() {
            return query.to_string();
        }
        format!("{CONTEXT_HEADER}{context}{CONTEXT_FOOTER}{query}{ANSWER_SUFFIX}")
    }
}

#[async_trait]
impl ChatEngine for RagChatEngine {
    async fn chat(&self, query: &str) -> Result<ChatResponse, ChatError> {
        let budget = self.query_budget();
        let query = if budget > 0 { fit_query(query, budget) } else { query };
        let query_vec = self.embedder.embed(query).await?;
        let hits = self.index.search(&query_vec, self.settings.similarity_top_k)?;

        for (node, score) in &hits {
            debug!(node_id = %node.id, score, source = ?node.source, "retrieved node");
        }

        let chunks: Vec<&str> = hits.iter().map(|(node, _)| node.text.as_str()).collect();
        let prompt = self.build_prompt(query, &chunks);

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            system_prompt: Some(self.settings.system_prompt.clone()),
            user_prompt: prompt,
            temperature: self.settings.temperature,
            max_tokens: None,
        };
        let text = self.client.complete(&request).await?;

        Ok(ChatResponse {
            text,
            sources: hits
                .into_iter()
                .map(|(node, score)| SourceRef {
                    node_id: node.id.clone(),
                    score,
                })
                .collect(),
        })
    }
}

/// Estimated token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// The tail of `query` that fits in `max_tokens`. A composite query ends with
/// the latest turn, so the oldest history goes first.
pub fn fit_query(query: &str, max_tokens: usize) -> &str {
    if estimate_tokens(query) <= max_tokens {
        return query;
    }

    let keep = max_tokens * CHARS_PER_TOKEN;
    let skip = query.chars().count().saturating_sub(keep);
    let start = query
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(query.len());
    debug!(
        dropped_chars = skip,
        kept_chars = keep,
        "query trimmed to fit the context window"
    );
    &query[start..]
}

/// Join chunks, best first, until `budget_tokens` is spent. The chunk that
/// crosses the budget is cut on a char boundary; later chunks are dropped.
pub fn pack_context(chunks: &[&str], budget_tokens: usize) -> String {
    let mut packed = String::new();
    let mut remaining = budget_tokens;

    for chunk in chunks {
        let separator = if packed.is_empty() { 0 } else { 1 };
        let cost = estimate_tokens(chunk) + separator;

        if cost <= remaining {
            if separator > 0 {
                packed.push_str("\n\n");
            }
            packed.push_str(chunk);
            remaining -= cost;
            continue;
        }

        let room = remaining.saturating_sub(separator) * CHARS_PER_TOKEN;
        if room > 0 {
            if separator > 0 {
                packed.push_str("\n\n");
            }
            packed.extend(chunk.chars().take(room));
        }
        break;
    }

    packed
}
