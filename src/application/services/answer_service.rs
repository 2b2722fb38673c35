use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    application::{
        dtos::{AnswerResponse, AskRequest},
        prompts::PromptBuilder,
    },
    domain::{
        AnswerSource, ChatMessage, DomainError, RetrievalPolicy, RetrievedDocument,
        StoredDocument, WebSnippet,
    },
};

/// High level configuration shared by the services and their adapters.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub embedding_model: String,
    pub policy: RetrievalPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            embedding_model: "kcc/simple-hash".into(),
            policy: RetrievalPolicy::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(embedding_model: impl Into<String>, policy: RetrievalPolicy) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            policy,
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

/// Abstraction over any embedding engine (hashing, Ollama, FastEmbed, ...).
pub trait EmbeddingEngine: Send + Sync {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError>;

    fn dims(&self, _model: &str) -> Option<usize> {
        None
    }
}

/// Contract for the knowledge base collection.
pub trait VectorStore: Send + Sync {
    /// Nearest `limit` documents, closest first.
    fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<RetrievedDocument>, DomainError>;

    fn persist(&self, document: &StoredDocument) -> Result<(), DomainError>;

    fn count(&self) -> Result<usize, DomainError>;

    fn ping(&self) -> Result<(), DomainError>;
}

/// Live internet search used when the knowledge base has nothing relevant.
pub trait WebSearchProvider: Send + Sync {
    /// Snippets in provider relevance order, at most `max_results`.
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSnippet>, DomainError>;
}

/// Chat-completion capable language model.
pub trait ChatModel: Send + Sync {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, DomainError>;

    fn model_name(&self) -> &str;
}

/// Retrieval-with-fallback coordinator: embeds the framed question, filters
/// store hits by distance, falls back to web search, and asks the model.
pub struct AnswerService {
    embedder: Arc<dyn EmbeddingEngine>,
    store: Arc<dyn VectorStore>,
    web: Arc<dyn WebSearchProvider>,
    chat: Arc<dyn ChatModel>,
    prompts: PromptBuilder,
    config: ServiceConfig,
}

impl AnswerService {
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        store: Arc<dyn VectorStore>,
        web: Arc<dyn WebSearchProvider>,
        chat: Arc<dyn ChatModel>,
        config: ServiceConfig,
    ) -> Self {
        let prompts = PromptBuilder::new(config.policy.answer_language.clone());
        Self {
            embedder,
            store,
            web,
            chat,
            prompts,
            config,
        }
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.config.policy
    }

    /// Answers `query` from at most `top_k` knowledge base documents.
    ///
    /// Embedding and search failures are returned as errors. A failed
    /// completion is not: it comes back as `Ok("Error: ...")`.
    pub fn answer(&self, query: &str, top_k: usize) -> Result<String, DomainError> {
        self.ask(AskRequest::new(query).with_top_k(top_k))
            .map(|response| response.answer)
    }

    pub fn ask(&self, request: AskRequest) -> Result<AnswerResponse, DomainError> {
        let top_k = request.top_k.unwrap_or(self.config.policy.default_top_k);
        let query = request.query;

        let documents = self.retrieve(&query, top_k)?;

        let (source, context_items, prompt) = if documents.is_empty() {
            let snippets = self.fallback_search(&query)?;
            info!(
                target: "kcc::answer",
                snippets = snippets.len(),
                "no knowledge base match, answering from web search"
            );
            (
                AnswerSource::WebSearch,
                snippets.len(),
                self.prompts.fallback(&query, &snippets),
            )
        } else {
            info!(
                target: "kcc::answer",
                documents = documents.len(),
                "answering from local knowledge base"
            );
            (
                AnswerSource::LocalKnowledgeBase,
                documents.len(),
                self.prompts.local(&query, &documents),
            )
        };

        let answer = self.complete(prompt);

        Ok(AnswerResponse {
            query,
            source,
            context_items,
            answer,
        })
    }

    /// Embeds the framed question and returns the documents that pass the
    /// distance filter, closest first.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>, DomainError> {
        if top_k == 0 {
            return Err(DomainError::validation("top_k must be at least 1"));
        }

        let policy = &self.config.policy;
        let framed = policy.frame_query(query);

        let vector = self
            .embedder
            .embed(&self.config.embedding_model, &framed)?;
        if vector.is_empty() {
            return Err(DomainError::embedding("provider returned an empty vector"));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(DomainError::embedding(
                "provider returned non-finite vector components",
            ));
        }

        let candidates = self
            .store
            .query(&vector, policy.fetch_count(top_k))
            .map_err(DomainError::into_search)?;
        let fetched = candidates.len();
        let selected = policy.select(candidates, top_k);

        debug!(
            target: "kcc::answer",
            fetched,
            kept = selected.len(),
            threshold = policy.distance_threshold,
            "filtered knowledge base candidates"
        );

        Ok(selected)
    }

    /// Web search with the original, unframed question.
    pub fn fallback_search(&self, query: &str) -> Result<Vec<WebSnippet>, DomainError> {
        let max_results = self.config.policy.web_results;
        let mut snippets = self
            .web
            .search(query, max_results)
            .map_err(DomainError::into_search)?;
        snippets.truncate(max_results);
        Ok(snippets)
    }

    fn complete(&self, prompt: String) -> String {
        let messages = [ChatMessage::user(prompt)];
        match self.chat.complete(&messages) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    target: "kcc::answer",
                    model = self.chat.model_name(),
                    error = %err,
                    "completion failed"
                );
                match err {
                    DomainError::Completion(msg) => format!("Error: {msg}"),
                    other => format!("Error: {other}"),
                }
            }
        }
    }
}
