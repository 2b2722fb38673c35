use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder replaced by the user's question inside [`RetrievalPolicy::query_frame`].
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// One neighbour returned by the vector store for a query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    /// Smaller is more similar.
    pub distance: f32,
}

impl RetrievedDocument {
    pub fn new(text: impl Into<String>, distance: f32) -> Self {
        Self {
            text: text.into(),
            distance,
        }
    }
}

/// A single web search hit. Only `body` is fed to the language model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSnippet {
    pub title: String,
    pub body: String,
    pub url: Option<String>,
}

impl WebSnippet {
    pub fn from_body(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Chat-style message handed to the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Which retrieval route produced the context for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerSource {
    LocalKnowledgeBase,
    WebSearch,
}

impl AnswerSource {
    pub fn label(&self) -> &'static str {
        match self {
            AnswerSource::LocalKnowledgeBase => "By Local DB",
            AnswerSource::WebSearch => "By Internet Search",
        }
    }
}

/// Document persisted in the knowledge base collection by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: Uuid,
    pub text: String,
    pub source: Option<String>,
    pub embedding: Vec<f32>,
    pub ingested_at: DateTime<Utc>,
}

impl StoredDocument {
    pub fn new(text: impl Into<String>, source: Option<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            source: source
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            embedding,
            ingested_at: Utc::now(),
        }
    }

    pub fn dims(&self) -> usize {
        self.embedding.len()
    }
}

/// Tunable knobs of the retrieval-with-fallback decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalPolicy {
    pub default_top_k: usize,
    /// Documents at or beyond this distance are discarded.
    pub distance_threshold: f32,
    /// How many candidates to fetch per requested result.
    pub overfetch_factor: usize,
    /// Result cap for the web search fallback.
    pub web_results: usize,
    /// Domain framing applied to the question before embedding.
    pub query_frame: String,
    pub answer_language: String,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            default_top_k: 3,
            distance_threshold: 0.8,
            overfetch_factor: 2,
            web_results: 2,
            query_frame: "According to farming query: {query}".into(),
            answer_language: "English".into(),
        }
    }
}

impl RetrievalPolicy {
    /// Wraps the raw question in the configured domain frame.
    pub fn frame_query(&self, query: &str) -> String {
        if self.query_frame.contains(QUERY_PLACEHOLDER) {
            self.query_frame.replace(QUERY_PLACEHOLDER, query)
        } else if self.query_frame.trim().is_empty() {
            query.to_string()
        } else {
            format!("{} {}", self.query_frame.trim_end(), query)
        }
    }

    /// Number of neighbours requested from the store for `top_k` results.
    pub fn fetch_count(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.overfetch_factor.max(1))
    }

    /// Keeps documents strictly under the threshold, in store order, capped at `top_k`.
    pub fn select(&self, documents: Vec<RetrievedDocument>, top_k: usize) -> Vec<RetrievedDocument> {
        documents
            .into_iter()
            .filter(|doc| doc.distance.is_finite() && doc.distance < self.distance_threshold)
            .take(top_k)
            .collect()
    }
}
