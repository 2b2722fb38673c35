use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::AnswerSource;

/// A question coming from the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
    /// Falls back to the policy default when absent.
    #[serde(default)]
    pub top_k: Option<usize>,
}

impl AskRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Answer envelope returned to the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub query: String,
    pub source: AnswerSource,
    /// Number of context items (documents or snippets) placed in the prompt.
    pub context_items: usize,
    pub answer: String,
}

/// Payload accepted when populating the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocumentRequest {
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub id: Uuid,
    pub chars: usize,
    pub dimensions: usize,
}

/// Outcome of a batch ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub ingested: usize,
    /// Line/position and reason for every rejected entry.
    pub skipped: Vec<(usize, String)>,
}

/// Health/readiness report for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatusResponse {
    pub ok: bool,
    pub message: String,
    pub details: Option<String>,
}
