use thiserror::Error;

/// Domain-level errors shared across application components.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The incoming payload missed a required field or violated invariants.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested entity was not found locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// Catch-all for storage-related failures we don't want to leak directly.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The embedding provider failed or returned a malformed vector.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector store query or the web search call failed.
    #[error("search failed: {0}")]
    Search(String),

    /// The language model call failed.
    #[error("completion failed: {0}")]
    Completion(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    pub fn completion(msg: impl Into<String>) -> Self {
        Self::Completion(msg.into())
    }

    /// Re-labels a vector store failure as a search failure, keeping the message.
    pub fn into_search(self) -> Self {
        match self {
            Self::Search(msg) => Self::Search(msg),
            other => Self::Search(other.to_string()),
        }
    }
}
