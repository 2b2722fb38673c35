//! Domain layer: core entities and value objects for the farming assistant.

pub mod errors;
pub mod models;

pub use errors::DomainError;
pub use models::{
    AnswerSource, ChatMessage, ChatRole, RetrievalPolicy, RetrievedDocument, StoredDocument,
    WebSnippet,
};
