//! Service layer orchestrating domain operations and infrastructure adapters.

mod answer_service;
mod knowledge_service;

pub use answer_service::{
    AnswerService, ChatModel, EmbeddingEngine, ServiceConfig, VectorStore, WebSearchProvider,
};
pub use knowledge_service::KnowledgeService;
