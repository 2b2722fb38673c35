//! Application layer wiring DTOs, prompts and services.

pub mod dtos;
pub mod prompts;
pub mod services;

pub use dtos::{
    AnswerResponse, AskRequest, HealthStatusResponse, IngestDocumentRequest, IngestReport,
    IngestSummary,
};
pub use prompts::PromptBuilder;
pub use services::{AnswerService, KnowledgeService};
