//! Infrastructure layer wiring concrete adapters (embeddings, storage, HTTP providers).

pub mod embeddings;
pub mod http_client;
pub mod storage;

#[cfg(feature = "fastembed-engine")]
pub use embeddings::FastEmbedEngine;
pub use embeddings::SimpleEmbedEngine;
pub use http_client::{
    check_service_availability, DuckDuckGoSearch, OllamaChatClient, OllamaEmbedEngine,
};
pub use storage::{CollectionStatus, DistanceMetric, SledVectorStore};
