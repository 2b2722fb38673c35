use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    application::dtos::{HealthStatusResponse, IngestDocumentRequest, IngestReport, IngestSummary},
    domain::{DomainError, StoredDocument},
};

use super::answer_service::{EmbeddingEngine, ServiceConfig, VectorStore};

const MAX_DOCUMENT_CHARS: usize = 16_000;

/// Populates the knowledge base collection and reports on its state.
pub struct KnowledgeService {
    embedder: Arc<dyn EmbeddingEngine>,
    store: Arc<dyn VectorStore>,
    collection: String,
    config: ServiceConfig,
}

impl KnowledgeService {
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
            config,
        }
    }

    /// Embeds the raw document text and writes it to the collection.
    pub fn ingest(&self, payload: IngestDocumentRequest) -> Result<IngestSummary, DomainError> {
        let text = payload.text.trim();
        if text.is_empty() {
            return Err(DomainError::validation("document text is required"));
        }
        let chars = text.chars().count();
        if chars > MAX_DOCUMENT_CHARS {
            return Err(DomainError::validation(format!(
                "document cannot exceed {MAX_DOCUMENT_CHARS} characters"
            )));
        }

        let vector = self.embedder.embed(&self.config.embedding_model, text)?;
        if vector.is_empty() {
            return Err(DomainError::embedding("provider returned an empty vector"));
        }

        let document = StoredDocument::new(text, payload.source, vector);
        self.store.persist(&document)?;

        debug!(target: "kcc::ingest", id = %document.id, chars, "document stored");

        Ok(IngestSummary {
            id: document.id,
            chars,
            dimensions: document.dims(),
        })
    }

    /// Ingests every request, skipping rejected entries. Storage and
    /// embedding failures abort the run.
    pub fn ingest_batch(
        &self,
        requests: impl IntoIterator<Item = IngestDocumentRequest>,
    ) -> Result<IngestReport, DomainError> {
        let mut report = IngestReport::default();

        for (position, request) in requests.into_iter().enumerate() {
            match self.ingest(request) {
                Ok(_) => report.ingested += 1,
                Err(DomainError::Validation(reason)) => {
                    warn!(target: "kcc::ingest", position, %reason, "skipping document");
                    report.skipped.push((position, reason));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(report)
    }

    pub fn document_count(&self) -> Result<usize, DomainError> {
        self.store.count()
    }

    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.embedder.dims(self.config.embedding_model())
    }

    pub fn health(&self) -> Result<HealthStatusResponse, DomainError> {
        self.store.ping()?;
        let count = self.store.count()?;

        let message = if count == 0 {
            "collection is empty; every question will use web search".to_string()
        } else {
            "ready".to_string()
        };

        let dimensions = self
            .embedding_dimensions()
            .map(|dims| dims.to_string())
            .unwrap_or_else(|| "unknown".into());

        Ok(HealthStatusResponse {
            ok: true,
            message,
            details: Some(format!(
                "collection: {}, documents: {}, model: {}, dimensions: {}",
                self.collection, count, self.config.embedding_model, dimensions
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RetrievedDocument;
    use crate::infrastructure::SimpleEmbedEngine;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        documents: Mutex<Vec<StoredDocument>>,
    }

    impl VectorStore for MemoryStore {
        fn query(&self, _vector: &[f32], _limit: usize) -> Result<Vec<RetrievedDocument>, DomainError> {
            Ok(Vec::new())
        }

        fn persist(&self, document: &StoredDocument) -> Result<(), DomainError> {
            self.documents.lock().push(document.clone());
            Ok(())
        }

        fn count(&self) -> Result<usize, DomainError> {
            Ok(self.documents.lock().len())
        }

        fn ping(&self) -> Result<(), DomainError> {
            Ok(())
        }
    }

    fn service(store: Arc<MemoryStore>) -> KnowledgeService {
        KnowledgeService::new(
            Arc::new(SimpleEmbedEngine::default()),
            store,
            "kcc_farm_qa",
            ServiceConfig::default(),
        )
    }

    fn request(text: &str) -> IngestDocumentRequest {
        IngestDocumentRequest {
            text: text.into(),
            source: Some("kcc".into()),
        }
    }

    #[test]
    fn ingest_embeds_and_persists_trimmed_text() {
        let store = Arc::new(MemoryStore::default());
        let summary = service(store.clone())
            .ingest(request("  Spray mancozeb for leaf blight.  "))
            .unwrap();

        assert_eq!(summary.dimensions, 256);
        let stored = store.documents.lock();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "Spray mancozeb for leaf blight.");
        assert_eq!(stored[0].source.as_deref(), Some("kcc"));
    }

    #[test]
    fn ingest_rejects_blank_and_oversized_documents() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store);

        assert!(matches!(
            svc.ingest(request("   ")),
            Err(DomainError::Validation(_))
        ));
        let huge = "a".repeat(MAX_DOCUMENT_CHARS + 1);
        assert!(matches!(
            svc.ingest(request(&huge)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn batch_reports_skipped_positions() {
        let store = Arc::new(MemoryStore::default());
        let report = service(store.clone())
            .ingest_batch(vec![request("wheat sowing time"), request(""), request("paddy")])
            .unwrap();

        assert_eq!(report.ingested, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, 1);
        assert_eq!(store.documents.lock().len(), 2);
    }

    #[test]
    fn health_flags_empty_collection() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store);

        let status = svc.health().unwrap();
        assert!(status.ok);
        assert!(status.message.contains("empty"));
        let details = status.details.unwrap();
        assert!(details.contains("kcc_farm_qa"));
        assert!(details.contains("dimensions: 256"));
    }
}
