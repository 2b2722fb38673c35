use std::str::FromStr;

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use parking_lot::Mutex;

use crate::{application::services::EmbeddingEngine, domain::DomainError};

/// Sentence-transformer checkpoint the knowledge base was embedded with.
pub const DEFAULT_FASTEMBED_MODEL: &str = "Xenova/all-mpnet-base-v2";

/// Embedding engine backed by `fastembed`'s `TextEmbedding`.
///
/// The ONNX session is loaded once and kept behind a `Mutex` because
/// inference needs mutable access.
pub struct FastEmbedEngine {
    model_label: String,
    dimensions: usize,
    inner: Mutex<TextEmbedding>,
}

impl FastEmbedEngine {
    pub fn try_new(model_name: impl AsRef<str>) -> Result<Self, DomainError> {
        let label = model_name.as_ref().trim();
        if label.is_empty() {
            return Err(DomainError::validation(
                "fastembed model name cannot be empty",
            ));
        }

        let embedding_model = EmbeddingModel::from_str(label).map_err(|err| {
            DomainError::embedding(format!("failed to parse fastembed model `{label}`: {err}"))
        })?;

        let model_info = TextEmbedding::get_model_info(&embedding_model).map_err(|err| {
            DomainError::embedding(format!(
                "unable to read metadata for fastembed model `{label}`: {err}"
            ))
        })?;
        let dimensions = model_info.dim;

        let text_embedding = TextEmbedding::try_new(TextInitOptions::new(embedding_model))
            .map_err(|err| {
                DomainError::embedding(format!(
                    "failed to initialise fastembed model `{label}`: {err}"
                ))
            })?;

        Ok(Self {
            model_label: label.to_string(),
            dimensions,
            inner: Mutex::new(text_embedding),
        })
    }
}

impl EmbeddingEngine for FastEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if !model.eq_ignore_ascii_case(&self.model_label) {
            return Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model_label, model
            )));
        }

        let mut embedder = self.inner.lock();
        let vector = embedder
            .embed(vec![text], None)
            .map_err(|err| DomainError::embedding(format!("fastembed inference failed: {err}")))?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::embedding("fastembed returned no embedding"))?;

        if vector.len() != self.dimensions {
            return Err(DomainError::embedding(format!(
                "unexpected embedding dimension (expected {}, got {})",
                self.dimensions,
                vector.len()
            )));
        }

        Ok(vector)
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
