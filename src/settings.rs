use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::RetrievalPolicy;
use crate::infrastructure::embeddings::{DEFAULT_SIMPLE_DIMENSIONS, DEFAULT_SIMPLE_MODEL};
use crate::infrastructure::http_client::{DEFAULT_OLLAMA_HOST, DEFAULT_SEARCH_ENDPOINT};
use crate::infrastructure::DistanceMetric;

/// Default filename used to persist configuration within the data directory.
const CONFIG_FILENAME: &str = "config.json";

pub const DEFAULT_COLLECTION: &str = "kcc_farm_qa";

/// Embedding backends compiled into the binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Deterministic hash embedder (always available, offline).
    Simple {
        #[serde(default = "default_simple_model")]
        model: String,
        #[serde(default = "default_simple_dim")]
        dimensions: usize,
    },
    /// Embedding model served by the Ollama instance in `chat.host`.
    Ollama {
        #[serde(default = "default_ollama_embed_model")]
        model: String,
    },
    /// Local ONNX sentence transformer via FastEmbed (feature gated).
    #[cfg(feature = "fastembed-engine")]
    FastEmbed {
        #[serde(default = "default_fastembed_model")]
        model: String,
    },
}

impl EmbeddingBackend {
    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingBackend::Simple { .. } => "simple",
            EmbeddingBackend::Ollama { .. } => "ollama",
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { .. } => "fast-embed",
        }
    }

    /// Caveat for backends whose vectors the default `distance_threshold`
    /// was not tuned against.
    pub fn threshold_note(&self) -> Option<&'static str> {
        match self {
            EmbeddingBackend::Simple { .. } => Some(
                "the simple hash embedder is not the sentence-transformer model the 0.8 distance threshold was tuned for; local-answer rates will differ, so tune `retrieval.distance_threshold` or enable the fastembed-engine feature",
            ),
            EmbeddingBackend::Ollama { .. } => Some(
                "the 0.8 distance threshold was tuned for all-mpnet-base-v2; tune `retrieval.distance_threshold` for this embedding model",
            ),
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { .. } => None,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            EmbeddingBackend::Simple { model, .. } => model,
            EmbeddingBackend::Ollama { model } => model,
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { model } => model,
        }
    }
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        #[cfg(feature = "fastembed-engine")]
        {
            EmbeddingBackend::FastEmbed {
                model: default_fastembed_model(),
            }
        }
        #[cfg(not(feature = "fastembed-engine"))]
        {
            EmbeddingBackend::Simple {
                model: default_simple_model(),
                dimensions: default_simple_dim(),
            }
        }
    }
}

/// Language model server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatSettings {
    pub host: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.into(),
            model: "gemma3:1b".into(),
            timeout_secs: 120,
        }
    }
}

impl ChatSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebSearchSettings {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SEARCH_ENDPOINT.into(),
            timeout_secs: 10,
        }
    }
}

impl WebSearchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Complete persisted configuration payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub embedding: EmbeddingBackend,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub distance: DistanceMetric,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub web_search: WebSearchSettings,
    #[serde(default)]
    pub retrieval: RetrievalPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingBackend::default(),
            collection: default_collection(),
            distance: DistanceMetric::default(),
            chat: ChatSettings::default(),
            web_search: WebSearchSettings::default(),
            retrieval: RetrievalPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Apply `KCC_OLLAMA_HOST` / `KCC_CHAT_MODEL` on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(host) = non_empty_env("KCC_OLLAMA_HOST") {
            self.chat.host = host;
        }
        if let Some(model) = non_empty_env("KCC_CHAT_MODEL") {
            self.chat.model = model;
        }
        self
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Thread-safe manager responsible for loading and persisting `AppConfig`.
pub struct ConfigManager {
    path: PathBuf,
    state: RwLock<AppConfig>,
}

impl ConfigManager {
    /// Create a manager rooted at `data_dir`. The JSON file lives at
    /// `<data_dir>/config.json`; a missing file means defaults.
    pub fn load(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = data_dir.as_ref().join(CONFIG_FILENAME);
        let config = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_else(|err| {
                warn!(
                    target: "kcc::config",
                    path = %path.display(),
                    error = %err,
                    "ignoring malformed config file, using defaults"
                );
                AppConfig::default()
            })
        } else {
            AppConfig::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> AppConfig {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Write the current configuration to disk.
    pub fn save(&self) -> std::io::Result<()> {
        let guard = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.persist_locked(&guard)
    }

    /// Ensure the backing directory exists and write the JSON payload.
    fn persist_locked(&self, config: &AppConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(config)?;
        fs::write(&self.path, payload)
    }
}

const fn default_simple_dim() -> usize {
    DEFAULT_SIMPLE_DIMENSIONS
}

fn default_simple_model() -> String {
    DEFAULT_SIMPLE_MODEL.to_string()
}

fn default_ollama_embed_model() -> String {
    "nomic-embed-text".to_string()
}

#[cfg(feature = "fastembed-engine")]
fn default_fastembed_model() -> String {
    crate::infrastructure::embeddings::DEFAULT_FASTEMBED_MODEL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reference_policy() {
        let config = AppConfig::default();
        assert_eq!(config.chat.model, "gemma3:1b");
        assert_eq!(config.distance, DistanceMetric::L2);
        assert_eq!(config.retrieval.distance_threshold, 0.8);
        assert_eq!(config.retrieval.overfetch_factor, 2);
        assert_eq!(config.retrieval.web_results, 2);
        assert_eq!(config.retrieval.default_top_k, 3);
    }

    #[test]
    fn hash_embedder_carries_threshold_note() {
        let simple = EmbeddingBackend::Simple {
            model: default_simple_model(),
            dimensions: default_simple_dim(),
        };
        let note = simple.threshold_note().expect("simple backend note");
        assert!(note.contains("distance_threshold"));

        #[cfg(not(feature = "fastembed-engine"))]
        assert!(AppConfig::default().embedding.threshold_note().is_some());
        #[cfg(feature = "fastembed-engine")]
        assert!(AppConfig::default().embedding.threshold_note().is_none());
    }

    #[test]
    fn missing_file_loads_defaults_and_save_round_trips() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::load(dir.path()).unwrap();
        assert_eq!(manager.current(), AppConfig::default());

        manager.save().unwrap();
        assert!(manager.path().exists());

        let reloaded = ConfigManager::load(dir.path()).unwrap();
        assert_eq!(reloaded.current(), manager.current());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"{
                "embedding": { "backend": "ollama" },
                "distance": "cosine",
                "retrieval": { "distance_threshold": 0.5 }
            }"#,
        )
        .unwrap();

        let config = ConfigManager::load(dir.path()).unwrap().current();
        assert_eq!(
            config.embedding,
            EmbeddingBackend::Ollama {
                model: "nomic-embed-text".into()
            }
        );
        assert_eq!(config.distance, DistanceMetric::Cosine);
        assert_eq!(config.retrieval.distance_threshold, 0.5);
        assert_eq!(config.retrieval.overfetch_factor, 2);
        assert_eq!(config.collection, DEFAULT_COLLECTION);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "{ not json").unwrap();

        let config = ConfigManager::load(dir.path()).unwrap().current();
        assert_eq!(config, AppConfig::default());
    }
}
