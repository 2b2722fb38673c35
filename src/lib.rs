use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod settings;

use application::services::{
    ChatModel, EmbeddingEngine as EmbeddingEngineTrait, ServiceConfig, VectorStore,
    WebSearchProvider,
};
use application::{AnswerService, KnowledgeService};
#[cfg(feature = "fastembed-engine")]
use infrastructure::FastEmbedEngine;
use infrastructure::{
    check_service_availability, CollectionStatus, DuckDuckGoSearch, OllamaChatClient,
    OllamaEmbedEngine, SimpleEmbedEngine, SledVectorStore,
};
use settings::{AppConfig, ChatSettings, ConfigManager, EmbeddingBackend};

/// Long-lived handles built once at startup and shared by every request.
pub struct AppHandles {
    pub answers: Arc<AnswerService>,
    pub knowledge: Arc<KnowledgeService>,
    pub config: Arc<ConfigManager>,
    pub data_dir: PathBuf,
}

/// Entry point invoked from `main.rs`.
pub fn run() {
    init_tracing();

    if let Err(err) = interfaces::cli::run() {
        eprintln!("[kcc-chat] {err:?}");
        std::process::exit(1);
    }
}

pub fn init_tracing() {
    init_tracing_with_writer(std::io::stderr);
}

fn init_tracing_with_writer<W>(make_writer: fn() -> W)
where
    W: std::io::Write + Send + Sync + 'static,
{
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

    let _ = INIT.get_or_init(|| {
        let filter = std::env::var("KCC_LOG").unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(make_writer)
            .compact()
            .try_init();
    });
}

/// Build the providers and services from the config in the resolved data dir.
pub fn build_environment() -> Result<AppHandles> {
    let data_dir = resolve_data_dir()?;
    build_environment_at(data_dir)
}

pub fn build_environment_at(data_dir: impl AsRef<Path>) -> Result<AppHandles> {
    let data_dir = data_dir.as_ref().to_path_buf();
    std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;

    let config = Arc::new(ConfigManager::load(&data_dir).context("failed to load config file")?);
    let active = config.current().with_env_overrides();

    let store_path = data_dir.join("store");
    let store_impl = SledVectorStore::open(&store_path, &active.collection, active.distance)
        .map_err(|err| anyhow!(err.to_string()))
        .context("failed to open knowledge base")?;
    if store_impl.status() == CollectionStatus::Created {
        warn!(
            target: "kcc::store",
            collection = store_impl.collection(),
            "knowledge base collection was missing and has been created empty; ingest documents to enable local answers"
        );
    }
    let store: Arc<dyn VectorStore> = Arc::new(store_impl);

    let (embedder, service_config) = init_embedder(&active)
        .context("failed to initialise embedding backend")?;
    if let Some(note) = active.embedding.threshold_note() {
        info!(target: "kcc::config", embedding = active.embedding.id(), "{note}");
    }

    if !check_service_availability(&active.chat.host) {
        warn!(
            target: "kcc::http",
            host = %active.chat.host,
            "language model server not reachable yet; answers will report the error"
        );
    }

    let chat = init_chat(&active.chat);
    let web: Arc<dyn WebSearchProvider> = Arc::new(DuckDuckGoSearch::new(
        active.web_search.endpoint.clone(),
        active.web_search.timeout(),
    ));

    let answers = Arc::new(AnswerService::new(
        Arc::clone(&embedder),
        Arc::clone(&store),
        web,
        chat,
        service_config.clone(),
    ));
    let knowledge = Arc::new(KnowledgeService::new(
        embedder,
        store,
        active.collection.clone(),
        service_config,
    ));

    info!(
        target: "kcc::cli",
        data_dir = %data_dir.display(),
        collection = %active.collection,
        embedding = active.embedding.id(),
        chat_model = %active.chat.model,
        "environment ready"
    );

    Ok(AppHandles {
        answers,
        knowledge,
        config,
        data_dir,
    })
}

fn init_embedder(config: &AppConfig) -> Result<(Arc<dyn EmbeddingEngineTrait>, ServiceConfig)> {
    let backend = &config.embedding;
    let service_config = ServiceConfig::new(backend.model_name(), config.retrieval.clone());

    let engine: Arc<dyn EmbeddingEngineTrait> = match backend {
        EmbeddingBackend::Simple { model, dimensions } => Arc::new(
            SimpleEmbedEngine::try_new(model.clone(), *dimensions)
                .map_err(|err| anyhow!(err.to_string()))?,
        ),
        EmbeddingBackend::Ollama { model } => Arc::new(OllamaEmbedEngine::new(
            &config.chat.host,
            model.clone(),
            config.chat.timeout(),
        )),
        #[cfg(feature = "fastembed-engine")]
        EmbeddingBackend::FastEmbed { model } => {
            Arc::new(FastEmbedEngine::try_new(model).map_err(|err| anyhow!(err.to_string()))?)
        }
    };

    Ok((engine, service_config))
}

fn init_chat(settings: &ChatSettings) -> Arc<dyn ChatModel> {
    Arc::new(OllamaChatClient::new(
        &settings.host,
        settings.model.clone(),
        settings.timeout(),
    ))
}

/// `KCC_DATA_DIR` if set, otherwise the OS data directory.
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("KCC_DATA_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let dirs = directories::ProjectDirs::from("in", "kcc", "kcc-chat")
        .ok_or_else(|| anyhow!("unable to determine OS data dir"))?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::IngestDocumentRequest;
    use tempfile::tempdir;

    #[test]
    fn environment_bootstraps_with_defaults() {
        let dir = tempdir().unwrap();
        let handles = build_environment_at(dir.path()).unwrap();

        assert_eq!(handles.knowledge.document_count().unwrap(), 0);
        assert!(dir.path().join("store").exists());
        assert_eq!(
            handles.answers.policy(),
            &handles.config.current().retrieval
        );
    }

    #[test]
    fn ingested_documents_are_retrievable() {
        let dir = tempdir().unwrap();
        let handles = build_environment_at(dir.path()).unwrap();

        handles
            .knowledge
            .ingest(IngestDocumentRequest {
                text: "According to farming query: sugarcane red rot control".into(),
                source: None,
            })
            .unwrap();

        let docs = handles
            .answers
            .retrieve("sugarcane red rot control", 3)
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].distance < 1e-4);
    }

    #[test]
    fn retrieval_on_empty_collection_is_empty() {
        let dir = tempdir().unwrap();
        let handles = build_environment_at(dir.path()).unwrap();
        assert!(handles.answers.retrieve("rain", 3).unwrap().is_empty());
    }
}
