//! Ollama REST clients: `/api/chat` for completions and `/api/embeddings`
//! for vectors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    application::services::{ChatModel, EmbeddingEngine},
    domain::{ChatMessage, DomainError},
};

use super::{base_url, build_agent, describe_http_error};

const USER_AGENT: &str = concat!("kcc-chat/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

impl ChatResponse {
    fn into_content(self) -> Result<String, DomainError> {
        if let Some(error) = self.error {
            return Err(DomainError::completion(error));
        }
        self.message
            .map(|message| message.content)
            .ok_or_else(|| DomainError::completion("response carried no message"))
    }
}

/// Non-streaming chat client for a single Ollama model.
pub struct OllamaChatClient {
    base_url: String,
    model: String,
    agent: ureq::Agent,
}

impl OllamaChatClient {
    pub fn new(host: &str, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url(host),
            model: model.into(),
            agent: build_agent(timeout, USER_AGENT),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }
}

impl ChatModel for OllamaChatClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, DomainError> {
        let url = self.api_url("chat");
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        debug!(target: "kcc::http", %url, model = %self.model, "requesting completion");

        let response = self
            .agent
            .post(&url)
            .send_json(&body)
            .map_err(|err| DomainError::completion(describe_http_error(err)))?;

        let parsed: ChatResponse = response.into_json().map_err(|err| {
            DomainError::completion(format!("failed to parse chat response: {err}"))
        })?;

        parsed.into_content()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Embedding engine served by an Ollama embedding model such as
/// `nomic-embed-text`.
pub struct OllamaEmbedEngine {
    base_url: String,
    model: String,
    agent: ureq::Agent,
}

impl OllamaEmbedEngine {
    pub fn new(host: &str, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url(host),
            model: model.into(),
            agent: build_agent(timeout, USER_AGENT),
        }
    }
}

impl EmbeddingEngine for OllamaEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if !model.eq_ignore_ascii_case(&self.model) {
            return Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model, model
            )));
        }

        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .agent
            .post(&url)
            .send_json(EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .map_err(|err| DomainError::embedding(describe_http_error(err)))?;

        let parsed: EmbeddingResponse = response.into_json().map_err(|err| {
            DomainError::embedding(format!("failed to parse embedding response: {err}"))
        })?;

        if parsed.embedding.is_empty() {
            return Err(DomainError::embedding(format!(
                "model `{}` returned an empty embedding",
                self.model
            )));
        }

        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serialises_messages_with_lowercase_roles() {
        let messages = [ChatMessage::user("When will it rain?")];
        let body = ChatRequest {
            model: "gemma3:1b",
            messages: &messages,
            stream: false,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gemma3:1b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "When will it rain?");
    }

    #[test]
    fn chat_response_yields_message_content() {
        let raw = r#"{"model":"gemma3:1b","message":{"role":"assistant","content":"Sow after the first showers."},"done":true}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_content().unwrap(), "Sow after the first showers.");
    }

    #[test]
    fn chat_response_error_field_is_a_completion_error() {
        let raw = r#"{"error":"model \"gemma3:1b\" not found, try pulling it first"}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let err = parsed.into_content().unwrap_err();
        assert!(matches!(err, DomainError::Completion(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn clients_target_api_paths() {
        let client = OllamaChatClient::new("localhost:11434", "gemma3:1b", Duration::from_secs(5));
        assert_eq!(client.api_url("chat"), "http://localhost:11434/api/chat");
        assert_eq!(client.model_name(), "gemma3:1b");
    }

    #[test]
    fn embed_engine_checks_model_before_calling_out() {
        let engine = OllamaEmbedEngine::new(
            "http://127.0.0.1:9",
            "nomic-embed-text",
            Duration::from_millis(50),
        );
        let err = engine.embed("all-minilm", "paddy blast").unwrap_err();
        assert!(err.to_string().contains("nomic-embed-text"));
    }
}
