//! Blocking HTTP clients for the external providers: the Ollama server
//! (chat and embeddings) and the DuckDuckGo HTML search endpoint.

mod duckduckgo;
mod ollama;

pub use duckduckgo::{DuckDuckGoSearch, DEFAULT_SEARCH_ENDPOINT};
pub use ollama::{OllamaChatClient, OllamaEmbedEngine};

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

/// Default Ollama server address.
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

/// Build a `ureq` agent with the given overall request timeout.
pub fn build_agent(timeout: Duration, user_agent: &str) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
}

/// Normalise a configured host into a base URL without trailing slash.
pub fn base_url(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_OLLAMA_HOST.to_string()
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Check whether an Ollama server answers at `host`.
pub fn check_service_availability(host: &str) -> bool {
    let url = format!("{}/api/tags", base_url(host));
    debug!(target: "kcc::http", %url, "checking language model server");

    match ureq::get(&url).timeout(Duration::from_secs(2)).call() {
        Ok(response) => response.status() == 200,
        Err(err) => {
            warn!(target: "kcc::http", %url, error = %err, "language model server unreachable");
            false
        }
    }
}

/// Error body returned by Ollama.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Flatten a `ureq` failure into a readable message.
pub fn describe_http_error(error: ureq::Error) -> String {
    match error {
        ureq::Error::Status(code, response) => {
            if let Ok(err_response) = response.into_json::<ErrorResponse>() {
                format!("HTTP {}: {}", code, err_response.error)
            } else {
                format!("HTTP error: {}", code)
            }
        }
        ureq::Error::Transport(transport) => format!("transport error: {}", transport),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_normalises_hosts() {
        assert_eq!(base_url("localhost:11434/"), "http://localhost:11434");
        assert_eq!(base_url("https://llm.example.org"), "https://llm.example.org");
        assert_eq!(base_url(""), DEFAULT_OLLAMA_HOST);
    }
}
