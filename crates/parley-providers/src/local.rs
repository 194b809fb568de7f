//! Local model provider (Ollama).
//!
//! Ollama exposes an OpenAI-compatible API, so this provider wraps
//! [`OpenAIProvider`] with Ollama-specific defaults.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use parley_core::ProviderError;

use crate::openai::OpenAIProvider;
use crate::traits::{CompletionProvider, CompletionRequest};

/// Default Ollama API URL.
const OLLAMA_API_URL: &str = "http://localhost:11434/v1";

/// Default local model.
const OLLAMA_DEFAULT_MODEL: &str = "llama3.2";

/// Local provider for Ollama models.
pub struct LocalProvider {
    inner: OpenAIProvider,
    client: Client,
    base_url: String,
}

impl LocalProvider {
    /// Create a new local provider connecting to Ollama.
    pub fn new() -> Self {
        Self::with_url(OLLAMA_API_URL)
    }

    /// Create with a custom Ollama URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        let base_url = url.into();
        Self {
            inner: OpenAIProvider::keyless("local", "Ollama", base_url.clone())
                .with_default_model(OLLAMA_DEFAULT_MODEL),
            client: Client::new(),
            base_url,
        }
    }

    /// Set the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.inner = self.inner.with_default_model(model);
        self
    }

    /// Check whether the Ollama server answers.
    pub async fn is_running(&self) -> bool {
        let base = self.base_url.trim_end_matches("/v1");
        match self.client.get(format!("{}/api/tags", base)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// List installed model names.
    pub async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        let base = self.base_url.trim_end_matches("/v1");
        let response = self
            .client
            .get(format!("{}/api/tags", base))
            .send()
            .await?
            .error_for_status()?;
        let tags: TagsResponse = response.json().await?;
        debug!("Ollama reports {} models", tags.models.len());
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for LocalProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        // Hosted model names are not installed locally; use the local default
        let request = if request.model.starts_with("gpt-") {
            CompletionRequest {
                model: String::new(),
                ..request
            }
        } else {
            request
        };
        self.inner.complete(request).await
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}
