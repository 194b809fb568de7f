//! Provider registry for managing available completion providers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use parley_core::{Config, ProviderError};

use crate::local::LocalProvider;
use crate::openai::OpenAIProvider;
use crate::traits::{CompletionProvider, CompletionRequest};

/// Registry of available completion providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn CompletionProvider>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
        }
    }

    /// Registry holding every backend the configuration enables.
    ///
    /// OpenAI is registered when a key is found (config, then
    /// `OPENAI_API_KEY`); the local backend only when explicitly enabled.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        if let Some(openai) = openai_from_config(config) {
            registry.register(Arc::new(openai));
        }
        if let Some(local) = local_from_config(config) {
            registry.register(Arc::new(local));
        }

        if let Some(ref default) = config.providers.default_provider {
            if !registry.set_default(default) {
                tracing::warn!(provider = %default, "Configured default provider is not available");
            }
        }
        registry
    }

    /// Register a provider. The first one registered becomes the default.
    pub fn register(&mut self, provider: Arc<dyn CompletionProvider>) {
        let id = provider.id().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(id.clone());
        }
        self.providers.insert(id, provider);
    }

    /// Get a provider by ID.
    pub fn get(&self, id: &str) -> Option<Arc<dyn CompletionProvider>> {
        self.providers.get(id).cloned()
    }

    /// Get the default provider.
    pub fn default_provider(&self) -> Option<Arc<dyn CompletionProvider>> {
        self.default_provider.as_ref().and_then(|id| self.get(id))
    }

    /// Default provider, or one that always reports
    /// [`ProviderError::NoProviderAvailable`].
    pub fn completion(&self) -> Arc<dyn CompletionProvider> {
        self.default_provider()
            .unwrap_or_else(|| Arc::new(UnconfiguredProvider))
    }

    /// Set the default provider.
    pub fn set_default(&mut self, id: &str) -> bool {
        if self.providers.contains_key(id) {
            self.default_provider = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// List all registered provider ids.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    /// Iterate over all registered providers.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn CompletionProvider>> {
        self.providers.values()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn openai_from_config(config: &Config) -> Option<OpenAIProvider> {
    let settings = config.providers.openai.as_ref();
    let api_key = settings
        .and_then(|c| c.resolve_api_key())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())?;

    let mut provider = OpenAIProvider::new(&api_key);
    let base_url = std::env::var("OPENAI_BASE_URL")
        .ok()
        .or_else(|| settings.and_then(|c| c.base_url.clone()));
    if let Some(url) = base_url {
        provider = provider.with_base_url(&url);
    }
    if let Some(model) = settings.and_then(|c| c.default_model.as_ref()) {
        provider = provider.with_default_model(model);
    }
    Some(provider)
}

fn local_from_config(config: &Config) -> Option<LocalProvider> {
    let settings = config.providers.local.as_ref().filter(|c| c.enabled)?;
    let url = settings
        .base_url
        .clone()
        .or_else(|| std::env::var("OLLAMA_HOST").ok());
    let provider = url.map(LocalProvider::with_url).unwrap_or_default();
    Some(match settings.default_model {
        Some(ref model) => provider.with_default_model(model),
        None => provider,
    })
}

/// Stand-in used when no provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProvider;

#[async_trait]
impl CompletionProvider for UnconfiguredProvider {
    fn id(&self) -> &str {
        "none"
    }

    fn name(&self) -> &str {
        "No provider"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
        Err(ProviderError::NoProviderAvailable)
    }
}
