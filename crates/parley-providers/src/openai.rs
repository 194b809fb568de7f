//! OpenAI-compatible chat completion provider.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use parley_core::{ProviderError, Role, UnifiedMessage};

use crate::traits::{CompletionProvider, CompletionRequest};

/// Default OpenAI API base URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Provider for the OpenAI chat completions API and compatible endpoints.
pub struct OpenAIProvider {
    client: Client,
    id: String,
    name: String,
    api_key: Option<String>,
    base_url: String,
    default_model: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            id: "openai".to_string(),
            name: "OpenAI".to_string(),
            api_key: Some(api_key.into()),
            base_url: OPENAI_API_URL.to_string(),
            default_model: "gpt-4o-mini".to_string(),
        }
    }

    /// Create a keyless provider for an OpenAI-compatible endpoint.
    pub fn keyless(id: impl Into<String>, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            id: id.into(),
            name: name.into(),
            api_key: None,
            base_url: base_url.into(),
            default_model: String::new(),
        }
    }

    /// Create from environment variable.
    pub fn from_env() -> Option<Self> {
        std::env::var("OPENAI_API_KEY").ok().map(Self::new)
    }

    /// Set a custom base URL (for OpenRouter, Azure, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn format_messages(&self, request: &CompletionRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(convert_message));
        messages
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: self.id.clone(),
            }
        } else {
            ProviderError::Unreachable {
                provider: self.id.clone(),
                message: err.to_string(),
            }
        }
    }
}

fn convert_message(message: &UnifiedMessage) -> ChatMessage {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    ChatMessage {
        role: role.to_string(),
        content: message.content.clone(),
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        match self.api_key {
            Some(ref key) => !key.is_empty(),
            None => !self.base_url.is_empty(),
        }
    }

    #[instrument(skip(self, request), fields(provider = %self.id, model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let api_request = ChatRequest {
            model,
            messages: self.format_messages(&request),
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
            stream: false,
        };

        debug!("Sending chat completion request");

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .json(&api_request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("{} API error: {} - {}", self.name, status, error_text);
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ProviderError::AuthenticationFailed {
                    provider: self.id.clone(),
                    message: error_text,
                });
            }
            return Err(ProviderError::Status {
                provider: self.id.clone(),
                status: status.as_u16(),
                message: error_text,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: self.id.clone(),
                message: e.to_string(),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.id.clone(),
                message: "response contained no content".to_string(),
            })
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::Mode;

    #[test]
    fn test_system_prompt_comes_first() {
        let provider = OpenAIProvider::new("sk-test");
        let request = CompletionRequest::new(
            "gpt-4o-mini",
            vec![
                UnifiedMessage::user("hello", Mode::Guided),
                UnifiedMessage::assistant("hi", Mode::Guided),
            ],
        )
        .with_system("be brief");

        let messages = provider.format_messages(&request);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
    }

    #[test]
    fn test_is_configured() {
        assert!(OpenAIProvider::new("sk-test").is_configured());
        assert!(!OpenAIProvider::new("").is_configured());
        assert!(OpenAIProvider::keyless("local", "Ollama", "http://localhost:11434/v1").is_configured());
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Sure."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Sure."));
    }
}
