//! Error types for Parley.
//!
//! Orchestration failures never surface as errors: they degrade to a
//! status line in the transcript. What remains here is configuration
//! loading and the completion backends, both of which carry a hint the
//! user can act on.

use thiserror::Error;

/// Result type alias using Parley's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Parley.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded, parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl Error {
    /// Hint for fixing the error, if there is one.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => Some("Check ~/.config/parley/config.toml or run `parley config show`"),
            Error::Provider(e) => e.recovery_suggestion(),
        }
    }

    /// Error text followed by its hint on a second line.
    pub fn with_suggestion(&self) -> String {
        match self.recovery_suggestion() {
            Some(hint) => format!("{}\n  Suggestion: {}", self, hint),
            None => self.to_string(),
        }
    }
}

/// Failure of a completion backend.
///
/// The session runtime answers every one of these with the rule-based
/// reply, so none of them is fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// No backend is configured at all
    #[error("No completion provider available")]
    NoProviderAvailable,

    #[error("Authentication failed for {provider}: {message}")]
    AuthenticationFailed { provider: String, message: String },

    /// Non-success HTTP status
    #[error("{provider} returned {status}: {message}")]
    Status {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Request to {provider} timed out")]
    Timeout { provider: String },

    #[error("Could not reach {provider}: {message}")]
    Unreachable { provider: String, message: String },

    /// Reply body was not what the backend promised
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl ProviderError {
    /// Hint for fixing the error, if there is one.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::NoProviderAvailable => {
                Some("Set OPENAI_API_KEY or enable the local provider; rule-based replies are used meanwhile")
            }
            ProviderError::AuthenticationFailed { .. } => {
                Some("Check that your API key is valid and not expired")
            }
            ProviderError::Status { status: 429, .. } => Some("Rate limited. Wait a moment and try again"),
            ProviderError::Status {
                status: 500..=599, ..
            } => Some("The model service is having issues. Try again later"),
            ProviderError::Timeout { .. } | ProviderError::Unreachable { .. } => {
                Some("Check your network connection, or `ollama serve` for the local provider")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_hint() {
        let err = ProviderError::Status {
            provider: "openai".to_string(),
            status: 429,
            message: "Rate limited".to_string(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.recovery_suggestion().is_some());

        let bad_request = ProviderError::Status {
            provider: "openai".to_string(),
            status: 400,
            message: "bad".to_string(),
        };
        assert_eq!(bad_request.recovery_suggestion(), None);
    }

    #[test]
    fn test_no_provider_has_suggestion() {
        let err = Error::from(ProviderError::NoProviderAvailable);
        let formatted = err.with_suggestion();
        assert!(formatted.starts_with("No completion provider available"));
        assert!(formatted.contains("Suggestion:"));
    }

    #[test]
    fn test_config_error_mentions_command() {
        let err = Error::Config("bad toml".to_string());
        assert!(err.with_suggestion().contains("parley config show"));
    }
}
