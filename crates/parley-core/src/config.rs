//! Configuration system for Parley.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;
use crate::mode::Mode;

/// Main configuration struct for Parley.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Resource limits
    pub limits: LimitsConfig,
    /// Mode orchestration settings
    pub orchestration: OrchestrationConfig,
    /// Task executor settings
    pub executor: ExecutorConfig,
    /// Provider configurations
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default model to use
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum tokens per response
    pub max_tokens: u32,
    /// Tasks executed concurrently by one queue drain
    pub max_concurrent_tasks: usize,
    /// Times a failed task may be retried
    pub max_task_retries: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            max_concurrent_tasks: 3,
            max_task_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Mode new sessions start in
    pub initial_mode: Mode,
    /// Delay before a transition is marked stable (0 = immediate)
    pub transition_settle_ms: u64,
    /// Follow-on actions surfaced in the transcript
    pub surfaced_actions: usize,
    /// Lifetime of generated follow-on actions
    pub follow_on_ttl_secs: u64,
    /// Maximum follow-on actions requested per generation
    pub max_contextual_suggestions: usize,
    /// Perform proposed transitions without asking
    pub auto_confirm_transitions: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            initial_mode: Mode::Guided,
            transition_settle_ms: 0,
            surfaced_actions: 3,
            follow_on_ttl_secs: 3600,
            max_contextual_suggestions: 5,
            auto_confirm_transitions: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Simulated work time per task
    pub simulated_latency_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            simulated_latency_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Default provider to use
    pub default_provider: Option<String>,
    /// OpenAI configuration
    pub openai: Option<ProviderConfig>,
    /// Local/Ollama configuration
    pub local: Option<LocalProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key (can be set directly or via environment)
    pub api_key: Option<String>,
    /// Environment variable name for API key
    pub api_key_env: Option<String>,
    /// Default model for this provider
    pub default_model: Option<String>,
    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// API key from the config, else from the named environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LocalProviderConfig {
    /// Enable local provider
    pub enabled: bool,
    /// Ollama URL
    pub base_url: Option<String>,
    /// Default model
    pub default_model: Option<String>,
}

/// Problems found by [`Config::validate`].
#[derive(Debug, Clone, Default)]
pub struct ConfigReport {
    pub issues: Vec<ConfigIssue>,
}

impl ConfigReport {
    /// Whether any issue blocks loading.
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    fn push(&mut self, severity: Severity, field: &str, message: impl Into<String>) {
        self.issues.push(ConfigIssue {
            severity,
            field: field.to_string(),
            message: message.into(),
        });
    }
}

/// One problem with a config field.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: Severity,
    /// Dotted path, e.g. `limits.max_tokens`
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged; the value is still used
    Warning,
    /// Loading fails
    Error,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        let config_dir = Self::config_dir();

        Figment::new()
            .merge(figment::providers::Serialized::defaults(Config::default()))
            // User config
            .merge(Toml::file(config_dir.join("config.toml")))
            // Project config
            .merge(Toml::file(".parley/config.toml"))
            // Project local config (gitignored)
            .merge(Toml::file(".parley/config.local.toml"))
            .merge(Env::prefixed("PARLEY_").split("_"))
            .extract()
    }

    /// Load configuration and reject it if validation finds errors.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        let report = config.validate();

        if report.has_errors() {
            let lines: Vec<String> = report
                .errors()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!("invalid settings:\n  {}", lines.join("\n  "))));
        }

        for warning in report.warnings() {
            tracing::warn!(field = %warning.field, "{}", warning.message);
        }
        Ok(config)
    }

    /// Check value ranges and cross-field consistency.
    pub fn validate(&self) -> ConfigReport {
        use Severity::{Error as E, Warning as W};
        let mut report = ConfigReport::default();

        if self.general.model.trim().is_empty() {
            report.push(E, "general.model", "must not be empty");
        }
        if !(0.0..=2.0).contains(&self.general.temperature) {
            report.push(E, "general.temperature", "must be between 0.0 and 2.0");
        }
        if self.limits.max_tokens == 0 {
            report.push(E, "limits.max_tokens", "must be greater than 0");
        }

        match self.limits.max_concurrent_tasks {
            0 => report.push(E, "limits.max_concurrent_tasks", "must be greater than 0"),
            n if n > 32 => report.push(W, "limits.max_concurrent_tasks", format!("{} is very high", n)),
            _ => {}
        }

        let orchestration = &self.orchestration;
        if orchestration.surfaced_actions == 0 {
            report.push(W, "orchestration.surfaced_actions", "0 hides follow-on suggestions from the transcript");
        }
        if orchestration.follow_on_ttl_secs == 0 {
            report.push(E, "orchestration.follow_on_ttl_secs", "must be greater than 0");
        }
        if orchestration.transition_settle_ms > 10_000 {
            report.push(
                W,
                "orchestration.transition_settle_ms",
                "over 10s blocks mode-specific input for a long time",
            );
        }

        if let Some(ref openai) = self.providers.openai {
            if openai.api_key.as_deref() == Some("") {
                report.push(W, "providers.openai.api_key", "is an empty string");
            }
            if let Some(ref url) = openai.base_url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    report.push(E, "providers.openai.base_url", "must start with http:// or https://");
                }
            }
        }
        if let Some(ref default) = self.providers.default_provider {
            if default != "openai" && default != "local" {
                report.push(W, "providers.default_provider", format!("unknown provider '{}'", default));
            }
        }

        report
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("parley"))
            .unwrap_or_else(|| PathBuf::from("~/.config/parley"))
    }

    /// Get the data directory (history, etc.).
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("parley"))
            .unwrap_or_else(|| PathBuf::from("~/.local/share/parley"))
    }
}
