//! Collaborator trait definitions.
//!
//! The orchestration engine never talks to a model, a classifier or a
//! document pipeline directly. It goes through these traits, which are
//! injected when a session is built.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_core::{
    AgentAction, ExecutionResult, FollowOnAction, FollowOnActionSet, FollowOnContext,
    ProviderError, TaskOutput, UnifiedMessage,
};

/// Request for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to use (empty = provider default)
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<UnifiedMessage>,
    /// System prompt
    pub system: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Temperature (0.0-2.0)
    pub temperature: f32,
}

impl CompletionRequest {
    /// Create a request with default sampling parameters.
    pub fn new(model: impl Into<String>, messages: Vec<UnifiedMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A text completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider identifier (e.g., "openai", "local")
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Check if the provider is configured (has credentials or an endpoint)
    fn is_configured(&self) -> bool;

    /// Send a completion request and return the reply text.
    ///
    /// Fails with [`ProviderError::NoProviderAvailable`] when nothing is
    /// configured.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

/// Coarse intent of a free-text user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    CreateAcquisition,
    ModifyRequirements,
    ReviewDocuments,
    CheckStatus,
    ApproveAction,
    AskQuestion,
}

impl IntentType {
    /// Human-readable phrase used in replies.
    pub fn phrase(&self) -> &'static str {
        match self {
            IntentType::CreateAcquisition => "start a new acquisition",
            IntentType::ModifyRequirements => "change the requirements",
            IntentType::ReviewDocuments => "review documents",
            IntentType::CheckStatus => "check the status",
            IntentType::ApproveAction => "approve a pending action",
            IntentType::AskQuestion => "get an answer",
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent_type: IntentType,
    /// Confidence in 0.0..=1.0
    pub confidence: f32,
    /// Whether acting on the intent means running a task
    pub requires_execution: bool,
}

impl Intent {
    pub fn new(intent_type: IntentType, confidence: f32, requires_execution: bool) -> Self {
        Self {
            intent_type,
            confidence,
            requires_execution,
        }
    }
}

/// Natural-language intent classifier.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify a user message.
    async fn classify(&self, text: &str) -> anyhow::Result<Intent>;
}

/// Runs agent actions.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute an action and return its typed output.
    async fn run(&self, action: &AgentAction) -> anyhow::Result<TaskOutput>;
}

/// Generates and executes follow-on actions.
#[async_trait]
pub trait FollowOnActionService: Send + Sync {
    /// Generate a fresh set of suggestions for an acquisition.
    async fn generate(
        &self,
        acquisition_id: Uuid,
        context: &FollowOnContext,
    ) -> anyhow::Result<FollowOnActionSet>;

    /// Execute a suggestion that needs no agent task.
    async fn execute(
        &self,
        action: &FollowOnAction,
        acquisition_id: Uuid,
    ) -> anyhow::Result<ExecutionResult>;
}
