//! # parley-providers
//!
//! Collaborator interfaces consumed by the orchestration engine, and the
//! implementations Parley ships with.
//!
//! This crate provides:
//! - `CompletionProvider`, `IntentClassifier`, `TaskExecutor` and
//!   `FollowOnActionService` traits
//! - OpenAI-compatible completion providers (hosted and Ollama)
//! - A registry that selects the configured provider
//! - Keyword intent classification, a simulated task executor and a
//!   phase-based follow-on planner

pub mod follow_on;
pub mod intent;
pub mod local;
pub mod openai;
pub mod registry;
pub mod tasks;
pub mod traits;

pub use follow_on::FollowOnPlanner;
pub use intent::KeywordIntentClassifier;
pub use local::LocalProvider;
pub use openai::OpenAIProvider;
pub use registry::{ProviderRegistry, UnconfiguredProvider};
pub use tasks::SimulatedTaskExecutor;
pub use traits::{
    CompletionProvider, CompletionRequest, FollowOnActionService, Intent, IntentClassifier,
    IntentType, TaskExecutor,
};
