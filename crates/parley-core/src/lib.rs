//! # parley-core
//!
//! Core types and abstractions for Parley, the contract-document assistant.
//!
//! This crate provides:
//! - Interaction modes and unified conversation messages
//! - Shared context with a single update path
//! - Agent actions, tasks and typed task outputs
//! - Follow-on action suggestions
//! - Configuration system
//! - Common error types

pub mod action;
pub mod config;
pub mod context;
pub mod error;
pub mod follow_on;
pub mod message;
pub mod mode;

pub use action::{
    ActionType, AgentAction, AgentTask, ComplianceReport, TaskOutput, TaskPriority, TaskStatus,
    Vendor,
};
pub use config::Config;
pub use context::{
    ContextUpdate, GuidedPhase, Requirements, SharedContext, UserPreferences, WorkflowPointer,
};
pub use error::{Error, ProviderError, Result};
pub use follow_on::{
    ActionCategory, ActionPriority, AutomationLevel, ExecutionResult, ExecutionStatus,
    FollowOnAction, FollowOnActionSet, FollowOnContext, ImpactLevel,
};
pub use message::{Role, UnifiedMessage};
pub use mode::Mode;
