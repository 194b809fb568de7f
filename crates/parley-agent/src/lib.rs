//! # parley-agent
//!
//! Mode orchestration and task execution for Parley.
//!
//! This crate provides:
//! - The mode controller and its transition table
//! - Context handoff between guided, agentic and hybrid modes
//! - A priority task queue with dependencies and approval gating
//! - Follow-on action tracking and routing
//! - A tokio runtime that serializes every state change through one channel

pub mod agentic;
pub mod approval;
pub mod controller;
pub mod executor;
pub mod follow_on;
pub mod guided;
pub mod handoff;
pub mod modes;
pub mod queue;
pub mod runtime;

pub use agentic::{AgentState, AgenticState};
pub use approval::{ApprovalError, ApprovalGate, ApprovalRequest, Resolution};
pub use controller::{
    Effect, Event, Orchestrator, OrchestratorConfig, Outcome, Proposal, Reaction, Snapshot,
    APPROVAL_PROPOSAL, READY_PROPOSAL, USER_DECLINED,
};
pub use executor::TaskRunner;
pub use follow_on::{FollowOnEngine, Route};
pub use guided::{GuidedState, GuidedStep};
pub use handoff::{HandoffBundle, ModeStates};
pub use modes::{PendingTransition, TransitionRecord, TransitionState};
pub use queue::{QueueError, QueueStatus, Slot, TaskOutcome, TaskQueue, TaskResult};
pub use runtime::{
    Collaborators, NoOpObserver, RuntimeError, RuntimeResult, SessionBuilder, SessionHandle,
    SessionObserver,
};
