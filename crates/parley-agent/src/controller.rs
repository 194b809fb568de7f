//! The mode controller.
//!
//! [`Orchestrator`] is the single owner of a session's mode, child states,
//! shared context, task queue, approvals and follow-on suggestions. It is
//! a plain state machine: [`Orchestrator::handle`] applies one [`Event`]
//! and returns a [`Reaction`] holding the synchronous [`Outcome`] plus the
//! [`Effect`]s the runtime must perform. Every effect eventually posts
//! exactly one event back, so all state changes happen in the order the
//! runtime feeds events in.
//!
//! ## Flow
//!
//! ```text
//! Event ─> Orchestrator::handle ─> Reaction { outcome, effects }
//!                ^                                   │
//!                └──── result event <── runtime <────┘
//! ```

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_core::message::meta;
use parley_core::{
    AgentAction, AgentTask, Config, ContextUpdate, ExecutionResult, ExecutionStatus,
    FollowOnAction, FollowOnActionSet, FollowOnContext, GuidedPhase, Mode, SharedContext,
    TaskPriority, TaskStatus, UnifiedMessage, UserPreferences,
};
use parley_providers::{CompletionRequest, Intent};

use crate::agentic::{self, AgentState};
use crate::approval::{ApprovalGate, ApprovalRequest};
use crate::follow_on::{self, FollowOnEngine, Route};
use crate::guided;
use crate::handoff::{self, ModeStates};
use crate::modes::{
    is_transition_allowed, PendingTransition, TransitionFacts, TransitionRecord, TransitionState,
};
use crate::queue::{DrainStart, QueueStatus, TaskOutcome, TaskQueue, TaskResult};

/// Reason attached to the proposal made when requirements are complete.
pub const READY_PROPOSAL: &str = "Requirements gathering complete. Ready to execute tasks?";

/// Reason attached to the proposal made when the agent needs approval.
pub const APPROVAL_PROPOSAL: &str = "Agent needs additional input. Switch to hybrid mode?";

/// Error recorded on a task whose approval was rejected.
pub const USER_DECLINED: &str = "user declined";

const GREETING: &str = "Hi! I'll help you put together your acquisition package. \
                        What product or service do you need to acquire?";

// ============================================================================
// Configuration
// ============================================================================

/// Settings the controller reads.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model passed to the completion provider
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Tasks executing at once
    pub max_concurrent_tasks: usize,
    pub max_task_retries: u32,
    pub initial_mode: Mode,
    /// Zero marks transitions stable immediately
    pub transition_settle: Duration,
    /// Follow-on actions surfaced in the transcript
    pub surfaced_actions: usize,
    pub follow_on_ttl_secs: u64,
    pub max_contextual_suggestions: usize,
    pub auto_confirm_transitions: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        let orchestration = &config.orchestration;
        Self {
            model: config.general.model.clone(),
            max_tokens: config.limits.max_tokens,
            temperature: config.general.temperature,
            max_concurrent_tasks: config.limits.max_concurrent_tasks,
            max_task_retries: config.limits.max_task_retries,
            initial_mode: orchestration.initial_mode,
            transition_settle: Duration::from_millis(orchestration.transition_settle_ms),
            surfaced_actions: orchestration.surfaced_actions,
            follow_on_ttl_secs: orchestration.follow_on_ttl_secs,
            max_contextual_suggestions: orchestration.max_contextual_suggestions,
            auto_confirm_transitions: orchestration.auto_confirm_transitions,
        }
    }
}

// ============================================================================
// Events, Outcomes and Effects
// ============================================================================

/// A transition to propose once a reply has been delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub target: Mode,
    pub reason: String,
}

/// Everything that can happen to a session.
#[derive(Debug, Clone)]
pub enum Event {
    // Inbound from the surrounding app
    UserMessage { text: String },
    RequestTransition { target: Mode, reason: String },
    ForceTransition { target: Mode },
    ConfirmTransition,
    CancelTransition { id: Uuid },
    EnqueueAction {
        action: AgentAction,
        priority: Option<TaskPriority>,
        dependencies: Vec<Uuid>,
    },
    ProcessQueue,
    CancelDrain { drain_id: Uuid },
    RetryTask { task_id: Uuid },
    ApprovalDecision { request_id: Uuid, approved: bool },
    ExecuteFollowOn { action_id: Uuid },
    DismissFollowOn { action_id: Uuid },
    RefreshFollowOns,
    UpdateContext(ContextUpdate),

    // Results of effects
    ReplyReady {
        reply_to: Uuid,
        mode: Mode,
        text: String,
        fallback: bool,
        proposal: Option<Proposal>,
    },
    IntentClassified { message_id: Uuid, intent: Intent },
    TransitionSettled { id: Uuid },
    TaskFinished { task_id: Uuid, outcome: TaskOutcome },
    FollowOnExecuted {
        action_id: Uuid,
        result: Result<ExecutionResult, String>,
    },
    FollowOnsGenerated { set: FollowOnActionSet },
    FollowOnGenerationFailed { reason: String },
}

impl Event {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::RequestTransition { .. } => "request_transition",
            Event::ForceTransition { .. } => "force_transition",
            Event::ConfirmTransition => "confirm_transition",
            Event::CancelTransition { .. } => "cancel_transition",
            Event::EnqueueAction { .. } => "enqueue_action",
            Event::ProcessQueue => "process_queue",
            Event::CancelDrain { .. } => "cancel_drain",
            Event::RetryTask { .. } => "retry_task",
            Event::ApprovalDecision { .. } => "approval_decision",
            Event::ExecuteFollowOn { .. } => "execute_follow_on",
            Event::DismissFollowOn { .. } => "dismiss_follow_on",
            Event::RefreshFollowOns => "refresh_follow_ons",
            Event::UpdateContext(_) => "update_context",
            Event::ReplyReady { .. } => "reply_ready",
            Event::IntentClassified { .. } => "intent_classified",
            Event::TransitionSettled { .. } => "transition_settled",
            Event::TaskFinished { .. } => "task_finished",
            Event::FollowOnExecuted { .. } => "follow_on_executed",
            Event::FollowOnsGenerated { .. } => "follow_ons_generated",
            Event::FollowOnGenerationFailed { .. } => "follow_on_generation_failed",
        }
    }
}

/// Synchronous answer to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted,
    /// Nothing changed
    Rejected(String),
    /// A stale or duplicate result
    Ignored,
    Enqueued(Uuid),
    DrainStarted(Uuid),
    /// Another drain is in flight
    DrainSkipped,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Outcome::Rejected(_) | Outcome::Ignored)
    }
}

/// Work the runtime performs on the controller's behalf.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Ask the completion provider; post `ReplyReady`
    GenerateReply {
        reply_to: Uuid,
        mode: Mode,
        request: CompletionRequest,
        fallback: String,
        proposal: Option<Proposal>,
    },
    /// Ask the intent classifier; post `IntentClassified`
    ClassifyIntent { message_id: Uuid, text: String },
    /// Run a task; post `TaskFinished`
    RunTask { drain_id: Uuid, task: AgentTask },
    /// Cancel the tasks of a drain
    CancelDrain { drain_id: Uuid },
    /// A drain completed; wake anyone waiting on it
    DrainFinished {
        drain_id: Uuid,
        results: Vec<TaskResult>,
    },
    /// Execute through the follow-on service; post `FollowOnExecuted`
    ExecuteFollowOn {
        action: FollowOnAction,
        acquisition_id: Uuid,
    },
    /// Generate suggestions; post `FollowOnsGenerated` or `FollowOnGenerationFailed`
    GenerateFollowOns {
        acquisition_id: Uuid,
        context: FollowOnContext,
    },
    /// Post `TransitionSettled` after a delay
    SettleTransition { id: Uuid, after: Duration },
}

/// Outcome plus effects of one event.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub outcome: Outcome,
    pub effects: Vec<Effect>,
}

impl Reaction {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            effects: Vec::new(),
        }
    }

    fn with_effects(outcome: Outcome, effects: Vec<Effect>) -> Self {
        Self { outcome, effects }
    }

    fn accepted(effects: Vec<Effect>) -> Self {
        Self::with_effects(Outcome::Accepted, effects)
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self::new(Outcome::Rejected(reason.into()))
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub mode: Mode,
    pub transition: TransitionState,
    pub pending_transition: Option<PendingTransition>,
    pub transitions: Vec<TransitionRecord>,
    pub messages: Vec<UnifiedMessage>,
    pub queue: QueueStatus,
    pub pending_approvals: Vec<ApprovalRequest>,
    /// Ranked available suggestions
    pub follow_on_actions: Vec<FollowOnAction>,
    pub context: SharedContext,
    pub phase: Option<GuidedPhase>,
    pub agent_state: Option<AgentState>,
    pub recovery_suggestions: Vec<String>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// State machine for one conversation session.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    mode: Mode,
    transition: TransitionState,
    pending_transition: Option<PendingTransition>,
    transitions: Vec<TransitionRecord>,
    states: ModeStates,
    context: SharedContext,
    transcript: Vec<UnifiedMessage>,
    queue: TaskQueue,
    approvals: ApprovalGate,
    follow_ons: FollowOnEngine,
    /// Start another drain when the current one finishes
    auto_drain: bool,
}

impl Orchestrator {
    /// Create a session for a new acquisition.
    pub fn new(config: OrchestratorConfig, acquisition_id: Uuid) -> Self {
        let preferences = UserPreferences {
            preferred_mode: config.initial_mode,
            ..UserPreferences::default()
        };
        let mut states = ModeStates::default();
        states.ensure(config.initial_mode);

        let mut orchestrator = Self {
            mode: config.initial_mode,
            transition: TransitionState::Stable,
            pending_transition: None,
            transitions: Vec::new(),
            states,
            context: SharedContext::new(acquisition_id, preferences),
            transcript: Vec::new(),
            queue: TaskQueue::new(config.max_task_retries),
            approvals: ApprovalGate::new(),
            follow_ons: FollowOnEngine::new(config.surfaced_actions),
            auto_drain: false,
            config,
        };
        if orchestrator.mode.includes_guided() {
            orchestrator.record(UnifiedMessage::assistant(GREETING, Mode::Guided));
        }
        orchestrator
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn transition_state(&self) -> &TransitionState {
        &self.transition
    }

    pub fn pending_transition(&self) -> Option<&PendingTransition> {
        self.pending_transition.as_ref()
    }

    pub fn states(&self) -> &ModeStates {
        &self.states
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn messages(&self) -> &[UnifiedMessage] {
        &self.transcript
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn approvals(&self) -> &ApprovalGate {
        &self.approvals
    }

    pub fn follow_ons(&self) -> &FollowOnEngine {
        &self.follow_ons
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Capture the observable state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.mode,
            transition: self.transition.clone(),
            pending_transition: self.pending_transition.clone(),
            transitions: self.transitions.clone(),
            messages: self.transcript.clone(),
            queue: self.queue.status(),
            pending_approvals: self.approvals.pending(),
            follow_on_actions: self.follow_ons.ranked(Utc::now()),
            context: self.context.clone(),
            phase: self.states.guided.as_ref().map(|g| g.phase),
            agent_state: self.states.agentic.as_ref().map(|a| a.agent_state),
            recovery_suggestions: self
                .states
                .agentic
                .as_ref()
                .map(|a| a.recovery_suggestions.clone())
                .unwrap_or_default(),
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Apply one event.
    pub fn handle(&mut self, event: Event) -> Reaction {
        debug!(event = event.name(), mode = %self.mode, "Handling event");

        if self.transition.is_transitioning() && Self::is_guarded(&event) {
            debug!(event = event.name(), "Rejected while transitioning");
            return Reaction::rejected("a mode transition is in progress");
        }

        match event {
            Event::UserMessage { text } => self.on_user_message(&text),
            Event::RequestTransition { target, reason } => self.request_transition(target, reason),
            Event::ForceTransition { target } => self.force_transition(target),
            Event::ConfirmTransition => self.confirm_transition(),
            Event::CancelTransition { id } => self.cancel_transition(id),
            Event::EnqueueAction {
                action,
                priority,
                dependencies,
            } => self.enqueue(action, priority, dependencies),
            Event::ProcessQueue => self.start_drain(),
            Event::CancelDrain { drain_id } => self.cancel_drain(drain_id),
            Event::RetryTask { task_id } => self.retry(task_id),
            Event::ApprovalDecision {
                request_id,
                approved,
            } => self.resolve_approval(request_id, approved),
            Event::ExecuteFollowOn { action_id } => self.execute_follow_on(action_id),
            Event::DismissFollowOn { action_id } => self.dismiss_follow_on(action_id),
            Event::RefreshFollowOns => self.regenerate_follow_ons(),
            Event::UpdateContext(update) => self.update_context(update),
            Event::ReplyReady {
                reply_to,
                mode,
                text,
                fallback,
                proposal,
            } => self.on_reply(reply_to, mode, text, fallback, proposal),
            Event::IntentClassified { message_id, intent } => self.on_intent(message_id, intent),
            Event::TransitionSettled { id } => self.on_settled(id),
            Event::TaskFinished { task_id, outcome } => self.on_task_finished(task_id, outcome),
            Event::FollowOnExecuted { action_id, result } => self.on_follow_on_executed(action_id, result),
            Event::FollowOnsGenerated { set } => self.on_follow_ons_generated(set),
            Event::FollowOnGenerationFailed { reason } => {
                warn!(%reason, "Follow-on generation failed");
                self.follow_ons.generation_failed();
                Reaction::new(Outcome::Accepted)
            }
        }
    }

    /// Events that mutate mode-specific state and wait out a transition.
    fn is_guarded(event: &Event) -> bool {
        matches!(
            event,
            Event::UserMessage { .. }
                | Event::RequestTransition { .. }
                | Event::ForceTransition { .. }
                | Event::ConfirmTransition
                | Event::EnqueueAction { .. }
                | Event::ProcessQueue
                | Event::RetryTask { .. }
                | Event::ApprovalDecision { .. }
                | Event::ExecuteFollowOn { .. }
                | Event::DismissFollowOn { .. }
                | Event::UpdateContext(_)
        )
    }

    // ========================================================================
    // Transcript
    // ========================================================================

    /// Append to the transcript and to the child states that see the message.
    fn record(&mut self, message: UnifiedMessage) {
        let user = message.is_user();
        if let Some(guided) = self.states.guided.as_mut() {
            if (user && self.mode.includes_guided()) || (!user && message.origin == Mode::Guided) {
                guided.messages.push(message.clone());
            }
        }
        if let Some(agentic) = self.states.agentic.as_mut() {
            if (user && self.mode.includes_agentic()) || (!user && message.origin == Mode::Agentic) {
                agentic.messages.push(message.clone());
            }
        }
        self.transcript.push(message);
    }

    fn set_agent_state(&mut self, state: AgentState) {
        if let Some(agentic) = self.states.agentic.as_mut() {
            agentic.agent_state = state;
        }
    }

    /// Derive the agent state from the queue and approvals.
    fn settle_agent_state(&mut self) {
        let state = if self.queue.is_executing() {
            AgentState::Executing
        } else if self.approvals.has_pending() {
            AgentState::WaitingForApproval
        } else {
            AgentState::Idle
        };
        self.set_agent_state(state);
    }

    fn completion_request(&self, messages: Vec<UnifiedMessage>, system: String) -> CompletionRequest {
        CompletionRequest::new(&self.config.model, messages)
            .with_system(system)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
    }

    // ========================================================================
    // User messages
    // ========================================================================

    fn on_user_message(&mut self, text: &str) -> Reaction {
        let text = text.trim();
        if text.is_empty() {
            return Reaction::rejected("empty message");
        }
        self.states.ensure(self.mode);

        let side = match self.mode {
            Mode::Guided => Mode::Guided,
            Mode::Agentic => Mode::Agentic,
            Mode::Hybrid if agentic::is_agentic_command(text) => Mode::Agentic,
            Mode::Hybrid => Mode::Guided,
        };
        debug!(mode = %self.mode, routed_to = %side, "Routing user message");

        match side {
            Mode::Agentic => self.agentic_message(text),
            _ => self.guided_message(text),
        }
    }

    fn guided_message(&mut self, text: &str) -> Reaction {
        let message = UnifiedMessage::user(text, Mode::Guided);
        let message_id = message.id;
        self.record(message);

        let Some(guided) = self.states.guided.as_mut() else {
            return Reaction::rejected("guided state is not active");
        };
        let before = guided.phase;
        let step = guided::advance(guided.phase, &guided.requirements, text);
        guided.phase = step.phase;
        guided.requirements = step.requirements.clone();
        let history = guided.messages.clone();

        let mut effects = Vec::new();
        self.context.apply(ContextUpdate::Requirements(step.requirements.clone()));
        if step.phase != before {
            info!(from = ?before, to = ?step.phase, "Guided phase changed");
            self.context.apply(ContextUpdate::Phase(step.phase));
            effects.extend(self.regenerate_follow_ons().effects);
        }

        let proposal = (step.phase == GuidedPhase::ReadyToGenerate
            && before != GuidedPhase::ReadyToGenerate
            && self.mode == Mode::Guided)
            .then(|| Proposal {
                target: Mode::Agentic,
                reason: READY_PROPOSAL.to_string(),
            });

        let system = format!(
            "{}\n\nBase your reply on this draft: {}",
            guided::system_prompt(step.phase, &step.requirements),
            step.reply
        );
        effects.push(Effect::GenerateReply {
            reply_to: message_id,
            mode: Mode::Guided,
            request: self.completion_request(history, system),
            fallback: step.reply,
            proposal,
        });
        Reaction::accepted(effects)
    }

    fn agentic_message(&mut self, text: &str) -> Reaction {
        let message = UnifiedMessage::user(text, Mode::Agentic);
        let message_id = message.id;
        self.record(message);
        self.set_agent_state(AgentState::Thinking);

        Reaction::accepted(vec![Effect::ClassifyIntent {
            message_id,
            text: text.to_string(),
        }])
    }

    fn on_intent(&mut self, message_id: Uuid, intent: Intent) -> Reaction {
        let Some(agentic) = self.states.agentic.as_mut() else {
            return Reaction::new(Outcome::Ignored);
        };
        debug!(intent = ?intent.intent_type, confidence = intent.confidence, "Intent classified");
        agentic.intent = Some(intent.clone());
        let history = agentic.messages.clone();

        let mut effects = Vec::new();
        match agentic::action_for_intent(&intent) {
            Some(action) if self.mode.includes_agentic() => {
                let task = AgentTask::for_action(action);
                match self.queue.enqueue(task, Vec::new()) {
                    Ok(_) => effects.extend(self.drain_or_defer()),
                    Err(e) => warn!(error = %e, "Could not enqueue task for intent"),
                }
            }
            Some(_) => debug!(mode = %self.mode, "Session left agentic mode, not enqueuing"),
            None => {}
        }

        let fallback = format!(
            "I understand you want to {}. Let me help with that.",
            intent.intent_type.phrase()
        );
        effects.push(Effect::GenerateReply {
            reply_to: message_id,
            mode: Mode::Agentic,
            request: self.completion_request(history, agentic::system_prompt(&intent)),
            fallback,
            proposal: None,
        });
        Reaction::accepted(effects)
    }

    fn on_reply(
        &mut self,
        reply_to: Uuid,
        mode: Mode,
        text: String,
        fallback: bool,
        proposal: Option<Proposal>,
    ) -> Reaction {
        let message = UnifiedMessage::assistant(text, mode)
            .with_meta(meta::REPLY_TO, reply_to.to_string())
            .with_meta(meta::FALLBACK, fallback);
        self.record(message);

        if mode == Mode::Agentic {
            self.settle_agent_state();
        }

        let effects = match proposal {
            Some(p) => self.propose(p.target, &p.reason),
            None => Vec::new(),
        };
        Reaction::accepted(effects)
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn transition_facts(&self) -> TransitionFacts {
        TransitionFacts {
            guided_phase: self.states.guided.as_ref().map(|g| g.phase),
            task_executing: self.queue.is_executing(),
        }
    }

    /// Validated transition. Invalid requests leave the state untouched.
    pub fn request_transition(&mut self, target: Mode, reason: String) -> Reaction {
        if target == self.mode {
            return Reaction::new(Outcome::Accepted);
        }
        if !is_transition_allowed(self.mode, target, &self.transition_facts()) {
            debug!(from = %self.mode, to = %target, "Transition not allowed");
            return Reaction::rejected(format!(
                "transition from {} to {} is not allowed now",
                self.mode, target
            ));
        }
        Reaction::accepted(self.perform_transition(target, reason, false))
    }

    /// Transition that skips the validity table.
    pub fn force_transition(&mut self, target: Mode) -> Reaction {
        if target == self.mode {
            return Reaction::new(Outcome::Accepted);
        }
        Reaction::accepted(self.perform_transition(target, "forced".to_string(), true))
    }

    fn perform_transition(&mut self, target: Mode, reason: String, forced: bool) -> Vec<Effect> {
        let from = self.mode;
        let id = Uuid::new_v4();
        self.transition = TransitionState::Transitioning { id, from, to: target };

        self.states.ensure(target);
        let bundle = handoff::extract(from, &self.states, &self.context);
        handoff::apply(&bundle, target, &mut self.states);
        let missing = handoff::missing_user_messages(&bundle, target, &self.states);

        self.mode = target;
        self.pending_transition = None;
        self.transitions.push(TransitionRecord {
            id,
            from,
            to: target,
            reason,
            forced,
            at: Utc::now(),
        });
        info!(%from, to = %target, forced, "Mode transition");
        self.record(
            UnifiedMessage::system(format!("Switched from {} to {} mode", from, target), target)
                .with_meta(meta::TRANSITION_ID, id.to_string()),
        );

        if !missing.is_empty() {
            warn!(missing = missing.len(), "Handoff lost user messages");
            self.transition = TransitionState::Error {
                reason: format!("{} user message(s) missing after handoff", missing.len()),
            };
            return Vec::new();
        }

        if self.config.transition_settle.is_zero() {
            self.transition = TransitionState::Stable;
            Vec::new()
        } else {
            vec![Effect::SettleTransition {
                id,
                after: self.config.transition_settle,
            }]
        }
    }

    fn on_settled(&mut self, id: Uuid) -> Reaction {
        match self.transition {
            TransitionState::Transitioning { id: current, .. } if current == id => {
                self.transition = TransitionState::Stable;
                Reaction::new(Outcome::Accepted)
            }
            _ => Reaction::new(Outcome::Ignored),
        }
    }

    /// Offer a transition to the user, or take it when auto-confirm is on.
    fn propose(&mut self, target: Mode, reason: &str) -> Vec<Effect> {
        if target == self.mode || self.transition.is_transitioning() {
            return Vec::new();
        }
        if matches!(self.pending_transition, Some(ref p) if p.target == target) {
            return Vec::new();
        }

        let pending = PendingTransition::new(target, reason);
        debug!(id = %pending.id, to = %target, "Proposing transition");
        self.record(
            UnifiedMessage::system(reason, self.mode).with_meta(meta::TRANSITION_ID, pending.id.to_string()),
        );
        self.pending_transition = Some(pending);

        if self.config.auto_confirm_transitions || self.context.preferences.auto_transition {
            return self.confirm_transition().effects;
        }
        Vec::new()
    }

    /// Perform the pending proposal. A rejected proposal stays pending.
    pub fn confirm_transition(&mut self) -> Reaction {
        let Some(pending) = self.pending_transition.clone() else {
            return Reaction::new(Outcome::Ignored);
        };
        self.request_transition(pending.target, pending.reason)
    }

    fn cancel_transition(&mut self, id: Uuid) -> Reaction {
        if matches!(self.pending_transition, Some(ref p) if p.id == id) {
            self.pending_transition = None;
            return Reaction::new(Outcome::Accepted);
        }
        match self.transition {
            TransitionState::Transitioning { id: current, .. } if current == id => {
                self.transition = TransitionState::Stable;
                Reaction::new(Outcome::Accepted)
            }
            _ => Reaction::new(Outcome::Ignored),
        }
    }

    // ========================================================================
    // Task queue
    // ========================================================================

    fn enqueue(&mut self, action: AgentAction, priority: Option<TaskPriority>, dependencies: Vec<Uuid>) -> Reaction {
        let priority = priority.unwrap_or_else(|| TaskPriority::for_action(&action));
        match self.queue.enqueue(AgentTask::new(action, priority), dependencies) {
            Ok(id) => Reaction::new(Outcome::Enqueued(id)),
            Err(e) => Reaction::rejected(e.to_string()),
        }
    }

    /// Start a drain now, or once the one in flight finishes.
    fn drain_or_defer(&mut self) -> Vec<Effect> {
        let reaction = self.start_drain();
        if reaction.outcome == Outcome::DrainSkipped {
            self.auto_drain = true;
        }
        reaction.effects
    }

    fn start_drain(&mut self) -> Reaction {
        let (drain_id, run, gated, finished) = match self.queue.start_drain(self.config.max_concurrent_tasks) {
            DrainStart::Skipped => return Reaction::new(Outcome::DrainSkipped),
            DrainStart::Started {
                drain_id,
                run,
                gated,
                finished,
            } => (drain_id, run, gated, finished),
        };
        info!(%drain_id, run = run.len(), gated = gated.len(), "Processing queue");

        let mut effects = self.dispatch_tasks(drain_id, run, gated);
        if finished {
            effects.push(Effect::DrainFinished {
                drain_id,
                results: Vec::new(),
            });
        }
        Reaction::with_effects(Outcome::DrainStarted(drain_id), effects)
    }

    /// Raise approval requests for gated tasks and run the started ones.
    fn dispatch_tasks(&mut self, drain_id: Uuid, run: Vec<AgentTask>, gated: Vec<AgentTask>) -> Vec<Effect> {
        let mut effects = Vec::new();
        for task in &gated {
            let request = self.approvals.request_approval(task);
            self.record(
                UnifiedMessage::status(
                    format!("⏸ {} ({:?} impact)", request.message, request.impact),
                    Mode::Agentic,
                    task.id,
                )
                .with_meta(meta::APPROVAL_ID, request.id.to_string()),
            );
        }
        if !run.is_empty() {
            self.context
                .apply(ContextUpdate::TaskStatus(format!("Executing {} task(s)", run.len())));
        }
        effects.extend(run.into_iter().map(|task| Effect::RunTask { drain_id, task }));
        self.settle_agent_state();

        if !gated.is_empty() && self.mode == Mode::Agentic {
            effects.extend(self.propose(Mode::Hybrid, APPROVAL_PROPOSAL));
        }
        effects
    }

    fn cancel_drain(&mut self, drain_id: Uuid) -> Reaction {
        match self.queue.cancel_drain(drain_id) {
            Some(tasks) => {
                info!(%drain_id, tasks = tasks.len(), "Cancelling drain");
                Reaction::accepted(vec![Effect::CancelDrain { drain_id }])
            }
            None => Reaction::new(Outcome::Ignored),
        }
    }

    fn retry(&mut self, task_id: Uuid) -> Reaction {
        match self.queue.retry(task_id) {
            Ok(task) => {
                self.record(UnifiedMessage::status(
                    format!("🔁 Retrying: {} (attempt {})", task.action.description, task.attempts + 1),
                    Mode::Agentic,
                    task.id,
                ));
                Reaction::new(Outcome::Enqueued(task.id))
            }
            Err(e) => Reaction::rejected(e.to_string()),
        }
    }

    fn on_task_finished(&mut self, task_id: Uuid, outcome: TaskOutcome) -> Reaction {
        let Some(finished) = self.queue.finish(task_id, outcome) else {
            return Reaction::new(Outcome::Ignored);
        };
        let task = finished.task;
        self.report_terminal(&task);

        let mut effects = Vec::new();
        if let Some(drain_id) = finished.drain_id {
            if !finished.run.is_empty() || !finished.gated.is_empty() {
                effects.extend(self.dispatch_tasks(drain_id, finished.run, finished.gated));
            }
        }

        if let Some(follow_on_id) = task.action.follow_on_id {
            if task.status == TaskStatus::Succeeded {
                self.follow_ons.complete(follow_on_id);
            } else {
                self.follow_ons.abandon(follow_on_id);
            }
            self.sync_follow_ons();
        }
        effects.extend(self.refresh_follow_ons());

        if let Some((drain_id, results)) = finished.drain_done {
            effects.extend(self.finish_drain(drain_id, results));
        }
        self.settle_agent_state();
        Reaction::accepted(effects)
    }

    /// Post the single status message for a terminal task.
    fn report_terminal(&mut self, task: &AgentTask) {
        let action_type = task.action.action_type;
        let message = match (&task.output, &task.error) {
            (Some(output), _) if task.status == TaskStatus::Succeeded => {
                self.context.apply(ContextUpdate::TaskStatus(format!(
                    "{} completed",
                    task.action.description
                )));
                UnifiedMessage::status(
                    format!("✅ {}: {}", action_type.completion_message(), output.summary()),
                    Mode::Agentic,
                    task.id,
                )
            }
            _ => {
                let error = task.error.clone().unwrap_or_else(|| "unknown error".to_string());
                let suggestions = agentic::recovery_suggestions(&error, action_type);
                if let Some(agentic) = self.states.agentic.as_mut() {
                    agentic.recovery_suggestions = suggestions.clone();
                }
                self.context.apply(ContextUpdate::TaskStatus(format!(
                    "{} failed",
                    task.action.description
                )));
                UnifiedMessage::status(
                    format!("❌ {} failed: {}", task.action.description, error),
                    Mode::Agentic,
                    task.id,
                )
                .with_meta(meta::SUGGESTIONS, suggestions)
            }
        };
        self.record(message);
    }

    fn finish_drain(&mut self, drain_id: Uuid, results: Vec<TaskResult>) -> Vec<Effect> {
        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        info!(%drain_id, succeeded, failed = results.len() - succeeded, "Drain finished");

        let mut effects = vec![Effect::DrainFinished { drain_id, results }];
        if std::mem::take(&mut self.auto_drain) && self.queue.has_ready() {
            effects.extend(self.drain_or_defer());
        }
        effects
    }

    // ========================================================================
    // Approvals
    // ========================================================================

    fn resolve_approval(&mut self, request_id: Uuid, approved: bool) -> Reaction {
        let resolution = match self.approvals.resolve(request_id, approved) {
            Ok(resolution) => resolution,
            Err(e) => return Reaction::rejected(e.to_string()),
        };
        let task_id = resolution.task_id;
        let mut effects = Vec::new();

        if approved {
            if let Err(e) = self.queue.approve(task_id) {
                warn!(error = %e, "Approved task was not waiting");
                return Reaction::rejected(e.to_string());
            }
            let description = self
                .queue
                .get(task_id)
                .map(|t| t.action.description.clone())
                .unwrap_or_default();
            self.record(UnifiedMessage::status(
                format!("👍 Approved: {}", description),
                Mode::Agentic,
                task_id,
            ));
        } else {
            let task = match self.queue.decline(task_id, USER_DECLINED) {
                Ok(task) => task,
                Err(e) => return Reaction::rejected(e.to_string()),
            };
            self.record(UnifiedMessage::status(
                format!("🚫 {} was declined", task.action.description),
                Mode::Agentic,
                task.id,
            ));
            if let Some(follow_on_id) = task.action.follow_on_id {
                self.follow_ons.abandon(follow_on_id);
            }
            effects.extend(self.refresh_follow_ons());
        }

        self.settle_agent_state();
        Reaction::accepted(effects)
    }

    // ========================================================================
    // Follow-on actions
    // ========================================================================

    fn follow_on_context(&self) -> FollowOnContext {
        FollowOnContext {
            phase: self.context.phase,
            requirements: self.context.requirements.clone(),
            completed_titles: self.follow_ons.completed_titles().to_vec(),
            task_status: self.context.task_status.clone(),
            max_actions: self.config.max_contextual_suggestions,
            ttl_secs: self.config.follow_on_ttl_secs,
        }
    }

    fn generate_effect(&self) -> Effect {
        Effect::GenerateFollowOns {
            acquisition_id: self.context.acquisition_id,
            context: self.follow_on_context(),
        }
    }

    /// Generate a new set unless one is already being generated.
    fn regenerate_follow_ons(&mut self) -> Reaction {
        if self.follow_ons.begin_generation() {
            Reaction::accepted(vec![self.generate_effect()])
        } else {
            Reaction::new(Outcome::Ignored)
        }
    }

    /// Regenerate when the current set is exhausted.
    fn refresh_follow_ons(&mut self) -> Vec<Effect> {
        if self.follow_ons.refresh(Utc::now()) {
            debug!("Follow-on actions exhausted, regenerating");
            vec![self.generate_effect()]
        } else {
            Vec::new()
        }
    }

    fn sync_follow_ons(&mut self) {
        let ranked = self.follow_ons.ranked(Utc::now());
        self.context.apply(ContextUpdate::FollowOnActions(ranked));
    }

    fn on_follow_ons_generated(&mut self, set: FollowOnActionSet) -> Reaction {
        self.follow_ons.install(set);
        self.sync_follow_ons();

        let surfaced = self.follow_ons.surfaced(Utc::now());
        if self.context.preferences.show_follow_ons && !surfaced.is_empty() {
            self.record(UnifiedMessage::system(follow_on::describe(&surfaced), self.mode));
        }
        Reaction::new(Outcome::Accepted)
    }

    fn follow_on_title(&self, action_id: Uuid) -> String {
        self.follow_ons
            .title(action_id)
            .unwrap_or_else(|| "Follow-on action".to_string())
    }

    fn execute_follow_on(&mut self, action_id: Uuid) -> Reaction {
        let Some(action) = self.follow_ons.get(action_id, Utc::now()) else {
            return Reaction::rejected("follow-on action is not available");
        };
        if !self.follow_ons.begin(&action) {
            return Reaction::rejected("follow-on action is already running");
        }

        match follow_on::route(action.category, self.mode) {
            Route::Agentic => {
                self.states.ensure(Mode::Agentic);
                let task = AgentTask::new(AgentAction::from_follow_on(&action), action.priority.into());
                let task_id = match self.queue.enqueue(task, Vec::new()) {
                    Ok(id) => id,
                    Err(e) => {
                        self.follow_ons.abandon(action_id);
                        return Reaction::rejected(e.to_string());
                    }
                };
                debug!(%action_id, %task_id, "Follow-on routed to task queue");
                let effects = self.drain_or_defer();
                Reaction::with_effects(Outcome::Enqueued(task_id), effects)
            }
            Route::Guided => {
                debug!(%action_id, "Follow-on routed to guided handler");
                self.record(
                    UnifiedMessage::system(format!("Starting: {}", action.title), Mode::Guided)
                        .with_meta(meta::FOLLOW_ON_ID, action_id.to_string()),
                );
                Reaction::accepted(vec![Effect::ExecuteFollowOn {
                    action,
                    acquisition_id: self.context.acquisition_id,
                }])
            }
        }
    }

    fn on_follow_on_executed(&mut self, action_id: Uuid, result: Result<ExecutionResult, String>) -> Reaction {
        if !self.follow_ons.is_in_flight(action_id) {
            return Reaction::new(Outcome::Ignored);
        }
        let title = self.follow_on_title(action_id);

        let text = match result {
            Ok(result) if result.status != ExecutionStatus::Failed => {
                self.follow_ons.complete(action_id);
                let detail = result.output.map(|o| format!(": {}", o)).unwrap_or_default();
                match result.status {
                    ExecutionStatus::PendingApproval => format!("{} is waiting for approval{}", title, detail),
                    ExecutionStatus::PendingUserInput => format!("{} needs your input{}", title, detail),
                    _ => format!("✅ {} completed{}", title, detail),
                }
            }
            Ok(result) => {
                self.follow_ons.abandon(action_id);
                format!("❌ {} failed{}", title, result.output.map(|o| format!(": {}", o)).unwrap_or_default())
            }
            Err(e) => {
                self.follow_ons.abandon(action_id);
                format!("❌ {} failed: {}", title, e)
            }
        };
        self.record(UnifiedMessage::system(text, Mode::Guided).with_meta(meta::FOLLOW_ON_ID, action_id.to_string()));
        self.sync_follow_ons();
        Reaction::accepted(self.refresh_follow_ons())
    }

    fn dismiss_follow_on(&mut self, action_id: Uuid) -> Reaction {
        if !self.follow_ons.dismiss(action_id) {
            return Reaction::rejected("unknown or already dismissed follow-on action");
        }
        self.sync_follow_ons();
        Reaction::accepted(self.refresh_follow_ons())
    }

    // ========================================================================
    // Shared context
    // ========================================================================

    fn update_context(&mut self, update: ContextUpdate) -> Reaction {
        if let Some(guided) = self.states.guided.as_mut() {
            match &update {
                ContextUpdate::Phase(phase) => guided.phase = *phase,
                ContextUpdate::Requirements(requirements) => guided.requirements.merge(requirements),
                _ => {}
            }
        }
        self.context.apply(update);
        Reaction::new(Outcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ActionCategory, ActionPriority, ActionType, TaskOutput};
    use parley_providers::IntentType;
    use std::collections::HashSet;

    fn orchestrator(mode: Mode) -> Orchestrator {
        let config = OrchestratorConfig {
            initial_mode: mode,
            ..OrchestratorConfig::default()
        };
        Orchestrator::new(config, Uuid::new_v4())
    }

    fn say(o: &mut Orchestrator, text: &str) -> Reaction {
        o.handle(Event::UserMessage { text: text.to_string() })
    }

    fn walk_to_ready(o: &mut Orchestrator) {
        for input in ["Cloud hosting", "$250,000", "12 months", "Retire data center", "skip"] {
            assert!(say(o, input).outcome.is_accepted());
        }
    }

    fn user_ids(messages: &[UnifiedMessage]) -> HashSet<Uuid> {
        messages.iter().filter(|m| m.is_user()).map(|m| m.id).collect()
    }

    fn run_tasks(effects: &[Effect]) -> Vec<AgentTask> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::RunTask { task, .. } => Some(task.clone()),
                _ => None,
            })
            .collect()
    }

    fn drain_finished(effects: &[Effect]) -> Option<Vec<TaskResult>> {
        effects.iter().find_map(|e| match e {
            Effect::DrainFinished { results, .. } => Some(results.clone()),
            _ => None,
        })
    }

    fn text(s: &str) -> TaskOutcome {
        TaskOutcome::Succeeded(TaskOutput::Text { text: s.to_string() })
    }

    #[test]
    fn test_transition_table_all_pairs_from_initial_phase() {
        for from in Mode::ALL {
            for to in Mode::ALL {
                let mut o = orchestrator(from);
                let reaction = o.request_transition(to, "test".to_string());
                let expected = match (from, to) {
                    (a, b) if a == b => true,
                    (Mode::Guided, _) => false,
                    _ => true,
                };
                assert_eq!(reaction.outcome.is_accepted(), expected, "{} -> {}", from, to);
                assert_eq!(o.mode(), if expected { to } else { from });
            }
        }
    }

    #[test]
    fn test_rejected_transition_leaves_state() {
        let mut o = orchestrator(Mode::Guided);
        let before = o.snapshot();
        let reaction = o.request_transition(Mode::Agentic, "early".to_string());
        assert!(matches!(reaction.outcome, Outcome::Rejected(_)));
        assert_eq!(o.snapshot(), before);
    }

    #[test]
    fn test_ready_scenario_carries_user_messages() {
        let mut o = orchestrator(Mode::Guided);
        walk_to_ready(&mut o);
        assert_eq!(o.context().phase, GuidedPhase::ReadyToGenerate);
        let users = user_ids(o.messages());
        assert_eq!(users.len(), 5);

        let reaction = o.request_transition(Mode::Agentic, "ready".to_string());
        assert_eq!(reaction.outcome, Outcome::Accepted);
        assert_eq!(o.mode(), Mode::Agentic);
        assert!(o.transition_state().is_stable());

        let agentic = o.states().agentic.as_ref().unwrap();
        assert!(users.is_subset(&user_ids(&agentic.messages)));
    }

    #[test]
    fn test_round_trip_keeps_every_user_message() {
        let mut o = orchestrator(Mode::Guided);
        walk_to_ready(&mut o);
        o.request_transition(Mode::Agentic, "ready".to_string());
        say(&mut o, "what's the status");
        o.request_transition(Mode::Hybrid, "more input".to_string());
        say(&mut o, "add FedRAMP Moderate");
        o.request_transition(Mode::Guided, "back".to_string());
        assert_eq!(o.mode(), Mode::Guided);

        let all_users = user_ids(o.messages());
        let guided = o.states().guided.as_ref().unwrap();
        assert!(all_users.is_subset(&user_ids(&guided.messages)));
    }

    #[test]
    fn test_ready_phase_proposes_agentic() {
        let mut o = orchestrator(Mode::Guided);
        for input in ["Cloud hosting", "$250,000", "12 months", "Retire data center"] {
            say(&mut o, input);
        }
        let reaction = say(&mut o, "skip");
        let (reply_to, proposal) = reaction
            .effects
            .iter()
            .find_map(|e| match e {
                Effect::GenerateReply { reply_to, proposal, .. } => Some((*reply_to, proposal.clone())),
                _ => None,
            })
            .unwrap();
        let proposal = proposal.unwrap();
        assert_eq!(proposal.target, Mode::Agentic);

        o.handle(Event::ReplyReady {
            reply_to,
            mode: Mode::Guided,
            text: "Ready".to_string(),
            fallback: true,
            proposal: Some(proposal),
        });
        let pending = o.pending_transition().unwrap().clone();
        assert_eq!(pending.reason, READY_PROPOSAL);
        assert_eq!(o.mode(), Mode::Guided);

        assert_eq!(o.handle(Event::ConfirmTransition).outcome, Outcome::Accepted);
        assert_eq!(o.mode(), Mode::Agentic);
        assert!(o.pending_transition().is_none());
    }

    #[test]
    fn test_cancel_proposal_keeps_mode() {
        let mut o = orchestrator(Mode::Guided);
        walk_to_ready(&mut o);
        let effects = o.propose(Mode::Agentic, READY_PROPOSAL);
        assert!(effects.is_empty());
        let id = o.pending_transition().unwrap().id;

        assert_eq!(o.handle(Event::CancelTransition { id }).outcome, Outcome::Accepted);
        assert!(o.pending_transition().is_none());
        assert_eq!(o.mode(), Mode::Guided);
        assert_eq!(o.handle(Event::ConfirmTransition).outcome, Outcome::Ignored);
    }

    #[test]
    fn test_settle_delay_blocks_mutations_until_settled() {
        let config = OrchestratorConfig {
            transition_settle: Duration::from_millis(300),
            ..OrchestratorConfig::default()
        };
        let mut o = Orchestrator::new(config, Uuid::new_v4());
        let reaction = o.force_transition(Mode::Agentic);
        let id = match reaction.effects.as_slice() {
            [Effect::SettleTransition { id, .. }] => *id,
            other => panic!("unexpected effects {:?}", other),
        };
        assert!(o.transition_state().is_transitioning());
        assert!(matches!(say(&mut o, "run it").outcome, Outcome::Rejected(_)));
        assert!(matches!(o.handle(Event::ProcessQueue).outcome, Outcome::Rejected(_)));

        assert_eq!(o.handle(Event::TransitionSettled { id }).outcome, Outcome::Accepted);
        assert!(o.transition_state().is_stable());
        assert_eq!(o.mode(), Mode::Agentic);
    }

    #[test]
    fn test_cancel_in_flight_transition_restores_stable() {
        let config = OrchestratorConfig {
            transition_settle: Duration::from_millis(300),
            ..OrchestratorConfig::default()
        };
        let mut o = Orchestrator::new(config, Uuid::new_v4());
        let reaction = o.force_transition(Mode::Hybrid);
        let Some(Effect::SettleTransition { id, .. }) = reaction.effects.first().cloned() else {
            panic!("expected settle effect");
        };
        assert_eq!(o.handle(Event::CancelTransition { id }).outcome, Outcome::Accepted);
        assert!(o.transition_state().is_stable());
        assert_eq!(o.mode(), Mode::Hybrid);
        assert_eq!(o.handle(Event::TransitionSettled { id }).outcome, Outcome::Ignored);
    }

    #[test]
    fn test_hybrid_routes_commands_to_agent() {
        let mut o = orchestrator(Mode::Hybrid);
        let reaction = say(&mut o, "run the vendor search");
        assert!(matches!(reaction.effects.as_slice(), [Effect::ClassifyIntent { .. }]));
        assert_eq!(o.states().agentic.as_ref().unwrap().agent_state, AgentState::Thinking);

        let reaction = say(&mut o, "Laptops for the field office");
        assert!(matches!(reaction.effects.last(), Some(Effect::GenerateReply { mode: Mode::Guided, .. })));
        assert_eq!(o.states().guided.as_ref().unwrap().phase, GuidedPhase::GatheringBasics);
    }

    #[test]
    fn test_intent_enqueues_and_drains() {
        let mut o = orchestrator(Mode::Agentic);
        let reaction = say(&mut o, "check the status");
        let Some(Effect::ClassifyIntent { message_id, .. }) = reaction.effects.first().cloned() else {
            panic!("expected classification");
        };

        let reaction = o.handle(Event::IntentClassified {
            message_id,
            intent: Intent::new(IntentType::CheckStatus, 0.8, true),
        });
        let tasks = run_tasks(&reaction.effects);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].action.action_type, ActionType::MonitorCompliance);
        assert!(matches!(reaction.effects.last(), Some(Effect::GenerateReply { fallback, .. })
            if fallback.contains("check the status")));
        assert_eq!(o.states().agentic.as_ref().unwrap().agent_state, AgentState::Executing);

        let reaction = o.handle(Event::TaskFinished {
            task_id: tasks[0].id,
            outcome: text("score 87"),
        });
        assert_eq!(drain_finished(&reaction.effects).unwrap().len(), 1);
        let status: Vec<_> = o.messages().iter().filter(|m| m.task_id() == Some(tasks[0].id)).collect();
        assert_eq!(status.len(), 1);
    }

    #[test]
    fn test_late_intent_after_leaving_agentic_only_replies() {
        let mut o = orchestrator(Mode::Agentic);
        let reaction = say(&mut o, "check the status");
        let Some(Effect::ClassifyIntent { message_id, .. }) = reaction.effects.first().cloned() else {
            panic!("expected classification");
        };
        assert!(o.force_transition(Mode::Guided).outcome.is_accepted());

        let reaction = o.handle(Event::IntentClassified {
            message_id,
            intent: Intent::new(IntentType::CheckStatus, 0.8, true),
        });
        assert!(run_tasks(&reaction.effects).is_empty());
        assert!(matches!(reaction.effects.as_slice(), [Effect::GenerateReply { mode: Mode::Agentic, .. }]));
        let status = o.queue().status();
        assert!(status.queued.is_empty() && status.executing.is_empty());
        assert_eq!(o.mode(), Mode::Guided);
    }

    #[test]
    fn test_approval_gates_task_until_resolved() {
        let mut o = orchestrator(Mode::Agentic);
        let action = AgentAction::new(ActionType::IdentifyVendors).with_approval(true);
        let Outcome::Enqueued(task_id) = o
            .handle(Event::EnqueueAction {
                action,
                priority: Some(TaskPriority::High),
                dependencies: vec![],
            })
            .outcome
        else {
            panic!("not enqueued");
        };

        let reaction = o.handle(Event::ProcessQueue);
        assert!(run_tasks(&reaction.effects).is_empty());
        assert_eq!(drain_finished(&reaction.effects), Some(vec![]));
        let request = o.approvals().for_task(task_id).unwrap().clone();
        assert_eq!(o.pending_transition().map(|p| p.reason.as_str()), Some(APPROVAL_PROPOSAL));

        // Re-processing does not run it either
        let reaction = o.handle(Event::ProcessQueue);
        assert!(run_tasks(&reaction.effects).is_empty());

        o.handle(Event::ApprovalDecision {
            request_id: request.id,
            approved: true,
        });
        let reaction = o.handle(Event::ProcessQueue);
        let tasks = run_tasks(&reaction.effects);
        assert_eq!(tasks[0].id, task_id);

        let reaction = o.handle(Event::TaskFinished {
            task_id,
            outcome: text("3 vendors"),
        });
        let results = drain_finished(&reaction.effects).unwrap();
        assert_eq!(results[0].task_id, task_id);
        assert!(results[0].succeeded());

        // Approving twice is rejected
        let again = o.handle(Event::ApprovalDecision {
            request_id: request.id,
            approved: true,
        });
        assert!(matches!(again.outcome, Outcome::Rejected(_)));
    }

    #[test]
    fn test_reject_fails_with_user_declined() {
        let mut o = orchestrator(Mode::Hybrid);
        o.handle(Event::EnqueueAction {
            action: AgentAction::new(ActionType::SubmitForApproval),
            priority: None,
            dependencies: vec![],
        });
        o.handle(Event::ProcessQueue);
        let request = o.approvals().pending()[0].clone();

        o.handle(Event::ApprovalDecision {
            request_id: request.id,
            approved: false,
        });
        let history = o.queue().status().history;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TaskStatus::Failed);
        assert_eq!(history[0].error.as_deref(), Some(USER_DECLINED));
        assert!(o.approvals().pending().is_empty());
        // No hybrid proposal outside agentic mode
        assert!(o.pending_transition().is_none());
    }

    #[test]
    fn test_failure_adds_recovery_suggestions() {
        let mut o = orchestrator(Mode::Agentic);
        o.handle(Event::EnqueueAction {
            action: AgentAction::new(ActionType::IdentifyVendors),
            priority: None,
            dependencies: vec![],
        });
        let tasks = run_tasks(&o.handle(Event::ProcessQueue).effects);
        o.handle(Event::TaskFinished {
            task_id: tasks[0].id,
            outcome: TaskOutcome::Failed("network unreachable".to_string()),
        });

        let snapshot = o.snapshot();
        assert!(snapshot.recovery_suggestions.contains(&"Check network connection".to_string()));
        let status = snapshot.messages.last().unwrap();
        assert!(status.content.starts_with("❌"));
        assert!(status.metadata.contains_key(meta::SUGGESTIONS));
        assert_eq!(snapshot.agent_state, Some(AgentState::Idle));
    }

    #[test]
    fn test_process_queue_while_draining_is_skipped() {
        let mut o = orchestrator(Mode::Agentic);
        o.handle(Event::EnqueueAction {
            action: AgentAction::new(ActionType::IdentifyVendors),
            priority: None,
            dependencies: vec![],
        });
        assert!(matches!(o.handle(Event::ProcessQueue).outcome, Outcome::DrainStarted(_)));
        let second = o.handle(Event::ProcessQueue);
        assert_eq!(second.outcome, Outcome::DrainSkipped);
        assert!(second.effects.is_empty());
    }

    #[test]
    fn test_drain_runs_dependents_before_finishing() {
        let mut o = orchestrator(Mode::Agentic);
        let enqueue = |o: &mut Orchestrator, action_type, dependencies| match o
            .handle(Event::EnqueueAction {
                action: AgentAction::new(action_type),
                priority: None,
                dependencies,
            })
            .outcome
        {
            Outcome::Enqueued(id) => id,
            other => panic!("not enqueued: {:?}", other),
        };
        let research = enqueue(&mut o, ActionType::GatherMarketResearch, vec![]);
        let vendors = enqueue(&mut o, ActionType::IdentifyVendors, vec![research]);

        let tasks = run_tasks(&o.handle(Event::ProcessQueue).effects);
        assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![research]);

        let reaction = o.handle(Event::TaskFinished {
            task_id: research,
            outcome: text("market data"),
        });
        assert!(drain_finished(&reaction.effects).is_none());
        let next = run_tasks(&reaction.effects);
        assert_eq!(next.iter().map(|t| t.id).collect::<Vec<_>>(), vec![vendors]);

        let reaction = o.handle(Event::TaskFinished {
            task_id: vendors,
            outcome: text("3 vendors"),
        });
        let results = drain_finished(&reaction.effects).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.succeeded()));
    }

    #[test]
    fn test_hybrid_follow_on_routing() {
        let mut o = orchestrator(Mode::Hybrid);
        let vendors = FollowOnAction::new("Vendors", "Find vendors", ActionCategory::VendorManagement, ActionPriority::High);
        let review = FollowOnAction::new("Review", "Review", ActionCategory::ReviewApproval, ActionPriority::Medium);
        let (vendors_id, review_id) = (vendors.id, review.id);
        o.handle(Event::FollowOnsGenerated {
            set: FollowOnActionSet::new(vec![vendors, review]),
        });
        assert_eq!(o.context().follow_on_actions.len(), 2);

        let reaction = o.handle(Event::ExecuteFollowOn { action_id: vendors_id });
        assert!(matches!(reaction.outcome, Outcome::Enqueued(_)));
        let tasks = run_tasks(&reaction.effects);
        assert_eq!(tasks[0].action.follow_on_id, Some(vendors_id));

        let reaction = o.handle(Event::ExecuteFollowOn { action_id: review_id });
        assert!(matches!(reaction.effects.as_slice(), [Effect::ExecuteFollowOn { .. }]));
        assert!(matches!(
            o.handle(Event::ExecuteFollowOn { action_id: review_id }).outcome,
            Outcome::Rejected(_)
        ));
    }

    #[test]
    fn test_exhausted_follow_ons_regenerate_after_status() {
        let mut o = orchestrator(Mode::Agentic);
        let only = FollowOnAction::new("Vendors", "Find vendors", ActionCategory::VendorManagement, ActionPriority::High);
        let id = only.id;
        o.handle(Event::FollowOnsGenerated {
            set: FollowOnActionSet::new(vec![only]),
        });
        let tasks = run_tasks(&o.handle(Event::ExecuteFollowOn { action_id: id }).effects);

        let before = o.messages().len();
        let reaction = o.handle(Event::TaskFinished {
            task_id: tasks[0].id,
            outcome: text("3 vendors"),
        });
        // Status message first, then the regeneration it causes
        assert_eq!(o.messages()[before].task_id(), Some(tasks[0].id));
        assert!(reaction
            .effects
            .iter()
            .any(|e| matches!(e, Effect::GenerateFollowOns { context, .. } if context.completed_titles == vec!["Vendors"])));
        assert!(o.follow_ons().generation_pending());
    }

    #[test]
    fn test_guided_follow_on_execution_result() {
        let mut o = orchestrator(Mode::Guided);
        let review = FollowOnAction::new("Review", "Review", ActionCategory::ReviewApproval, ActionPriority::Medium);
        let id = review.id;
        o.handle(Event::FollowOnsGenerated {
            set: FollowOnActionSet::new(vec![review]),
        });
        o.handle(Event::ExecuteFollowOn { action_id: id });

        let reaction = o.handle(Event::FollowOnExecuted {
            action_id: id,
            result: Ok(ExecutionResult {
                action_id: id,
                status: ExecutionStatus::PendingApproval,
                output: None,
                completed_at: Utc::now(),
            }),
        });
        assert!(o.follow_ons().completed_ids().contains(&id));
        assert!(matches!(reaction.effects.as_slice(), [Effect::GenerateFollowOns { .. }]));
        assert_eq!(
            o.handle(Event::FollowOnExecuted {
                action_id: id,
                result: Err("late".to_string())
            })
            .outcome,
            Outcome::Ignored
        );
    }

    #[test]
    fn test_running_follow_on_survives_new_set() {
        let mut o = orchestrator(Mode::Guided);
        let review = FollowOnAction::new("Review", "Review", ActionCategory::ReviewApproval, ActionPriority::Medium);
        let id = review.id;
        o.handle(Event::FollowOnsGenerated {
            set: FollowOnActionSet::new(vec![review]),
        });
        o.handle(Event::ExecuteFollowOn { action_id: id });

        // A phase change replaces the set while the action runs
        say(&mut o, "Cloud hosting");
        assert_ne!(o.context().phase, GuidedPhase::Initial);
        let fresh = FollowOnAction::new("Budget", "Budget", ActionCategory::DataAnalysis, ActionPriority::High);
        o.handle(Event::FollowOnsGenerated {
            set: FollowOnActionSet::new(vec![fresh]),
        });

        let before = o.messages().len();
        let reaction = o.handle(Event::FollowOnExecuted {
            action_id: id,
            result: Ok(ExecutionResult {
                action_id: id,
                status: ExecutionStatus::Completed,
                output: None,
                completed_at: Utc::now(),
            }),
        });
        assert_eq!(reaction.outcome, Outcome::Accepted);
        assert_eq!(o.messages().len(), before + 1);
        assert!(o.messages().last().unwrap().content.contains("Review completed"));
        assert_eq!(o.follow_ons().completed_titles(), &["Review".to_string()]);
        assert!(!o.follow_ons().is_in_flight(id));
    }

    #[test]
    fn test_update_context_syncs_guided_phase() {
        let mut o = orchestrator(Mode::Guided);
        o.handle(Event::UpdateContext(ContextUpdate::Phase(GuidedPhase::ReadyToGenerate)));
        assert_eq!(o.context().phase, GuidedPhase::ReadyToGenerate);
        assert!(o.request_transition(Mode::Agentic, "ready".to_string()).outcome.is_accepted());
    }

    #[test]
    fn test_auto_confirm_takes_proposal() {
        let config = OrchestratorConfig {
            auto_confirm_transitions: true,
            ..OrchestratorConfig::default()
        };
        let mut o = Orchestrator::new(config, Uuid::new_v4());
        o.handle(Event::UpdateContext(ContextUpdate::Phase(GuidedPhase::ReadyToGenerate)));
        o.propose(Mode::Agentic, READY_PROPOSAL);
        assert_eq!(o.mode(), Mode::Agentic);
        assert_eq!(o.snapshot().transitions.len(), 1);
    }
}
