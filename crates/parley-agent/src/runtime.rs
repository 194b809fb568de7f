//! Session runtime.
//!
//! The runtime owns an [`Orchestrator`] on a single tokio task and feeds
//! it commands from one unbounded channel, so every state change happens
//! in channel order. Effects returned by the orchestrator run as separate
//! tasks; each posts exactly one result event back into the same channel.
//!
//! ## Architecture
//!
//! ```text
//! SessionHandle ──Command──> Driver (owns Orchestrator)
//!       ^                       │ effects
//!       │ watch<Snapshot>       v
//!       └──────────────── spawned work ──Event──> Driver
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_core::{AgentAction, Config, ContextUpdate, Mode, TaskPriority, UnifiedMessage, UserPreferences};
use parley_providers::{
    CompletionProvider, FollowOnActionService, Intent, IntentClassifier, IntentType,
    KeywordIntentClassifier, TaskExecutor, UnconfiguredProvider,
};

use crate::approval::ApprovalRequest;
use crate::controller::{Effect, Event, Orchestrator, OrchestratorConfig, Outcome, Snapshot};
use crate::executor::TaskRunner;
use crate::queue::TaskResult;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from the session runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The driver task has stopped.
    #[error("Session runtime has shut down")]
    Closed,

    /// A required collaborator is missing.
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

// ============================================================================
// Observer
// ============================================================================

/// Callbacks from the driver task.
///
/// Called in event order. Implementations must not block.
pub trait SessionObserver: Send + Sync {
    /// A message was appended to the transcript.
    fn on_message(&self, _message: &UnifiedMessage) {}

    /// The active mode changed.
    fn on_mode_changed(&self, _from: Mode, _to: Mode) {}

    /// A task is waiting for approval.
    fn on_approval_needed(&self, _request: &ApprovalRequest) {}

    /// A queue drain finished.
    fn on_drain_finished(&self, _results: &[TaskResult]) {}
}

/// Observer that ignores everything.
pub struct NoOpObserver;

impl SessionObserver for NoOpObserver {}

// ============================================================================
// Collaborators
// ============================================================================

/// External services a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub completion: Arc<dyn CompletionProvider>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub executor: Arc<dyn TaskExecutor>,
    pub follow_on: Arc<dyn FollowOnActionService>,
}

// ============================================================================
// Commands
// ============================================================================

enum Command {
    Dispatch {
        event: Event,
        reply: Option<oneshot::Sender<Outcome>>,
    },
    ProcessQueue {
        reply: oneshot::Sender<Vec<TaskResult>>,
    },
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Apply an event and wait for its outcome.
    pub async fn dispatch(&self, event: Event) -> RuntimeResult<Outcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Dispatch {
                event,
                reply: Some(reply),
            })
            .map_err(|_| RuntimeError::Closed)?;
        rx.await.map_err(|_| RuntimeError::Closed)
    }

    /// Queue an event without waiting.
    pub fn post(&self, event: Event) -> RuntimeResult<()> {
        self.tx
            .send(Command::Dispatch { event, reply: None })
            .map_err(|_| RuntimeError::Closed)
    }

    pub async fn send_message(&self, text: impl Into<String>) -> RuntimeResult<Outcome> {
        self.dispatch(Event::UserMessage { text: text.into() }).await
    }

    /// Validated transition. Returns whether it was accepted.
    pub async fn request_transition(&self, target: Mode, reason: impl Into<String>) -> RuntimeResult<bool> {
        let outcome = self
            .dispatch(Event::RequestTransition {
                target,
                reason: reason.into(),
            })
            .await?;
        Ok(outcome.is_accepted())
    }

    /// Forced transition. Only refused while another one is in progress.
    pub async fn transition(&self, target: Mode) -> RuntimeResult<bool> {
        let outcome = self.dispatch(Event::ForceTransition { target }).await?;
        Ok(outcome.is_accepted())
    }

    pub async fn confirm_transition(&self) -> RuntimeResult<Outcome> {
        self.dispatch(Event::ConfirmTransition).await
    }

    pub async fn cancel_transition(&self, id: Uuid) -> RuntimeResult<Outcome> {
        self.dispatch(Event::CancelTransition { id }).await
    }

    pub async fn enqueue(
        &self,
        action: AgentAction,
        priority: Option<TaskPriority>,
        dependencies: Vec<Uuid>,
    ) -> RuntimeResult<Outcome> {
        self.dispatch(Event::EnqueueAction {
            action,
            priority,
            dependencies,
        })
        .await
    }

    /// Drain ready tasks and wait for their results.
    ///
    /// Returns an empty list at once when another drain is in flight.
    pub async fn process_queue(&self) -> RuntimeResult<Vec<TaskResult>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ProcessQueue { reply })
            .map_err(|_| RuntimeError::Closed)?;
        rx.await.map_err(|_| RuntimeError::Closed)
    }

    pub async fn cancel_drain(&self, drain_id: Uuid) -> RuntimeResult<Outcome> {
        self.dispatch(Event::CancelDrain { drain_id }).await
    }

    pub async fn retry(&self, task_id: Uuid) -> RuntimeResult<Outcome> {
        self.dispatch(Event::RetryTask { task_id }).await
    }

    /// Answer an approval request.
    pub async fn resolve(&self, request_id: Uuid, approved: bool) -> RuntimeResult<Outcome> {
        self.dispatch(Event::ApprovalDecision {
            request_id,
            approved,
        })
        .await
    }

    pub async fn execute_follow_on(&self, action_id: Uuid) -> RuntimeResult<Outcome> {
        self.dispatch(Event::ExecuteFollowOn { action_id }).await
    }

    pub async fn dismiss_follow_on(&self, action_id: Uuid) -> RuntimeResult<Outcome> {
        self.dispatch(Event::DismissFollowOn { action_id }).await
    }

    pub async fn update_context(&self, update: ContextUpdate) -> RuntimeResult<Outcome> {
        self.dispatch(Event::UpdateContext(update)).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Wait until a snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> RuntimeResult<Snapshot>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let mut rx = self.subscribe();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&snapshot) {
                    return Ok(snapshot.clone());
                }
            }
            rx.changed().await.map_err(|_| RuntimeError::Closed)?;
        }
    }

    /// Stop the driver and cancel running tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`SessionHandle`].
pub struct SessionBuilder {
    config: OrchestratorConfig,
    acquisition_id: Option<Uuid>,
    preferences: Option<UserPreferences>,
    completion: Option<Arc<dyn CompletionProvider>>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    follow_on: Option<Arc<dyn FollowOnActionService>>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            acquisition_id: None,
            preferences: None,
            completion: None,
            classifier: None,
            executor: None,
            follow_on: None,
            observer: None,
        }
    }

    /// Builder with settings taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new().config(OrchestratorConfig::from(config))
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn initial_mode(mut self, mode: Mode) -> Self {
        self.config.initial_mode = mode;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn acquisition_id(mut self, id: Uuid) -> Self {
        self.acquisition_id = Some(id);
        self
    }

    pub fn preferences(mut self, preferences: UserPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Completion provider. Without one, replies use the rule-based fallback.
    pub fn completion(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion = Some(provider);
        self
    }

    /// Intent classifier. Defaults to [`KeywordIntentClassifier`].
    pub fn classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn follow_on(mut self, service: Arc<dyn FollowOnActionService>) -> Self {
        self.follow_on = Some(service);
        self
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.completion = Some(collaborators.completion);
        self.classifier = Some(collaborators.classifier);
        self.executor = Some(collaborators.executor);
        self.follow_on = Some(collaborators.follow_on);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Start the driver task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> RuntimeResult<SessionHandle> {
        let executor = self
            .executor
            .ok_or_else(|| RuntimeError::NotConfigured("task executor is required".into()))?;
        let follow_on = self
            .follow_on
            .ok_or_else(|| RuntimeError::NotConfigured("follow-on service is required".into()))?;
        let collaborators = Collaborators {
            completion: self.completion.unwrap_or_else(|| Arc::new(UnconfiguredProvider)),
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(KeywordIntentClassifier::new())),
            executor,
            follow_on,
        };
        let observer = self.observer.unwrap_or_else(|| Arc::new(NoOpObserver));

        let acquisition_id = self.acquisition_id.unwrap_or_else(Uuid::new_v4);
        let mut orchestrator = Orchestrator::new(self.config, acquisition_id);
        if let Some(preferences) = self.preferences {
            orchestrator.handle(Event::UpdateContext(ContextUpdate::Preferences(preferences)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(orchestrator.snapshot());
        let shutdown = CancellationToken::new();

        let driver = Driver {
            last_mode: orchestrator.mode(),
            orchestrator,
            runner: TaskRunner::new(collaborators.executor.clone()),
            collaborators,
            observer,
            tx: tx.downgrade(),
            snapshot_tx,
            shutdown: shutdown.clone(),
            drain_tokens: HashMap::new(),
            drain_waiters: HashMap::new(),
            seen_messages: 0,
            seen_approvals: HashSet::new(),
        };
        info!(%acquisition_id, mode = %driver.last_mode, "Starting session");
        tokio::spawn(driver.run(rx));

        Ok(SessionHandle {
            tx,
            snapshot: snapshot_rx,
            shutdown,
        })
    }
}

// ============================================================================
// Driver
// ============================================================================

struct Driver {
    orchestrator: Orchestrator,
    collaborators: Collaborators,
    runner: TaskRunner,
    observer: Arc<dyn SessionObserver>,
    /// Weak so the loop ends once every handle and in-flight effect is gone
    tx: mpsc::WeakUnboundedSender<Command>,
    snapshot_tx: watch::Sender<Snapshot>,
    shutdown: CancellationToken,
    drain_tokens: HashMap<Uuid, CancellationToken>,
    drain_waiters: HashMap<Uuid, Vec<oneshot::Sender<Vec<TaskResult>>>>,
    seen_messages: usize,
    seen_approvals: HashSet<Uuid>,
    last_mode: Mode,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let initial = self.orchestrator.handle(Event::RefreshFollowOns);
        self.interpret(initial.effects);
        self.publish();

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Session shutdown requested");
                    break;
                }
                command = rx.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
            }
            self.publish();
        }

        self.shutdown.cancel();
        info!("Session stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Dispatch { event, reply } => {
                let reaction = self.orchestrator.handle(event);
                if let Some(reply) = reply {
                    let _ = reply.send(reaction.outcome.clone());
                }
                self.interpret(reaction.effects);
            }
            Command::ProcessQueue { reply } => {
                let reaction = self.orchestrator.handle(Event::ProcessQueue);
                match reaction.outcome {
                    // Registered first: an empty drain finishes in these effects
                    Outcome::DrainStarted(drain_id) => {
                        self.drain_waiters.entry(drain_id).or_default().push(reply);
                    }
                    _ => {
                        let _ = reply.send(Vec::new());
                    }
                }
                self.interpret(reaction.effects);
            }
        }
    }

    /// Sender for effect tasks; `None` once the session is closing.
    fn sender(&self) -> Option<mpsc::UnboundedSender<Command>> {
        self.tx.upgrade()
    }

    fn interpret(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::GenerateReply {
                    reply_to,
                    mode,
                    request,
                    fallback,
                    proposal,
                } => {
                    let provider = self.collaborators.completion.clone();
                    self.spawn_effect(async move {
                        let (text, used_fallback) = match provider.complete(request).await {
                            Ok(text) if !text.trim().is_empty() => (text, false),
                            Ok(_) => (fallback, true),
                            Err(e) => {
                                debug!(
                                    error = %e,
                                    hint = e.recovery_suggestion().unwrap_or_default(),
                                    "Completion failed, using rule-based reply"
                                );
                                (fallback, true)
                            }
                        };
                        Event::ReplyReady {
                            reply_to,
                            mode,
                            text,
                            fallback: used_fallback,
                            proposal,
                        }
                    });
                }

                Effect::ClassifyIntent { message_id, text } => {
                    let classifier = self.collaborators.classifier.clone();
                    self.spawn_effect(async move {
                        let intent = classifier.classify(&text).await.unwrap_or_else(|e| {
                            warn!(error = %e, "Intent classification failed");
                            Intent::new(IntentType::AskQuestion, 0.0, false)
                        });
                        Event::IntentClassified { message_id, intent }
                    });
                }

                Effect::RunTask { drain_id, task } => {
                    let token = self
                        .drain_tokens
                        .entry(drain_id)
                        .or_insert_with(|| self.shutdown.child_token())
                        .clone();
                    let runner = self.runner.clone();
                    self.spawn_effect(async move {
                        let outcome = runner.run(&task, token).await;
                        Event::TaskFinished {
                            task_id: task.id,
                            outcome,
                        }
                    });
                }

                Effect::CancelDrain { drain_id } => {
                    if let Some(token) = self.drain_tokens.get(&drain_id) {
                        token.cancel();
                    }
                }

                Effect::DrainFinished { drain_id, results } => {
                    self.drain_tokens.remove(&drain_id);
                    self.observer.on_drain_finished(&results);
                    for waiter in self.drain_waiters.remove(&drain_id).unwrap_or_default() {
                        let _ = waiter.send(results.clone());
                    }
                }

                Effect::ExecuteFollowOn {
                    action,
                    acquisition_id,
                } => {
                    let service = self.collaborators.follow_on.clone();
                    self.spawn_effect(async move {
                        let result = service
                            .execute(&action, acquisition_id)
                            .await
                            .map_err(|e| format!("{:#}", e));
                        Event::FollowOnExecuted {
                            action_id: action.id,
                            result,
                        }
                    });
                }

                Effect::GenerateFollowOns {
                    acquisition_id,
                    context,
                } => {
                    let service = self.collaborators.follow_on.clone();
                    self.spawn_effect(async move {
                        match service.generate(acquisition_id, &context).await {
                            Ok(set) => Event::FollowOnsGenerated { set },
                            Err(e) => Event::FollowOnGenerationFailed {
                                reason: format!("{:#}", e),
                            },
                        }
                    });
                }

                Effect::SettleTransition { id, after } => {
                    self.spawn_effect(async move {
                        tokio::time::sleep(after).await;
                        Event::TransitionSettled { id }
                    });
                }
            }
        }
    }

    /// Run effect work and post the event it produces.
    fn spawn_effect<F>(&self, work: F)
    where
        F: std::future::Future<Output = Event> + Send + 'static,
    {
        let Some(tx) = self.sender() else {
            return;
        };
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                event = work => {
                    let _ = tx.send(Command::Dispatch { event, reply: None });
                }
            }
        });
    }

    /// Publish a snapshot and notify the observer of what changed.
    fn publish(&mut self) {
        let snapshot = self.orchestrator.snapshot();

        for message in snapshot.messages.iter().skip(self.seen_messages) {
            self.observer.on_message(message);
        }
        self.seen_messages = snapshot.messages.len();

        for request in &snapshot.pending_approvals {
            if self.seen_approvals.insert(request.id) {
                self.observer.on_approval_needed(request);
            }
        }

        if snapshot.mode != self.last_mode {
            self.observer.on_mode_changed(self.last_mode, snapshot.mode);
            self.last_mode = snapshot.mode;
        }

        self.snapshot_tx.send_replace(snapshot);
    }
}
