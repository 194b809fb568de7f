//! Task execution.
//!
//! [`TaskRunner`] bridges the task queue with the
//! [`TaskExecutor`] collaborator. Every call produces exactly one
//! [`TaskOutcome`]: executor errors, panics and cancellation all become
//! `Failed` with a captured message.
//!
//! ## Example
//!
//! ```ignore
//! use parley_agent::TaskRunner;
//! use parley_providers::SimulatedTaskExecutor;
//! use tokio_util::sync::CancellationToken;
//! use std::sync::Arc;
//!
//! let runner = TaskRunner::new(Arc::new(SimulatedTaskExecutor::default()));
//! let outcome = runner.run(&task, CancellationToken::new()).await;
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::AgentTask;
use parley_providers::TaskExecutor;

use crate::queue::TaskOutcome;

/// Error text recorded for a task whose drain was cancelled.
pub const CANCELLED: &str = "cancelled";

/// Runs tasks on a [`TaskExecutor`].
#[derive(Clone)]
pub struct TaskRunner {
    executor: Arc<dyn TaskExecutor>,
}

impl TaskRunner {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self { executor }
    }

    /// Run one task to a terminal outcome.
    pub async fn run(&self, task: &AgentTask, cancel: CancellationToken) -> TaskOutcome {
        info!(task_id = %task.id, action = ?task.action.action_type, attempt = task.attempts, "Running task");

        let work = AssertUnwindSafe(self.executor.run(&task.action)).catch_unwind();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(task_id = %task.id, "Task cancelled");
                TaskOutcome::Failed(CANCELLED.to_string())
            }
            result = work => match result {
                Ok(Ok(output)) => TaskOutcome::Succeeded(output),
                Ok(Err(e)) => {
                    warn!(task_id = %task.id, error = %e, "Task failed");
                    TaskOutcome::Failed(format!("{:#}", e))
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    warn!(task_id = %task.id, %message, "Task panicked");
                    TaskOutcome::Failed(format!("task panicked: {}", message))
                }
            },
        };

        info!(
            task_id = %task.id,
            success = matches!(outcome, TaskOutcome::Succeeded(_)),
            "Task completed"
        );
        outcome
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::{ActionType, AgentAction, TaskOutput};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockExecutor {
        calls: AtomicUsize,
        behaviour: Behaviour,
    }

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    impl MockExecutor {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                behaviour,
            })
        }
    }

    #[async_trait]
    impl TaskExecutor for MockExecutor {
        async fn run(&self, action: &AgentAction) -> anyhow::Result<TaskOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed => Ok(TaskOutput::Text {
                    text: action.description.clone(),
                }),
                Behaviour::Fail => Err(anyhow::anyhow!("network unreachable")),
                Behaviour::Panic => panic!("executor exploded"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }
    }

    fn task() -> AgentTask {
        AgentTask::for_action(AgentAction::new(ActionType::IdentifyVendors))
    }

    #[tokio::test]
    async fn test_success() {
        let executor = MockExecutor::new(Behaviour::Succeed);
        let runner = TaskRunner::new(executor.clone());
        let outcome = runner.run(&task(), CancellationToken::new()).await;
        assert!(matches!(outcome, TaskOutcome::Succeeded(TaskOutput::Text { .. })));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_is_captured() {
        let runner = TaskRunner::new(MockExecutor::new(Behaviour::Fail));
        let outcome = runner.run(&task(), CancellationToken::new()).await;
        assert_eq!(outcome, TaskOutcome::Failed("network unreachable".to_string()));
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let runner = TaskRunner::new(MockExecutor::new(Behaviour::Panic));
        match runner.run(&task(), CancellationToken::new()).await {
            TaskOutcome::Failed(message) => assert!(message.contains("executor exploded")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation() {
        let runner = TaskRunner::new(MockExecutor::new(Behaviour::Hang));
        let token = CancellationToken::new();
        token.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), runner.run(&task(), token))
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Failed(CANCELLED.to_string()));
    }
}
