//! Task queue.
//!
//! Every live task sits in exactly one [`Slot`]; the slot is a field of
//! the single entry keyed by task id, so a task cannot be queued,
//! awaiting approval and executing at the same time. Terminal tasks
//! leave the entry map and are appended to the history.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use parley_core::{ActionType, AgentTask, TaskOutput, TaskStatus};

/// Where a live task currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Queued,
    AwaitingApproval,
    Executing,
}

/// Final outcome reported by the task runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Succeeded(TaskOutput),
    Failed(String),
}

/// Result of one task in a drain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub action_type: ActionType,
    pub status: TaskStatus,
    pub output: Option<TaskOutput>,
    pub error: Option<String>,
}

impl TaskResult {
    fn from_task(task: &AgentTask) -> Self {
        Self {
            task_id: task.id,
            action_type: task.action.action_type,
            status: task.status,
            output: task.output.clone(),
            error: task.error.clone(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Errors from queue operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Task {0} is already in the queue")]
    DuplicateTask(Uuid),

    #[error("Unknown task {0}")]
    UnknownTask(Uuid),

    #[error("Task {0} has not failed and cannot be retried")]
    NotRetryable(Uuid),

    #[error("Task {task_id} reached the retry limit of {limit}")]
    RetryLimit { task_id: Uuid, limit: u32 },

    #[error("Task {0} is not awaiting approval")]
    NotAwaitingApproval(Uuid),
}

#[derive(Debug, Clone)]
struct Entry {
    task: AgentTask,
    dependencies: Vec<Uuid>,
    seq: u64,
    slot: Slot,
    approved: bool,
}

/// The drain currently in flight.
#[derive(Debug, Clone)]
struct Drain {
    id: Uuid,
    limit: usize,
    pending: HashSet<Uuid>,
    results: Vec<TaskResult>,
    cancelled: bool,
}

/// Outcome of asking the queue to start a drain.
#[derive(Debug, Clone, PartialEq)]
pub enum DrainStart {
    /// Another drain is in flight
    Skipped,
    Started {
        drain_id: Uuid,
        /// Tasks moved to `Executing`, in dispatch order
        run: Vec<AgentTask>,
        /// Tasks moved to `AwaitingApproval`
        gated: Vec<AgentTask>,
        /// True when nothing was started and the drain is already over
        finished: bool,
    },
}

/// A task that reached a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    pub task: AgentTask,
    /// Drain the task ran in
    pub drain_id: Option<Uuid>,
    /// Tasks the drain started in the freed slots
    pub run: Vec<AgentTask>,
    /// Tasks the drain moved to `AwaitingApproval`
    pub gated: Vec<AgentTask>,
    /// Set when the drain has no pending or startable task left
    pub drain_done: Option<(Uuid, Vec<TaskResult>)>,
}

/// Queue status as shown to the surrounding app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queued: Vec<AgentTask>,
    pub awaiting_approval: Vec<AgentTask>,
    pub executing: Vec<AgentTask>,
    pub history: Vec<AgentTask>,
    pub active_drain: Option<Uuid>,
}

impl QueueStatus {
    pub fn succeeded(&self) -> usize {
        self.history.iter().filter(|t| t.status == TaskStatus::Succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.history.iter().filter(|t| t.status == TaskStatus::Failed).count()
    }
}

/// Priority task queue with dependencies, approval slots and a drain guard.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    entries: HashMap<Uuid, Entry>,
    history: Vec<AgentTask>,
    next_seq: u64,
    max_retries: u32,
    drain: Option<Drain>,
}

impl TaskQueue {
    pub fn new(max_retries: u32) -> Self {
        Self {
            entries: HashMap::new(),
            history: Vec::new(),
            next_seq: 0,
            max_retries,
            drain: None,
        }
    }

    fn push_entry(&mut self, task: AgentTask, dependencies: Vec<Uuid>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            task.id,
            Entry {
                task,
                dependencies,
                seq,
                slot: Slot::Queued,
                approved: false,
            },
        );
    }

    /// Add a task. It becomes ready once every dependency has succeeded.
    pub fn enqueue(&mut self, mut task: AgentTask, dependencies: Vec<Uuid>) -> Result<Uuid, QueueError> {
        if self.entries.contains_key(&task.id) {
            return Err(QueueError::DuplicateTask(task.id));
        }
        task.status = TaskStatus::Queued;
        let id = task.id;
        debug!(task_id = %id, priority = ?task.priority, deps = dependencies.len(), "Enqueued task");
        self.push_entry(task, dependencies);
        Ok(id)
    }

    /// Latest terminal record for a task id.
    pub fn latest(&self, task_id: Uuid) -> Option<&AgentTask> {
        self.history.iter().rev().find(|t| t.id == task_id)
    }

    fn dependency_met(&self, dep: Uuid) -> bool {
        !self.entries.contains_key(&dep)
            && self
                .latest(dep)
                .map(|t| t.status == TaskStatus::Succeeded)
                .unwrap_or(false)
    }

    /// Ids of ready tasks: priority first, then insertion order.
    pub fn ready(&self) -> Vec<Uuid> {
        let mut ready: Vec<&Entry> = self
            .entries
            .values()
            .filter(|e| e.slot == Slot::Queued)
            .filter(|e| e.dependencies.iter().all(|d| self.dependency_met(*d)))
            .collect();
        ready.sort_by(|a, b| b.task.priority.cmp(&a.task.priority).then(a.seq.cmp(&b.seq)));
        ready.into_iter().map(|e| e.task.id).collect()
    }

    /// Where a live task is, if it is live.
    pub fn slot(&self, task_id: Uuid) -> Option<Slot> {
        self.entries.get(&task_id).map(|e| e.slot)
    }

    /// Live task by id.
    pub fn get(&self, task_id: Uuid) -> Option<&AgentTask> {
        self.entries.get(&task_id).map(|e| &e.task)
    }

    pub fn executing_count(&self) -> usize {
        self.entries.values().filter(|e| e.slot == Slot::Executing).count()
    }

    pub fn is_executing(&self) -> bool {
        self.executing_count() > 0
    }

    pub fn has_ready(&self) -> bool {
        !self.ready().is_empty()
    }

    /// Id of the drain in flight.
    pub fn active_drain(&self) -> Option<Uuid> {
        self.drain.as_ref().map(|d| d.id)
    }

    /// Start a drain unless one is in flight.
    ///
    /// Ready tasks that need an approval they do not have yet are moved to
    /// `AwaitingApproval`; the others start, up to `limit` executing at once.
    /// The drain keeps filling freed slots until nothing ready is left.
    pub fn start_drain(&mut self, limit: usize) -> DrainStart {
        if let Some(ref drain) = self.drain {
            debug!(drain_id = %drain.id, "Drain already in flight");
            return DrainStart::Skipped;
        }

        let drain_id = Uuid::new_v4();
        let (run, gated) = self.dispatch(limit);

        let finished = run.is_empty();
        if !finished {
            self.drain = Some(Drain {
                id: drain_id,
                limit,
                pending: run.iter().map(|t| t.id).collect(),
                results: Vec::new(),
                cancelled: false,
            });
        }
        debug!(%drain_id, run = run.len(), gated = gated.len(), "Started drain");

        DrainStart::Started {
            drain_id,
            run,
            gated,
            finished,
        }
    }

    /// Move ready tasks into `Executing` or `AwaitingApproval`.
    fn dispatch(&mut self, limit: usize) -> (Vec<AgentTask>, Vec<AgentTask>) {
        let mut capacity = limit.saturating_sub(self.executing_count());
        let mut run = Vec::new();
        let mut gated = Vec::new();

        for id in self.ready() {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if entry.task.action.requires_approval && !entry.approved {
                entry.slot = Slot::AwaitingApproval;
                gated.push(entry.task.clone());
            } else if capacity > 0 {
                capacity -= 1;
                entry.slot = Slot::Executing;
                entry.task.status = TaskStatus::Executing;
                entry.task.attempts += 1;
                run.push(entry.task.clone());
            }
        }
        (run, gated)
    }

    /// Record the outcome of an executing task.
    ///
    /// Returns `None` when the task is not executing, so a late or
    /// duplicate report never creates a second history entry.
    pub fn finish(&mut self, task_id: Uuid, outcome: TaskOutcome) -> Option<Finished> {
        if self.slot(task_id) != Some(Slot::Executing) {
            debug!(%task_id, "Ignoring outcome for a task that is not executing");
            return None;
        }
        let mut task = self.entries.remove(&task_id)?.task;
        match outcome {
            TaskOutcome::Succeeded(output) => {
                task.status = TaskStatus::Succeeded;
                task.output = Some(output);
                task.error = None;
            }
            TaskOutcome::Failed(error) => {
                task.status = TaskStatus::Failed;
                task.output = None;
                task.error = Some(error);
            }
        }
        task.finished_at = Some(Utc::now());
        self.history.push(task.clone());

        let mut finished = Finished {
            task,
            drain_id: None,
            run: Vec::new(),
            gated: Vec::new(),
            drain_done: None,
        };
        let Some(drain) = self.drain.as_mut() else {
            return Some(finished);
        };
        if !drain.pending.remove(&task_id) {
            return Some(finished);
        }
        drain.results.push(TaskResult::from_task(&finished.task));
        let (limit, cancelled) = (drain.limit, drain.cancelled);

        if !cancelled {
            let (run, gated) = self.dispatch(limit);
            finished.run = run;
            finished.gated = gated;
        }
        if let Some(drain) = self.drain.as_mut() {
            finished.drain_id = Some(drain.id);
            drain.pending.extend(finished.run.iter().map(|t| t.id));
            if drain.pending.is_empty() {
                finished.drain_done = self.drain.take().map(|d| (d.id, d.results));
            }
        }
        if !finished.run.is_empty() {
            debug!(started = finished.run.len(), "Drain filled freed slots");
        }

        Some(finished)
    }

    /// Mark the drain cancelled and return the tasks still executing in it.
    pub fn cancel_drain(&mut self, drain_id: Uuid) -> Option<Vec<Uuid>> {
        let drain = self.drain.as_mut().filter(|d| d.id == drain_id)?;
        drain.cancelled = true;
        Some(drain.pending.iter().copied().collect())
    }

    /// Whether the drain in flight was cancelled.
    pub fn drain_cancelled(&self) -> bool {
        self.drain.as_ref().map(|d| d.cancelled).unwrap_or(false)
    }

    /// Return an approved task to the ready set.
    pub fn approve(&mut self, task_id: Uuid) -> Result<(), QueueError> {
        let entry = self
            .entries
            .get_mut(&task_id)
            .ok_or(QueueError::UnknownTask(task_id))?;
        if entry.slot != Slot::AwaitingApproval {
            return Err(QueueError::NotAwaitingApproval(task_id));
        }
        entry.slot = Slot::Queued;
        entry.approved = true;
        Ok(())
    }

    /// Fail a task that was waiting for approval.
    pub fn decline(&mut self, task_id: Uuid, reason: &str) -> Result<AgentTask, QueueError> {
        match self.slot(task_id) {
            Some(Slot::AwaitingApproval) => {}
            Some(_) => return Err(QueueError::NotAwaitingApproval(task_id)),
            None => return Err(QueueError::UnknownTask(task_id)),
        }
        let mut task = self
            .entries
            .remove(&task_id)
            .ok_or(QueueError::UnknownTask(task_id))?
            .task;
        task.status = TaskStatus::Failed;
        task.error = Some(reason.to_string());
        task.finished_at = Some(Utc::now());
        self.history.push(task.clone());
        Ok(task)
    }

    /// Re-queue a failed task under the same id.
    pub fn retry(&mut self, task_id: Uuid) -> Result<AgentTask, QueueError> {
        if self.entries.contains_key(&task_id) {
            return Err(QueueError::NotRetryable(task_id));
        }
        let last = self.latest(task_id).ok_or(QueueError::UnknownTask(task_id))?;
        if last.status != TaskStatus::Failed {
            return Err(QueueError::NotRetryable(task_id));
        }
        let retries = self.history.iter().filter(|t| t.id == task_id).count() as u32 - 1;
        if retries >= self.max_retries {
            return Err(QueueError::RetryLimit {
                task_id,
                limit: self.max_retries,
            });
        }

        let mut task = last.clone();
        task.status = TaskStatus::Queued;
        task.output = None;
        task.error = None;
        task.finished_at = None;
        // Dependencies were met when the task first ran
        self.push_entry(task.clone(), Vec::new());
        Ok(task)
    }

    /// Snapshot of the queue.
    pub fn status(&self) -> QueueStatus {
        let mut live: Vec<&Entry> = self.entries.values().collect();
        live.sort_by_key(|e| e.seq);
        let collect = |slot: Slot| -> Vec<AgentTask> {
            live.iter()
                .filter(|e| e.slot == slot)
                .map(|e| e.task.clone())
                .collect()
        };
        QueueStatus {
            queued: collect(Slot::Queued),
            awaiting_approval: collect(Slot::AwaitingApproval),
            executing: collect(Slot::Executing),
            history: self.history.clone(),
            active_drain: self.active_drain(),
        }
    }

    /// Find a live or historical task by id prefix.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<Uuid> {
        let prefix = prefix.to_ascii_lowercase();
        let mut ids: Vec<Uuid> = self
            .entries
            .keys()
            .copied()
            .chain(self.history.iter().map(|t| t.id))
            .filter(|id| id.to_string().starts_with(&prefix))
            .collect();
        ids.sort();
        ids.dedup();
        match ids.as_slice() {
            [id] => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{AgentAction, TaskPriority};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn task(action_type: ActionType, priority: TaskPriority, approval: bool) -> AgentTask {
        AgentTask::new(AgentAction::new(action_type).with_approval(approval), priority)
    }

    fn started(start: DrainStart) -> (Uuid, Vec<AgentTask>, Vec<AgentTask>) {
        match start {
            DrainStart::Started {
                drain_id, run, gated, ..
            } => (drain_id, run, gated),
            DrainStart::Skipped => panic!("drain was skipped"),
        }
    }

    fn text(s: &str) -> TaskOutcome {
        TaskOutcome::Succeeded(TaskOutput::Text { text: s.to_string() })
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = TaskQueue::new(3);
        let low = queue.enqueue(task(ActionType::ScheduleReviews, TaskPriority::Low, false), vec![]).unwrap();
        let first = queue.enqueue(task(ActionType::IdentifyVendors, TaskPriority::Normal, false), vec![]).unwrap();
        let high = queue.enqueue(task(ActionType::MonitorCompliance, TaskPriority::High, false), vec![]).unwrap();
        let second = queue.enqueue(task(ActionType::GatherMarketResearch, TaskPriority::Normal, false), vec![]).unwrap();

        assert_eq!(queue.ready(), vec![high, first, second, low]);

        let (_, run, _) = started(queue.start_drain(2));
        let ids: Vec<Uuid> = run.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![high, first]);
        assert_eq!(queue.executing_count(), 2);
    }

    #[test]
    fn test_dependencies_gate_readiness() {
        let mut queue = TaskQueue::new(3);
        let research = queue.enqueue(task(ActionType::GatherMarketResearch, TaskPriority::Normal, false), vec![]).unwrap();
        let vendors = queue
            .enqueue(task(ActionType::IdentifyVendors, TaskPriority::Critical, false), vec![research])
            .unwrap();

        assert_eq!(queue.ready(), vec![research]);
        let (drain_id, run, _) = started(queue.start_drain(5));
        assert_eq!(run.len(), 1);

        // The dependent starts in the same drain
        let finished = queue.finish(research, text("done")).unwrap();
        assert!(finished.drain_done.is_none());
        assert_eq!(finished.drain_id, Some(drain_id));
        assert_eq!(finished.run.iter().map(|t| t.id).collect::<Vec<_>>(), vec![vendors]);
        assert_eq!(queue.slot(vendors), Some(Slot::Executing));

        let finished = queue.finish(vendors, text("done")).unwrap();
        let (done_id, results) = finished.drain_done.unwrap();
        assert_eq!(done_id, drain_id);
        let ids: Vec<Uuid> = results.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, vec![research, vendors]);
    }

    #[test]
    fn test_drain_fills_freed_slots_until_empty() {
        let mut queue = TaskQueue::new(3);
        let ids: Vec<Uuid> = (0..5)
            .map(|_| {
                queue
                    .enqueue(task(ActionType::IdentifyVendors, TaskPriority::Normal, false), vec![])
                    .unwrap()
            })
            .collect();

        let (drain_id, run, _) = started(queue.start_drain(3));
        assert_eq!(run.len(), 3);

        let mut results = None;
        let mut executing: Vec<Uuid> = run.iter().map(|t| t.id).collect();
        while let Some(id) = executing.pop() {
            let finished = queue.finish(id, text("ok")).unwrap();
            assert!(queue.executing_count() <= 3);
            executing.extend(finished.run.iter().map(|t| t.id));
            if let Some(done) = finished.drain_done {
                results = Some(done);
            }
        }

        let (done_id, results) = results.unwrap();
        assert_eq!(done_id, drain_id);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| ids.contains(&r.task_id)));
        assert!(queue.ready().is_empty());
        assert_eq!(queue.active_drain(), None);
    }

    #[test]
    fn test_cancelled_drain_does_not_refill() {
        let mut queue = TaskQueue::new(3);
        let first = queue.enqueue(task(ActionType::IdentifyVendors, TaskPriority::High, false), vec![]).unwrap();
        let second = queue.enqueue(task(ActionType::ScheduleReviews, TaskPriority::Normal, false), vec![]).unwrap();

        let (drain_id, run, _) = started(queue.start_drain(1));
        assert_eq!(run[0].id, first);
        queue.cancel_drain(drain_id).unwrap();

        let finished = queue.finish(first, TaskOutcome::Failed("cancelled".to_string())).unwrap();
        assert!(finished.run.is_empty());
        assert!(finished.drain_done.is_some());
        assert_eq!(queue.slot(second), Some(Slot::Queued));
    }

    #[test]
    fn test_failed_dependency_blocks() {
        let mut queue = TaskQueue::new(3);
        let research = queue.enqueue(task(ActionType::GatherMarketResearch, TaskPriority::Normal, false), vec![]).unwrap();
        queue
            .enqueue(task(ActionType::IdentifyVendors, TaskPriority::Normal, false), vec![research])
            .unwrap();
        started(queue.start_drain(5));
        queue.finish(research, TaskOutcome::Failed("network down".to_string()));
        assert!(queue.ready().is_empty());
    }

    #[test]
    fn test_second_drain_is_skipped_while_first_runs() {
        let mut queue = TaskQueue::new(3);
        let id = queue.enqueue(task(ActionType::IdentifyVendors, TaskPriority::Normal, false), vec![]).unwrap();
        let (drain_id, _, _) = started(queue.start_drain(3));

        assert_eq!(queue.start_drain(3), DrainStart::Skipped);
        assert_eq!(queue.active_drain(), Some(drain_id));

        let finished = queue.finish(id, text("ok")).unwrap();
        let (done_id, results) = finished.drain_done.unwrap();
        assert_eq!(done_id, drain_id);
        assert_eq!(results.len(), 1);
        assert!(results[0].succeeded());
        assert_eq!(queue.active_drain(), None);
    }

    #[test]
    fn test_empty_drain_finishes_immediately() {
        let mut queue = TaskQueue::new(3);
        match queue.start_drain(3) {
            DrainStart::Started { run, finished, .. } => {
                assert!(run.is_empty());
                assert!(finished);
            }
            DrainStart::Skipped => panic!("unexpected skip"),
        }
        assert_eq!(queue.active_drain(), None);
    }

    #[test]
    fn test_approval_gate_round_trip() {
        let mut queue = TaskQueue::new(3);
        let id = queue.enqueue(task(ActionType::GenerateDocuments, TaskPriority::High, true), vec![]).unwrap();

        let (_, run, gated) = started(queue.start_drain(3));
        assert!(run.is_empty());
        assert_eq!(gated[0].id, id);
        assert_eq!(queue.slot(id), Some(Slot::AwaitingApproval));

        queue.approve(id).unwrap();
        assert_eq!(queue.slot(id), Some(Slot::Queued));
        assert_eq!(queue.approve(id), Err(QueueError::NotAwaitingApproval(id)));

        let (_, run, gated) = started(queue.start_drain(3));
        assert_eq!(run[0].id, id);
        assert!(gated.is_empty());
    }

    #[test]
    fn test_decline_fails_task() {
        let mut queue = TaskQueue::new(3);
        let id = queue.enqueue(task(ActionType::SubmitForApproval, TaskPriority::High, true), vec![]).unwrap();
        started(queue.start_drain(3));

        let declined = queue.decline(id, "user declined").unwrap();
        assert_eq!(declined.status, TaskStatus::Failed);
        assert_eq!(declined.error.as_deref(), Some("user declined"));
        assert_eq!(queue.slot(id), None);
        assert_eq!(queue.status().history.len(), 1);
    }

    #[test]
    fn test_duplicate_outcome_is_ignored() {
        let mut queue = TaskQueue::new(3);
        let id = queue.enqueue(task(ActionType::IdentifyVendors, TaskPriority::Normal, false), vec![]).unwrap();
        started(queue.start_drain(3));

        assert!(queue.finish(id, text("first")).is_some());
        assert!(queue.finish(id, text("second")).is_none());
        assert_eq!(queue.status().history.len(), 1);
    }

    #[test]
    fn test_retry_limit() {
        let mut queue = TaskQueue::new(1);
        let id = queue.enqueue(task(ActionType::IdentifyVendors, TaskPriority::Normal, false), vec![]).unwrap();
        started(queue.start_drain(3));
        queue.finish(id, TaskOutcome::Failed("timeout".to_string()));

        let retried = queue.retry(id).unwrap();
        assert_eq!(retried.attempts, 1);
        assert_eq!(queue.slot(id), Some(Slot::Queued));

        let (_, run, _) = started(queue.start_drain(3));
        assert_eq!(run[0].attempts, 2);
        queue.finish(id, TaskOutcome::Failed("timeout".to_string()));

        assert_eq!(
            queue.retry(id),
            Err(QueueError::RetryLimit {
                task_id: id,
                limit: 1
            })
        );
    }

    #[test]
    fn test_retry_rejects_succeeded_task() {
        let mut queue = TaskQueue::new(3);
        let id = queue.enqueue(task(ActionType::IdentifyVendors, TaskPriority::Normal, false), vec![]).unwrap();
        started(queue.start_drain(3));
        queue.finish(id, text("ok"));
        assert_eq!(queue.retry(id), Err(QueueError::NotRetryable(id)));

        let unknown = Uuid::new_v4();
        assert_eq!(queue.retry(unknown), Err(QueueError::UnknownTask(unknown)));
    }

    fn assert_disjoint(queue: &TaskQueue) {
        let status = queue.status();
        let mut seen = HashSet::new();
        for task in status
            .queued
            .iter()
            .chain(&status.awaiting_approval)
            .chain(&status.executing)
        {
            assert!(seen.insert(task.id), "task {} is in two slots", task.id);
        }
    }

    #[test]
    fn test_randomized_slots_stay_disjoint() {
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut queue = TaskQueue::new(2);
            let mut known: Vec<Uuid> = Vec::new();

            for _ in 0..300 {
                match rng.gen_range(0..6) {
                    0 => {
                        let deps = if !known.is_empty() && rng.gen_bool(0.3) {
                            vec![known[rng.gen_range(0..known.len())]]
                        } else {
                            vec![]
                        };
                        let t = task(ActionType::IdentifyVendors, TaskPriority::Normal, rng.gen_bool(0.4));
                        known.push(queue.enqueue(t, deps).unwrap());
                    }
                    1 => {
                        queue.start_drain(rng.gen_range(1..4));
                    }
                    2 => {
                        let executing = queue.status().executing;
                        if let Some(t) = executing.get(rng.gen_range(0..executing.len().max(1))) {
                            let outcome = if rng.gen_bool(0.7) {
                                text("ok")
                            } else {
                                TaskOutcome::Failed("network".to_string())
                            };
                            queue.finish(t.id, outcome);
                        }
                    }
                    3 => {
                        let waiting = queue.status().awaiting_approval;
                        if let Some(t) = waiting.first() {
                            if rng.gen_bool(0.5) {
                                queue.approve(t.id).unwrap();
                            } else {
                                queue.decline(t.id, "user declined").unwrap();
                            }
                        }
                    }
                    4 => {
                        if !known.is_empty() {
                            let _ = queue.retry(known[rng.gen_range(0..known.len())]);
                        }
                    }
                    _ => {
                        if let Some(id) = queue.active_drain() {
                            queue.cancel_drain(id);
                        }
                    }
                }
                assert_disjoint(&queue);
            }
        }
    }
}
