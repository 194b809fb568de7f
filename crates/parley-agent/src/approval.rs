//! Approval requests for gated tasks.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_core::{AgentAction, AgentTask, ImpactLevel, TaskPriority};

/// A request for the user to approve a task before it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub task_id: Uuid,
    pub action: AgentAction,
    pub message: String,
    pub impact: ImpactLevel,
    pub requested_at: DateTime<Utc>,
}

/// Impact shown for a gated task of the given priority.
pub fn impact_for(priority: TaskPriority) -> ImpactLevel {
    match priority {
        TaskPriority::Critical => ImpactLevel::High,
        TaskPriority::High => ImpactLevel::Medium,
        TaskPriority::Normal | TaskPriority::Low => ImpactLevel::Low,
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ApprovalError {
    #[error("approval request not found: {0}")]
    NotFound(Uuid),
    #[error("approval request already resolved: {0}")]
    AlreadyResolved(Uuid),
}

/// The user's answer to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub task_id: Uuid,
    pub approved: bool,
}

/// Outstanding and resolved approval requests.
///
/// Open requests are keyed by request id; resolving one removes it and
/// remembers only its id.
#[derive(Debug, Clone, Default)]
pub struct ApprovalGate {
    pending: HashMap<Uuid, (u64, ApprovalRequest)>,
    by_task: HashMap<Uuid, Uuid>,
    resolved: HashSet<Uuid>,
    next_seq: u64,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request for `task`, or return the one already open.
    pub fn request_approval(&mut self, task: &AgentTask) -> ApprovalRequest {
        if let Some(existing) = self.for_task(task.id) {
            return existing.clone();
        }
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            task_id: task.id,
            action: task.action.clone(),
            message: format!("Approval needed: {}", task.action.description),
            impact: impact_for(task.priority),
            requested_at: Utc::now(),
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_task.insert(task.id, request.id);
        self.pending.insert(request.id, (seq, request.clone()));
        request
    }

    /// Resolve a request. Each request resolves exactly once.
    pub fn resolve(&mut self, id: Uuid, approved: bool) -> Result<Resolution, ApprovalError> {
        if self.resolved.contains(&id) {
            return Err(ApprovalError::AlreadyResolved(id));
        }
        let (_, request) = self.pending.remove(&id).ok_or(ApprovalError::NotFound(id))?;
        self.by_task.remove(&request.task_id);
        self.resolved.insert(id);
        Ok(Resolution {
            task_id: request.task_id,
            approved,
        })
    }

    /// Open requests, oldest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let mut open: Vec<&(u64, ApprovalRequest)> = self.pending.values().collect();
        open.sort_by_key(|(seq, _)| *seq);
        open.into_iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Open request for a task.
    pub fn for_task(&self, task_id: Uuid) -> Option<&ApprovalRequest> {
        self.by_task
            .get(&task_id)
            .and_then(|id| self.pending.get(id))
            .map(|(_, r)| r)
    }

    /// Find an open request by id prefix.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<Uuid> {
        let prefix = prefix.to_ascii_lowercase();
        let matches: Vec<Uuid> = self
            .pending
            .keys()
            .copied()
            .filter(|id| id.to_string().starts_with(&prefix))
            .collect();
        match matches.as_slice() {
            [id] => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ActionType;

    fn gated_task(priority: TaskPriority) -> AgentTask {
        AgentTask::new(AgentAction::new(ActionType::GenerateDocuments), priority)
    }

    #[test]
    fn test_request_is_idempotent_per_task() {
        let mut gate = ApprovalGate::new();
        let task = gated_task(TaskPriority::High);

        let first = gate.request_approval(&task);
        let second = gate.request_approval(&task);
        assert_eq!(first.id, second.id);
        assert_eq!(gate.pending().len(), 1);
        assert_eq!(first.impact, ImpactLevel::Medium);
    }

    #[test]
    fn test_resolve_exactly_once() {
        let mut gate = ApprovalGate::new();
        let task = gated_task(TaskPriority::Critical);
        let request = gate.request_approval(&task);

        let resolution = gate.resolve(request.id, true).unwrap();
        assert_eq!(resolution.task_id, task.id);
        assert!(resolution.approved);
        assert!(gate.pending().is_empty());

        assert_eq!(
            gate.resolve(request.id, false),
            Err(ApprovalError::AlreadyResolved(request.id))
        );
    }

    #[test]
    fn test_pending_keeps_request_order() {
        let mut gate = ApprovalGate::new();
        let tasks: Vec<AgentTask> = (0..4).map(|_| gated_task(TaskPriority::Normal)).collect();
        let ids: Vec<Uuid> = tasks.iter().map(|t| gate.request_approval(t).id).collect();

        gate.resolve(ids[1], false).unwrap();
        let open: Vec<Uuid> = gate.pending().iter().map(|r| r.id).collect();
        assert_eq!(open, vec![ids[0], ids[2], ids[3]]);
        assert!(gate.for_task(tasks[1].id).is_none());
        assert_eq!(gate.for_task(tasks[2].id).map(|r| r.id), Some(ids[2]));
        assert!(gate.has_pending());
    }

    #[test]
    fn test_resolve_unknown() {
        let mut gate = ApprovalGate::new();
        let id = Uuid::new_v4();
        assert_eq!(gate.resolve(id, true), Err(ApprovalError::NotFound(id)));
    }

    #[test]
    fn test_impact_mapping() {
        assert_eq!(impact_for(TaskPriority::Critical), ImpactLevel::High);
        assert_eq!(impact_for(TaskPriority::High), ImpactLevel::Medium);
        assert_eq!(impact_for(TaskPriority::Normal), ImpactLevel::Low);
        assert_eq!(impact_for(TaskPriority::Low), ImpactLevel::Low);
    }
}
