//! Agent actions, tasks and their typed results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::follow_on::{ActionCategory, ActionPriority, FollowOnAction};

/// Kind of work an agent task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    GatherMarketResearch,
    GenerateDocuments,
    IdentifyVendors,
    ScheduleReviews,
    SubmitForApproval,
    MonitorCompliance,
}

impl ActionType {
    /// Default task description.
    pub fn description(&self) -> &'static str {
        match self {
            ActionType::GatherMarketResearch => "Gathering market research data",
            ActionType::GenerateDocuments => "Generating acquisition documents",
            ActionType::IdentifyVendors => "Identifying qualified vendors",
            ActionType::ScheduleReviews => "Scheduling document reviews",
            ActionType::SubmitForApproval => "Submitting package for approval",
            ActionType::MonitorCompliance => "Checking compliance status",
        }
    }

    /// Status text for a successful run.
    pub fn completion_message(&self) -> &'static str {
        match self {
            ActionType::GatherMarketResearch => "Market research complete",
            ActionType::GenerateDocuments => "Documents generated",
            ActionType::IdentifyVendors => "Vendor search complete",
            ActionType::ScheduleReviews => "Reviews scheduled",
            ActionType::SubmitForApproval => "Package submitted for approval",
            ActionType::MonitorCompliance => "Compliance check complete",
        }
    }

    /// Task-specific recovery hint shown after a failure.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            ActionType::GatherMarketResearch => Some("Try specific market segment"),
            ActionType::IdentifyVendors => Some("Narrow search criteria"),
            ActionType::GenerateDocuments => Some("Review the requirements before regenerating"),
            _ => None,
        }
    }

    /// Whether the action needs a human decision before it runs.
    pub fn requires_approval_by_default(&self) -> bool {
        matches!(
            self,
            ActionType::GenerateDocuments | ActionType::SubmitForApproval
        )
    }

    /// Map a follow-on category to the action that executes it.
    pub fn from_category(category: ActionCategory) -> Self {
        match category {
            ActionCategory::DocumentGeneration => ActionType::GenerateDocuments,
            ActionCategory::VendorManagement => ActionType::IdentifyVendors,
            ActionCategory::ReviewApproval => ActionType::SubmitForApproval,
            ActionCategory::ComplianceCheck => ActionType::MonitorCompliance,
            _ => ActionType::GatherMarketResearch,
        }
    }
}

/// An action the agent wants to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    /// Action ID
    pub id: Uuid,
    /// Kind of work
    pub action_type: ActionType,
    /// Human-readable description
    pub description: String,
    /// Must be approved before it runs
    pub requires_approval: bool,
    /// Follow-on action this was created from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_on_id: Option<Uuid>,
}

impl AgentAction {
    /// Create an action with the type's defaults.
    pub fn new(action_type: ActionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            description: action_type.description().to_string(),
            requires_approval: action_type.requires_approval_by_default(),
            follow_on_id: None,
        }
    }

    /// Override the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Override the approval flag.
    pub fn with_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    /// Build the action that executes a follow-on suggestion.
    pub fn from_follow_on(action: &FollowOnAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type: ActionType::from_category(action.category),
            description: action.title.clone(),
            requires_approval: action.requires_user_input,
            follow_on_id: Some(action.id),
        }
    }
}

/// Scheduling priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    /// Default priority for an action.
    pub fn for_action(action: &AgentAction) -> Self {
        if action.requires_approval {
            TaskPriority::High
        } else {
            TaskPriority::Normal
        }
    }
}

impl From<ActionPriority> for TaskPriority {
    fn from(priority: ActionPriority) -> Self {
        match priority {
            ActionPriority::Critical => TaskPriority::Critical,
            ActionPriority::High => TaskPriority::High,
            ActionPriority::Medium => TaskPriority::Normal,
            ActionPriority::Low => TaskPriority::Low,
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Executing,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Whether the status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// A vendor returned by a vendor search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub name: String,
    pub cage_code: Option<String>,
    pub small_business: bool,
}

/// Result of a compliance check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Score in 0..=100
    pub score: u8,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Typed output of a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutput {
    /// Vendors found by a vendor search
    VendorList { vendors: Vec<Vendor> },
    /// Compliance score and findings
    ComplianceScore { report: ComplianceReport },
    /// Names of generated documents
    Documents { names: Vec<String> },
    /// Anything else
    Text { text: String },
}

impl TaskOutput {
    /// One-line summary for status messages.
    pub fn summary(&self) -> String {
        match self {
            TaskOutput::VendorList { vendors } => format!("{} vendors found", vendors.len()),
            TaskOutput::ComplianceScore { report } => format!(
                "score {}/100, {} issue(s)",
                report.score,
                report.issues.len()
            ),
            TaskOutput::Documents { names } => format!("{} document(s): {}", names.len(), names.join(", ")),
            TaskOutput::Text { text } => text.clone(),
        }
    }
}

/// A queued unit of agent work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    /// Task ID
    pub id: Uuid,
    /// What to do
    pub action: AgentAction,
    /// Scheduling priority
    pub priority: TaskPriority,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Current status
    pub status: TaskStatus,
    /// Number of times the task was started
    pub attempts: u32,
    /// Output, once succeeded
    pub output: Option<TaskOutput>,
    /// Captured error, once failed
    pub error: Option<String>,
    /// When the task reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    /// Create a queued task for an action.
    pub fn new(action: AgentAction, priority: TaskPriority) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            priority,
            created_at: Utc::now(),
            status: TaskStatus::Queued,
            attempts: 0,
            output: None,
            error: None,
            finished_at: None,
        }
    }

    /// Create a queued task with the action's default priority.
    pub fn for_action(action: AgentAction) -> Self {
        let priority = TaskPriority::for_action(&action);
        Self::new(action, priority)
    }
}
