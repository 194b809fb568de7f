//! Follow-on action suggestions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{GuidedPhase, Requirements};

/// Category of a follow-on action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionCategory {
    DocumentGeneration,
    VendorManagement,
    ComplianceCheck,
    MarketResearch,
    DataAnalysis,
    Communication,
    SystemConfiguration,
    RequirementGathering,
    ReviewApproval,
    RiskAssessment,
}

impl ActionCategory {
    /// Whether actions of this category run on the agentic executor.
    ///
    /// The remaining categories need a human in the loop and go to the
    /// guided handler.
    pub fn is_agentic(&self) -> bool {
        match self {
            ActionCategory::DocumentGeneration
            | ActionCategory::VendorManagement
            | ActionCategory::ComplianceCheck
            | ActionCategory::MarketResearch
            | ActionCategory::DataAnalysis
            | ActionCategory::Communication
            | ActionCategory::SystemConfiguration => true,
            ActionCategory::RequirementGathering
            | ActionCategory::ReviewApproval
            | ActionCategory::RiskAssessment => false,
        }
    }
}

/// Priority of a follow-on action.
///
/// Ordered so that `Critical` compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// How much of an action can run without the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationLevel {
    #[default]
    Manual,
    SemiAutomated,
    FullyAutomated,
}

/// Impact of approving a gated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl From<ActionPriority> for ImpactLevel {
    fn from(priority: ActionPriority) -> Self {
        match priority {
            ActionPriority::Critical => ImpactLevel::High,
            ActionPriority::High => ImpactLevel::Medium,
            _ => ImpactLevel::Low,
        }
    }
}

/// A suggested next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowOnAction {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: ActionCategory,
    pub priority: ActionPriority,
    /// Estimated duration in seconds
    pub estimated_duration_secs: u64,
    pub requires_user_input: bool,
    #[serde(default)]
    pub automation_level: AutomationLevel,
    /// Actions that should complete first
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    /// When the suggestion stops being relevant
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl FollowOnAction {
    /// Create an action with no dependencies and no expiry.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: ActionCategory,
        priority: ActionPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            category,
            priority,
            estimated_duration_secs: 0,
            requires_user_input: false,
            automation_level: AutomationLevel::default(),
            dependencies: Vec::new(),
            expires_at: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration_secs = duration.as_secs();
        self
    }

    pub fn with_user_input(mut self, requires_user_input: bool) -> Self {
        self.requires_user_input = requires_user_input;
        self
    }

    pub fn with_automation(mut self, level: AutomationLevel) -> Self {
        self.automation_level = level;
        self
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Whether the action has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Estimated duration.
    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs(self.estimated_duration_secs)
    }
}

/// A generated batch of follow-on actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowOnActionSet {
    pub id: Uuid,
    /// Actions in generation order
    pub actions: Vec<FollowOnAction>,
    /// Suggested execution order
    #[serde(default)]
    pub recommended_path: Vec<Uuid>,
    pub generated_at: DateTime<Utc>,
}

impl FollowOnActionSet {
    /// Create a set whose recommended path is the generation order.
    pub fn new(actions: Vec<FollowOnAction>) -> Self {
        let recommended_path = actions.iter().map(|a| a.id).collect();
        Self {
            id: Uuid::new_v4(),
            actions,
            recommended_path,
            generated_at: Utc::now(),
        }
    }
}

/// What a follow-on generator gets to look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowOnContext {
    pub phase: GuidedPhase,
    pub requirements: Requirements,
    /// Titles of actions completed so far
    pub completed_titles: Vec<String>,
    /// Latest task status line
    pub task_status: Option<String>,
    /// Maximum number of actions wanted
    pub max_actions: usize,
    /// Lifetime of generated actions
    pub ttl_secs: u64,
}

/// Outcome of executing a follow-on action through the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    PendingApproval,
    PendingUserInput,
    Failed,
}

/// Result reported by `FollowOnActionService::execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action_id: Uuid,
    pub status: ExecutionStatus,
    pub output: Option<String>,
    pub completed_at: DateTime<Utc>,
}
