//! Shared conversation context.
//!
//! [`SharedContext`] is the state both mode sub-systems read. It has a
//! single writer path, [`SharedContext::apply`], which takes a
//! [`ContextUpdate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::follow_on::FollowOnAction;
use crate::mode::Mode;

/// Phase of the guided requirement-gathering conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidedPhase {
    /// Nothing collected yet
    #[default]
    Initial,
    /// Collecting value, period, business need
    GatheringBasics,
    /// Collecting technical requirements
    GatheringDetails,
    /// Requirements are being analyzed
    AnalyzingRequirements,
    /// User confirms the summarized requirements
    ConfirmingPredictions,
    /// Enough information to generate documents
    ReadyToGenerate,
}

impl GuidedPhase {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            GuidedPhase::Initial => "initial",
            GuidedPhase::GatheringBasics => "gathering basics",
            GuidedPhase::GatheringDetails => "gathering details",
            GuidedPhase::AnalyzingRequirements => "analyzing requirements",
            GuidedPhase::ConfirmingPredictions => "confirming predictions",
            GuidedPhase::ReadyToGenerate => "ready to generate",
        }
    }

    /// Whether the conversation is still in the planning stage.
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            GuidedPhase::Initial | GuidedPhase::GatheringBasics | GuidedPhase::GatheringDetails
        )
    }
}

/// Requirements collected for an acquisition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    pub project_title: Option<String>,
    pub product_or_service: Option<String>,
    pub estimated_value: Option<String>,
    pub performance_period: Option<String>,
    pub requirement_type: Option<String>,
    pub business_need: Option<String>,
    pub technical_requirements: Vec<String>,
    pub evaluation_criteria: Vec<String>,
    pub special_considerations: Vec<String>,
}

impl Requirements {
    /// Percentage of the six core fields that are filled in.
    pub fn completion_percentage(&self) -> f64 {
        let filled = [
            self.project_title.is_some(),
            self.product_or_service.is_some(),
            self.estimated_value.is_some(),
            self.performance_period.is_some(),
            self.business_need.is_some(),
            !self.technical_requirements.is_empty(),
        ]
        .iter()
        .filter(|f| **f)
        .count();

        filled as f64 / 6.0 * 100.0
    }

    /// Minimum information needed before documents can be generated.
    pub fn has_minimum_info(&self) -> bool {
        self.product_or_service.is_some()
            && self.estimated_value.is_some()
            && self.performance_period.is_some()
            && self.business_need.is_some()
    }

    /// Overlay the fields set in `other` onto `self`.
    ///
    /// List fields are extended with entries not already present.
    pub fn merge(&mut self, other: &Requirements) {
        fn take(dst: &mut Option<String>, src: &Option<String>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }
        fn extend(dst: &mut Vec<String>, src: &[String]) {
            for item in src {
                if !dst.contains(item) {
                    dst.push(item.clone());
                }
            }
        }

        take(&mut self.project_title, &other.project_title);
        take(&mut self.product_or_service, &other.product_or_service);
        take(&mut self.estimated_value, &other.estimated_value);
        take(&mut self.performance_period, &other.performance_period);
        take(&mut self.requirement_type, &other.requirement_type);
        take(&mut self.business_need, &other.business_need);
        extend(&mut self.technical_requirements, &other.technical_requirements);
        extend(&mut self.evaluation_criteria, &other.evaluation_criteria);
        extend(&mut self.special_considerations, &other.special_considerations);
    }
}

/// User preferences relevant to orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Mode to start new sessions in
    pub preferred_mode: Mode,
    /// Confirm proposed transitions without asking
    pub auto_transition: bool,
    /// Surface follow-on suggestions in the transcript
    pub show_follow_ons: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            preferred_mode: Mode::Guided,
            auto_transition: false,
            show_follow_ons: true,
        }
    }
}

/// Pointer to the workflow the session is currently driving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPointer {
    /// Workflow ID
    pub id: Uuid,
    /// Short workflow name (e.g. "solicitation")
    pub name: String,
    /// Current step within the workflow
    pub step: String,
    /// When the pointer was last moved
    pub updated_at: DateTime<Utc>,
}

impl WorkflowPointer {
    /// Create a pointer at the first step of a new workflow.
    pub fn new(name: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            step: step.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Context shared by the guided and agentic sub-systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedContext {
    /// Acquisition this session works on
    pub acquisition_id: Uuid,
    /// Latest requirements snapshot
    pub requirements: Requirements,
    /// Active guided phase
    pub phase: GuidedPhase,
    /// Latest task status line
    pub task_status: Option<String>,
    /// Ranked follow-on suggestions
    pub follow_on_actions: Vec<FollowOnAction>,
    /// User preferences
    pub preferences: UserPreferences,
    /// Active workflow, if any
    pub workflow: Option<WorkflowPointer>,
    /// Time of the last update
    pub updated_at: DateTime<Utc>,
}

/// A single change to the shared context.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextUpdate {
    /// Merge new requirement fields
    Requirements(Requirements),
    /// Move to a new guided phase
    Phase(GuidedPhase),
    /// Replace the task status line
    TaskStatus(String),
    /// Replace the ranked follow-on list
    FollowOnActions(Vec<FollowOnAction>),
    /// Replace user preferences
    Preferences(UserPreferences),
    /// Set or clear the workflow pointer
    Workflow(Option<WorkflowPointer>),
}

impl SharedContext {
    /// Create a context for a new acquisition.
    pub fn new(acquisition_id: Uuid, preferences: UserPreferences) -> Self {
        Self {
            acquisition_id,
            requirements: Requirements::default(),
            phase: GuidedPhase::Initial,
            task_status: None,
            follow_on_actions: Vec::new(),
            preferences,
            workflow: None,
            updated_at: Utc::now(),
        }
    }

    /// Apply an update. This is the only way fields change.
    pub fn apply(&mut self, update: ContextUpdate) {
        match update {
            ContextUpdate::Requirements(req) => self.requirements.merge(&req),
            ContextUpdate::Phase(phase) => self.phase = phase,
            ContextUpdate::TaskStatus(status) => self.task_status = Some(status),
            ContextUpdate::FollowOnActions(actions) => self.follow_on_actions = actions,
            ContextUpdate::Preferences(prefs) => self.preferences = prefs,
            ContextUpdate::Workflow(workflow) => self.workflow = workflow,
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_percentage() {
        let mut req = Requirements::default();
        assert_eq!(req.completion_percentage(), 0.0);

        req.product_or_service = Some("Cloud hosting".to_string());
        req.estimated_value = Some("$250,000".to_string());
        req.performance_period = Some("12 months".to_string());
        assert!((req.completion_percentage() - 50.0).abs() < f64::EPSILON);
        assert!(!req.has_minimum_info());

        req.business_need = Some("Migrate legacy systems".to_string());
        assert!(req.has_minimum_info());
    }

    #[test]
    fn test_merge_keeps_existing_fields() {
        let mut req = Requirements {
            product_or_service: Some("Laptops".to_string()),
            technical_requirements: vec!["16GB RAM".to_string()],
            ..Default::default()
        };
        let update = Requirements {
            estimated_value: Some("$40,000".to_string()),
            technical_requirements: vec!["16GB RAM".to_string(), "SSD".to_string()],
            ..Default::default()
        };

        req.merge(&update);

        assert_eq!(req.product_or_service.as_deref(), Some("Laptops"));
        assert_eq!(req.estimated_value.as_deref(), Some("$40,000"));
        assert_eq!(req.technical_requirements, vec!["16GB RAM", "SSD"]);
    }

    #[test]
    fn test_apply_updates() {
        let mut ctx = SharedContext::new(Uuid::new_v4(), UserPreferences::default());
        ctx.apply(ContextUpdate::Phase(GuidedPhase::ReadyToGenerate));
        ctx.apply(ContextUpdate::TaskStatus("Running".to_string()));

        assert_eq!(ctx.phase, GuidedPhase::ReadyToGenerate);
        assert_eq!(ctx.task_status.as_deref(), Some("Running"));
    }
}
