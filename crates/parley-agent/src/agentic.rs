//! Agentic sub-state and its helpers.

use serde::{Deserialize, Serialize};

use parley_core::{ActionType, AgentAction, UnifiedMessage};
use parley_providers::{Intent, IntentType};

/// What the agent is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Thinking,
    Executing,
    WaitingForApproval,
    Monitoring,
}

/// Agentic sub-state of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgenticState {
    pub agent_state: AgentState,
    pub intent: Option<Intent>,
    /// Messages visible to the agentic sub-system
    pub messages: Vec<UnifiedMessage>,
    /// Suggestions from the last task failure
    pub recovery_suggestions: Vec<String>,
}

impl AgenticState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Words that route a hybrid-mode message to the agentic side.
const AGENTIC_KEYWORDS: &[&str] = &["execute", "run", "perform", "start task", "begin"];

/// Whether a hybrid-mode message is a command for the agent.
pub fn is_agentic_command(text: &str) -> bool {
    let lower = text.to_lowercase();
    AGENTIC_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Recovery suggestions for a failed task, derived from the error text.
pub fn recovery_suggestions(error: &str, action_type: ActionType) -> Vec<String> {
    let lower = error.to_lowercase();
    let mut suggestions = Vec::new();

    if lower.contains("network") {
        suggestions.push("Check network connection".to_string());
        suggestions.push("Retry the operation".to_string());
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        suggestions.push("Try again with smaller scope".to_string());
        suggestions.push("Check service status".to_string());
    }
    if let Some(hint) = action_type.recovery_hint() {
        suggestions.push(hint.to_string());
    }
    if suggestions.is_empty() {
        suggestions.push("Retry the operation".to_string());
    }
    suggestions
}

/// Action to run for a classified intent, if it calls for one.
pub fn action_for_intent(intent: &Intent) -> Option<AgentAction> {
    if !intent.requires_execution {
        return None;
    }
    let action_type = match intent.intent_type {
        IntentType::CreateAcquisition => ActionType::GatherMarketResearch,
        IntentType::ReviewDocuments => ActionType::ScheduleReviews,
        IntentType::CheckStatus => ActionType::MonitorCompliance,
        IntentType::ApproveAction => ActionType::SubmitForApproval,
        IntentType::ModifyRequirements | IntentType::AskQuestion => return None,
    };
    Some(AgentAction::new(action_type))
}

/// System prompt for agentic replies.
pub fn system_prompt(intent: &Intent) -> String {
    format!(
        "You are an autonomous federal acquisition agent. The user wants to {} \
         (confidence {:.0}%). Acknowledge the request in two sentences and say what you will do next.",
        intent.intent_type.phrase(),
        intent.confidence * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agentic_keywords() {
        assert!(is_agentic_command("Please run the vendor search"));
        assert!(is_agentic_command("START TASK now"));
        assert!(!is_agentic_command("The estimated value is $40,000"));
    }

    #[test]
    fn test_network_error_suggestions() {
        let suggestions = recovery_suggestions("Network unreachable", ActionType::IdentifyVendors);
        assert_eq!(
            suggestions,
            vec![
                "Check network connection",
                "Retry the operation",
                "Narrow search criteria"
            ]
        );
    }

    #[test]
    fn test_timeout_suggestions() {
        let suggestions = recovery_suggestions("request timeout after 30s", ActionType::GatherMarketResearch);
        assert!(suggestions.contains(&"Try again with smaller scope".to_string()));
        assert!(suggestions.contains(&"Check service status".to_string()));
        assert!(suggestions.contains(&"Try specific market segment".to_string()));
    }

    #[test]
    fn test_unknown_error_still_suggests_retry() {
        let suggestions = recovery_suggestions("boom", ActionType::ScheduleReviews);
        assert_eq!(suggestions, vec!["Retry the operation"]);
    }

    #[test]
    fn test_questions_do_not_create_actions() {
        let question = Intent::new(IntentType::AskQuestion, 0.5, false);
        assert!(action_for_intent(&question).is_none());

        let status = Intent::new(IntentType::CheckStatus, 0.8, true);
        let action = action_for_intent(&status).unwrap();
        assert_eq!(action.action_type, ActionType::MonitorCompliance);
    }
}
