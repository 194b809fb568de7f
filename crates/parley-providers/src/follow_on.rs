//! Follow-on action planning and execution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_core::{
    ActionCategory, ActionPriority, AutomationLevel, ExecutionResult, ExecutionStatus,
    FollowOnAction, FollowOnActionSet, FollowOnContext, GuidedPhase, UnifiedMessage,
};

use crate::traits::{CompletionProvider, CompletionRequest, FollowOnActionService};

const PLANNER_SYSTEM_PROMPT: &str = "You plan next steps for a federal acquisition. \
Reply with JSON only: {\"actions\": [{\"title\": str, \"description\": str, \
\"category\": one of document-generation|vendor-management|compliance-check|market-research|\
data-analysis|communication|system-configuration|requirement-gathering|review-approval|risk-assessment, \
\"priority\": critical|high|medium|low, \"estimatedDuration\": seconds, \
\"requiresUserInput\": bool, \"automationLevel\": manual|semiAutomated|fullyAutomated}]}";

/// Follow-on service backed by phase defaults and, optionally, a model.
///
/// When a completion provider is set the planner asks it for a JSON
/// action list first and falls back to the defaults on any failure.
pub struct FollowOnPlanner {
    provider: Option<Arc<dyn CompletionProvider>>,
    model: String,
    completed: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
}

impl FollowOnPlanner {
    /// Planner that only uses the phase defaults.
    pub fn new() -> Self {
        Self {
            provider: None,
            model: String::new(),
            completed: Mutex::new(HashMap::new()),
        }
    }

    /// Ask `provider` for suggestions before falling back to defaults.
    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        self.provider = Some(provider);
        self.model = model.into();
        self
    }

    /// Phase-based default suggestions, skipping titles already completed.
    pub fn default_actions(context: &FollowOnContext) -> FollowOnActionSet {
        let expires_at = Utc::now() + chrono::Duration::seconds(context.ttl_secs as i64);

        let candidates = match context.phase {
            GuidedPhase::ReadyToGenerate | GuidedPhase::ConfirmingPredictions => vec![
                FollowOnAction::new(
                    "Generate Solicitation Documents",
                    "Create RFP/RFQ documents based on requirements",
                    ActionCategory::DocumentGeneration,
                    ActionPriority::Critical,
                )
                .with_duration(Duration::from_secs(2400))
                .with_automation(AutomationLevel::SemiAutomated),
                FollowOnAction::new(
                    "Identify Potential Vendors",
                    "Research and identify qualified vendors",
                    ActionCategory::VendorManagement,
                    ActionPriority::High,
                )
                .with_duration(Duration::from_secs(1200))
                .with_automation(AutomationLevel::FullyAutomated),
                FollowOnAction::new(
                    "Run Compliance Check",
                    "Check the package against applicable clauses",
                    ActionCategory::ComplianceCheck,
                    ActionPriority::Medium,
                )
                .with_duration(Duration::from_secs(900))
                .with_automation(AutomationLevel::FullyAutomated),
            ],
            phase if phase.is_planning() => vec![
                FollowOnAction::new(
                    "Complete Market Research",
                    "Gather market intelligence to inform acquisition strategy",
                    ActionCategory::MarketResearch,
                    ActionPriority::High,
                )
                .with_duration(Duration::from_secs(1800))
                .with_automation(AutomationLevel::FullyAutomated),
                FollowOnAction::new(
                    "Define Requirements",
                    "Document detailed technical and functional requirements",
                    ActionCategory::RequirementGathering,
                    ActionPriority::Critical,
                )
                .with_duration(Duration::from_secs(3600))
                .with_user_input(true),
            ],
            _ => Vec::new(),
        };

        let mut actions: Vec<FollowOnAction> = candidates
            .into_iter()
            .filter(|a| !context.completed_titles.contains(&a.title))
            .take(context.max_actions.max(1))
            .map(|a| a.expiring_at(expires_at))
            .collect();

        if actions.is_empty() {
            actions.push(
                FollowOnAction::new(
                    "Review Current Status",
                    "Review the current acquisition status and determine next steps",
                    ActionCategory::ReviewApproval,
                    ActionPriority::Medium,
                )
                .with_duration(Duration::from_secs(600))
                .with_user_input(true)
                .expiring_at(expires_at),
            );
        }

        FollowOnActionSet::new(actions)
    }

    async fn generate_with_model(
        &self,
        provider: &Arc<dyn CompletionProvider>,
        context: &FollowOnContext,
    ) -> anyhow::Result<FollowOnActionSet> {
        let prompt = build_user_prompt(context);
        let request = CompletionRequest::new(
            &self.model,
            vec![UnifiedMessage::user(prompt, parley_core::Mode::Agentic)],
        )
        .with_system(PLANNER_SYSTEM_PROMPT)
        .with_temperature(0.3);

        let reply = provider.complete(request).await?;
        parse_action_response(&reply, context)
    }
}

impl Default for FollowOnPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FollowOnActionService for FollowOnPlanner {
    async fn generate(
        &self,
        acquisition_id: Uuid,
        context: &FollowOnContext,
    ) -> anyhow::Result<FollowOnActionSet> {
        debug!(%acquisition_id, phase = ?context.phase, "Generating follow-on actions");
        if let Some(ref provider) = self.provider {
            match self.generate_with_model(provider, context).await {
                Ok(set) if !set.actions.is_empty() => return Ok(set),
                Ok(_) => warn!("Model returned no follow-on actions, using defaults"),
                Err(e) => warn!("Follow-on generation failed, using defaults: {}", e),
            }
        }
        Ok(Self::default_actions(context))
    }

    async fn execute(
        &self,
        action: &FollowOnAction,
        acquisition_id: Uuid,
    ) -> anyhow::Result<ExecutionResult> {
        let mut completed = self.completed.lock().await;
        let done = completed.entry(acquisition_id).or_default();

        let missing: Vec<Uuid> = action
            .dependencies
            .iter()
            .filter(|d| !done.contains(d))
            .copied()
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("{} dependencies not satisfied", missing.len());
        }

        let (status, output) = match action.category {
            ActionCategory::ReviewApproval => (
                ExecutionStatus::PendingApproval,
                r#"{"reviewRequestSent":true}"#.to_string(),
            ),
            ActionCategory::RequirementGathering if action.requires_user_input => (
                ExecutionStatus::PendingUserInput,
                r#"{"requirementsGathered":false}"#.to_string(),
            ),
            ActionCategory::RiskAssessment => (
                ExecutionStatus::Completed,
                r#"{"riskLevel":"moderate"}"#.to_string(),
            ),
            _ => (ExecutionStatus::Completed, r#"{"completed":true}"#.to_string()),
        };

        done.insert(action.id);

        Ok(ExecutionResult {
            action_id: action.id,
            status,
            output: Some(output),
            completed_at: Utc::now(),
        })
    }
}

fn build_user_prompt(context: &FollowOnContext) -> String {
    let req = &context.requirements;
    let mut prompt = String::from("Suggest follow-on actions for this acquisition.\n\nRequirements:\n");
    let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "Not specified".to_string());
    prompt.push_str(&format!("- Product/Service: {}\n", field(&req.product_or_service)));
    prompt.push_str(&format!("- Estimated Value: {}\n", field(&req.estimated_value)));
    prompt.push_str(&format!("- Performance Period: {}\n", field(&req.performance_period)));
    prompt.push_str(&format!("- Business Need: {}\n", field(&req.business_need)));
    prompt.push_str(&format!("\nPhase: {}\n", context.phase.label()));

    if !context.completed_titles.is_empty() {
        prompt.push_str("\nRecently completed:\n");
        let start = context.completed_titles.len().saturating_sub(3);
        for title in &context.completed_titles[start..] {
            prompt.push_str(&format!("- {}\n", title));
        }
    }
    prompt.push_str(&format!("\nReturn at most {} actions.", context.max_actions));
    prompt
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    actions: Vec<ActionData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionData {
    title: String,
    #[serde(default)]
    description: String,
    category: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    estimated_duration: u64,
    #[serde(default)]
    requires_user_input: bool,
    #[serde(default)]
    automation_level: Option<String>,
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn parse_category(s: &str) -> ActionCategory {
    match normalize(s).as_str() {
        "vendormanagement" => ActionCategory::VendorManagement,
        "compliancecheck" => ActionCategory::ComplianceCheck,
        "marketresearch" => ActionCategory::MarketResearch,
        "dataanalysis" => ActionCategory::DataAnalysis,
        "communication" => ActionCategory::Communication,
        "systemconfiguration" => ActionCategory::SystemConfiguration,
        "requirementgathering" => ActionCategory::RequirementGathering,
        "reviewapproval" => ActionCategory::ReviewApproval,
        "riskassessment" => ActionCategory::RiskAssessment,
        _ => ActionCategory::DocumentGeneration,
    }
}

fn parse_priority(s: Option<&str>) -> ActionPriority {
    match s.map(normalize).as_deref() {
        Some("critical") => ActionPriority::Critical,
        Some("high") => ActionPriority::High,
        Some("low") => ActionPriority::Low,
        _ => ActionPriority::Medium,
    }
}

fn parse_automation(s: Option<&str>) -> AutomationLevel {
    match s.map(normalize).as_deref() {
        Some("manual") => AutomationLevel::Manual,
        Some("fullyautomated") => AutomationLevel::FullyAutomated,
        _ => AutomationLevel::SemiAutomated,
    }
}

/// Parse a model reply into an action set.
fn parse_action_response(reply: &str, context: &FollowOnContext) -> anyhow::Result<FollowOnActionSet> {
    let body = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let parsed: ActionResponse = serde_json::from_str(body)?;
    let expires_at = Utc::now() + chrono::Duration::seconds(context.ttl_secs as i64);

    let actions = parsed
        .actions
        .into_iter()
        .take(context.max_actions.max(1))
        .map(|data| {
            FollowOnAction::new(
                data.title,
                data.description,
                parse_category(&data.category),
                parse_priority(data.priority.as_deref()),
            )
            .with_duration(Duration::from_secs(data.estimated_duration))
            .with_user_input(data.requires_user_input)
            .with_automation(parse_automation(data.automation_level.as_deref()))
            .expiring_at(expires_at)
        })
        .collect();

    Ok(FollowOnActionSet::new(actions))
}
