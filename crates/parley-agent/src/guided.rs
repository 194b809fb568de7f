//! Guided requirement gathering.
//!
//! The guided sub-state walks the user through a fixed sequence of
//! questions. [`advance`] is the deterministic rule set that extracts
//! requirements from each answer and picks the next phase. A completion
//! provider, when one is configured, only rephrases the reply.

use serde::{Deserialize, Serialize};

use parley_core::{GuidedPhase, Requirements, UnifiedMessage};

/// Guided sub-state of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuidedState {
    pub phase: GuidedPhase,
    pub requirements: Requirements,
    /// Messages visible to the guided sub-system
    pub messages: Vec<UnifiedMessage>,
}

impl GuidedState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result of applying one user answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GuidedStep {
    /// Rule-based reply text
    pub reply: String,
    /// Requirements after the answer
    pub requirements: Requirements,
    /// Phase after the answer
    pub phase: GuidedPhase,
}

fn is_skip(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("skip")
}

fn wants_changes(input: &str) -> bool {
    input
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .any(|w| matches!(w.as_str(), "no" | "change" | "edit" | "wrong" | "incorrect" | "fix"))
}

/// Summarize requirements for confirmation prompts.
pub fn summarize(requirements: &Requirements) -> String {
    let field = |v: &Option<String>| v.as_deref().unwrap_or("not specified").to_string();
    let mut out = String::new();
    out.push_str(&format!("- Product/Service: {}\n", field(&requirements.product_or_service)));
    out.push_str(&format!("- Estimated value: {}\n", field(&requirements.estimated_value)));
    out.push_str(&format!("- Performance period: {}\n", field(&requirements.performance_period)));
    out.push_str(&format!("- Business need: {}\n", field(&requirements.business_need)));
    if !requirements.technical_requirements.is_empty() {
        out.push_str(&format!(
            "- Technical requirements: {}\n",
            requirements.technical_requirements.join("; ")
        ));
    }
    out
}

/// Apply one user answer to the guided conversation.
pub fn advance(phase: GuidedPhase, requirements: &Requirements, input: &str) -> GuidedStep {
    let input = input.trim();
    let mut requirements = requirements.clone();

    let (reply, phase) = match phase {
        GuidedPhase::Initial => {
            requirements.product_or_service = Some(input.to_string());
            (
                format!(
                    "Great! I understand you need **{}**.\n\n\
                     What is the estimated dollar value of this acquisition?",
                    input
                ),
                GuidedPhase::GatheringBasics,
            )
        }

        GuidedPhase::GatheringBasics => {
            if requirements.estimated_value.is_none() {
                requirements.estimated_value = Some(input.to_string());
                (
                    format!(
                        "Noted the estimated value as **{}**.\n\n\
                         What is the expected performance period? (e.g. \"12 months\", \"base year plus 2 options\")",
                        input
                    ),
                    GuidedPhase::GatheringBasics,
                )
            } else if requirements.performance_period.is_none() {
                requirements.performance_period = Some(input.to_string());
                (
                    format!(
                        "Performance period: **{}**.\n\n\
                         What is the primary business need this acquisition addresses?",
                        input
                    ),
                    GuidedPhase::GatheringBasics,
                )
            } else {
                requirements.business_need = Some(input.to_string());
                (
                    "I have enough to start on the market research report and requirements document.\n\n\
                     Would you like to add technical requirements or specifications? \
                     Type \"skip\" to go straight to document generation."
                        .to_string(),
                    GuidedPhase::GatheringDetails,
                )
            }
        }

        GuidedPhase::GatheringDetails => {
            if is_skip(input) {
                (
                    "Ready to generate documents: market research report, requirements document, \
                     statement of work, cost estimate and acquisition plan."
                        .to_string(),
                    GuidedPhase::ReadyToGenerate,
                )
            } else {
                if !requirements.technical_requirements.iter().any(|r| r == input) {
                    requirements.technical_requirements.push(input.to_string());
                }
                (
                    format!(
                        "Here is what I have so far:\n{}\nDoes this look right?",
                        summarize(&requirements)
                    ),
                    GuidedPhase::ConfirmingPredictions,
                )
            }
        }

        GuidedPhase::ConfirmingPredictions => {
            if wants_changes(input) {
                (
                    "No problem. Tell me what to add or correct in the technical requirements."
                        .to_string(),
                    GuidedPhase::GatheringDetails,
                )
            } else {
                (
                    "Requirements confirmed. Ready to generate documents.".to_string(),
                    GuidedPhase::ReadyToGenerate,
                )
            }
        }

        GuidedPhase::AnalyzingRequirements => (
            "Analysis complete. Ready to generate documents.".to_string(),
            GuidedPhase::ReadyToGenerate,
        ),

        GuidedPhase::ReadyToGenerate => {
            let lower = input.to_lowercase();
            let reply = if lower.contains("generate") {
                "I'll generate all recommended documents based on your requirements."
            } else {
                "Your requirements are complete. Say \"generate\" to produce the documents, \
                 or switch to agentic mode to let me run the tasks."
            };
            (reply.to_string(), GuidedPhase::ReadyToGenerate)
        }
    };

    GuidedStep {
        reply,
        requirements,
        phase,
    }
}

/// System prompt for rephrasing guided replies.
pub fn system_prompt(phase: GuidedPhase, requirements: &Requirements) -> String {
    format!(
        "You are a federal contracting assistant gathering acquisition requirements. \
         Current phase: {}. Requirements gathered so far:\n{}\n\
         Reply in at most three short paragraphs and end with exactly one question.",
        phase.label(),
        summarize(requirements)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(inputs: &[&str]) -> (GuidedPhase, Requirements) {
        let mut phase = GuidedPhase::Initial;
        let mut req = Requirements::default();
        for input in inputs {
            let step = advance(phase, &req, input);
            phase = step.phase;
            req = step.requirements;
        }
        (phase, req)
    }

    #[test]
    fn test_basics_are_collected_in_order() {
        let (phase, req) = walk(&["Cloud hosting", "$250,000", "12 months"]);
        assert_eq!(phase, GuidedPhase::GatheringBasics);
        assert_eq!(req.product_or_service.as_deref(), Some("Cloud hosting"));
        assert_eq!(req.estimated_value.as_deref(), Some("$250,000"));
        assert_eq!(req.performance_period.as_deref(), Some("12 months"));
        assert!(req.business_need.is_none());
    }

    #[test]
    fn test_skip_goes_straight_to_ready() {
        let (phase, req) = walk(&["Cloud hosting", "$250,000", "12 months", "Retire data center", "skip"]);
        assert_eq!(phase, GuidedPhase::ReadyToGenerate);
        assert!(req.has_minimum_info());
        assert!(req.technical_requirements.is_empty());
    }

    #[test]
    fn test_details_then_confirm() {
        let (phase, req) = walk(&[
            "Cloud hosting",
            "$250,000",
            "12 months",
            "Retire data center",
            "FedRAMP Moderate",
        ]);
        assert_eq!(phase, GuidedPhase::ConfirmingPredictions);
        assert_eq!(req.technical_requirements, vec!["FedRAMP Moderate"]);

        let step = advance(phase, &req, "yes, looks good");
        assert_eq!(step.phase, GuidedPhase::ReadyToGenerate);

        let step = advance(GuidedPhase::ConfirmingPredictions, &req, "change the period");
        assert_eq!(step.phase, GuidedPhase::GatheringDetails);
    }

    #[test]
    fn test_analyzing_moves_to_ready() {
        let step = advance(GuidedPhase::AnalyzingRequirements, &Requirements::default(), "ok");
        assert_eq!(step.phase, GuidedPhase::ReadyToGenerate);
    }
}
