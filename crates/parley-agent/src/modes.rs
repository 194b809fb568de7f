//! Mode transition rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_core::{GuidedPhase, Mode};

/// Progress of the current mode transition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TransitionState {
    /// No transition in progress
    #[default]
    Stable,
    /// A transition was performed and is settling
    Transitioning { id: Uuid, from: Mode, to: Mode },
    /// The last handoff could not be verified
    Error { reason: String },
}

impl TransitionState {
    /// Whether mode-specific mutations must be rejected.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, TransitionState::Transitioning { .. })
    }

    /// Whether the state is `Stable`.
    pub fn is_stable(&self) -> bool {
        matches!(self, TransitionState::Stable)
    }
}

/// What the validity table needs to know about the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionFacts {
    /// Phase of the guided sub-state, if it exists
    pub guided_phase: Option<GuidedPhase>,
    /// Whether a task is currently executing
    pub task_executing: bool,
}

/// Check a transition against the validity table.
pub fn is_transition_allowed(from: Mode, to: Mode, facts: &TransitionFacts) -> bool {
    match (from, to) {
        (a, b) if a == b => true,
        (Mode::Guided, Mode::Agentic) => facts.guided_phase == Some(GuidedPhase::ReadyToGenerate),
        (Mode::Guided, Mode::Hybrid) => matches!(
            facts.guided_phase,
            Some(GuidedPhase::AnalyzingRequirements)
                | Some(GuidedPhase::ConfirmingPredictions)
                | Some(GuidedPhase::ReadyToGenerate)
        ),
        (Mode::Agentic, Mode::Guided) => true,
        (Mode::Agentic, Mode::Hybrid) => !facts.task_executing,
        (Mode::Hybrid, _) => true,
        _ => false,
    }
}

/// A transition the system suggested and the user has not answered yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransition {
    pub id: Uuid,
    pub target: Mode,
    pub reason: String,
    pub proposed_at: DateTime<Utc>,
}

impl PendingTransition {
    pub fn new(target: Mode, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            reason: reason.into(),
            proposed_at: Utc::now(),
        }
    }
}

/// A performed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: Uuid,
    pub from: Mode,
    pub to: Mode,
    pub reason: String,
    pub forced: bool,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(phase: Option<GuidedPhase>, executing: bool) -> TransitionFacts {
        TransitionFacts {
            guided_phase: phase,
            task_executing: executing,
        }
    }

    #[test]
    fn test_all_pairs_in_ready_phase() {
        let ready = facts(Some(GuidedPhase::ReadyToGenerate), false);
        for from in Mode::ALL {
            for to in Mode::ALL {
                assert!(
                    is_transition_allowed(from, to, &ready),
                    "{} -> {} should be allowed when ready and idle",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_guided_to_agentic_requires_ready() {
        for phase in [
            GuidedPhase::Initial,
            GuidedPhase::GatheringBasics,
            GuidedPhase::GatheringDetails,
            GuidedPhase::AnalyzingRequirements,
            GuidedPhase::ConfirmingPredictions,
        ] {
            assert!(!is_transition_allowed(
                Mode::Guided,
                Mode::Agentic,
                &facts(Some(phase), false)
            ));
        }
        assert!(!is_transition_allowed(Mode::Guided, Mode::Agentic, &facts(None, false)));
    }

    #[test]
    fn test_guided_to_hybrid_phases() {
        let allowed = |p| is_transition_allowed(Mode::Guided, Mode::Hybrid, &facts(Some(p), false));
        assert!(!allowed(GuidedPhase::Initial));
        assert!(!allowed(GuidedPhase::GatheringBasics));
        assert!(!allowed(GuidedPhase::GatheringDetails));
        assert!(allowed(GuidedPhase::AnalyzingRequirements));
        assert!(allowed(GuidedPhase::ConfirmingPredictions));
        assert!(allowed(GuidedPhase::ReadyToGenerate));
    }

    #[test]
    fn test_agentic_to_hybrid_blocked_while_executing() {
        let busy = facts(Some(GuidedPhase::Initial), true);
        assert!(!is_transition_allowed(Mode::Agentic, Mode::Hybrid, &busy));
        assert!(is_transition_allowed(Mode::Agentic, Mode::Guided, &busy));
        assert!(is_transition_allowed(Mode::Hybrid, Mode::Agentic, &busy));
        assert!(is_transition_allowed(Mode::Hybrid, Mode::Guided, &busy));
        assert!(is_transition_allowed(Mode::Agentic, Mode::Agentic, &busy));
    }
}
