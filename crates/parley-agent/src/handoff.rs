//! Context handoff between modes.
//!
//! A transition extracts a [`HandoffBundle`] from the sub-state(s) of
//! the source mode and applies it to the sub-state(s) of the target
//! mode. Assistant messages are filtered by origin; user messages always
//! travel.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_core::message::merge_chronological;
use parley_core::{GuidedPhase, Mode, Requirements, SharedContext, UnifiedMessage, WorkflowPointer};
use parley_providers::Intent;

use crate::agentic::{AgentState, AgenticState};
use crate::guided::GuidedState;

/// Mode-agnostic snapshot carried across a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffBundle {
    pub requirements: Option<Requirements>,
    pub phase: Option<GuidedPhase>,
    pub intent: Option<Intent>,
    pub agent_state: Option<AgentState>,
    /// Chronological, deduplicated
    pub messages: Vec<UnifiedMessage>,
    pub shared_context: SharedContext,
    pub workflow: Option<WorkflowPointer>,
}

impl HandoffBundle {
    /// Ids of all user-authored messages in the bundle.
    pub fn user_message_ids(&self) -> HashSet<Uuid> {
        self.messages.iter().filter(|m| m.is_user()).map(|m| m.id).collect()
    }
}

/// The per-mode sub-states. Created lazily and kept for the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeStates {
    pub guided: Option<GuidedState>,
    pub agentic: Option<AgenticState>,
}

impl ModeStates {
    /// Create whichever sub-states `mode` needs and does not have yet.
    pub fn ensure(&mut self, mode: Mode) {
        if mode.includes_guided() && self.guided.is_none() {
            self.guided = Some(GuidedState::new());
        }
        if mode.includes_agentic() && self.agentic.is_none() {
            self.agentic = Some(AgenticState::new());
        }
    }

    /// Messages held by the sub-state(s) of `mode`.
    pub fn messages(&self, mode: Mode) -> Vec<UnifiedMessage> {
        let guided = self
            .guided
            .as_ref()
            .filter(|_| mode.includes_guided())
            .map(|g| g.messages.clone())
            .unwrap_or_default();
        let agentic = self
            .agentic
            .as_ref()
            .filter(|_| mode.includes_agentic())
            .map(|a| a.messages.clone())
            .unwrap_or_default();
        merge_chronological([guided, agentic])
    }
}

/// Whether a message belongs in the sub-state of a single-side mode.
fn visible_to(side: Mode, message: &UnifiedMessage) -> bool {
    message.is_user() || message.origin == side
}

/// Extract a handoff bundle from the source mode.
pub fn extract(from: Mode, states: &ModeStates, shared: &SharedContext) -> HandoffBundle {
    let guided = states.guided.as_ref().filter(|_| from.includes_guided());
    let agentic = states.agentic.as_ref().filter(|_| from.includes_agentic());

    let guided_messages = guided
        .map(|g| {
            g.messages
                .iter()
                .filter(|m| visible_to(Mode::Guided, m))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    let agentic_messages = agentic
        .map(|a| {
            a.messages
                .iter()
                .filter(|m| visible_to(Mode::Agentic, m))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    HandoffBundle {
        requirements: guided.map(|g| g.requirements.clone()),
        phase: guided.map(|g| g.phase),
        intent: agentic.and_then(|a| a.intent.clone()),
        agent_state: agentic.map(|a| a.agent_state),
        messages: merge_chronological([guided_messages, agentic_messages]),
        shared_context: shared.clone(),
        workflow: shared.workflow.clone(),
    }
}

/// Apply a bundle to the target mode's sub-states.
///
/// Sub-states must already exist (see [`ModeStates::ensure`]). Incoming
/// messages are merged with the ones already held, so nothing a
/// sub-state already had is lost either.
pub fn apply(bundle: &HandoffBundle, to: Mode, states: &mut ModeStates) {
    if to.includes_guided() {
        if let Some(guided) = states.guided.as_mut() {
            if let Some(ref requirements) = bundle.requirements {
                guided.requirements.merge(requirements);
            }
            if let Some(phase) = bundle.phase {
                guided.phase = phase;
            }
            let incoming = bundle
                .messages
                .iter()
                .filter(|m| visible_to(Mode::Guided, m))
                .cloned()
                .collect();
            guided.messages = merge_chronological([std::mem::take(&mut guided.messages), incoming]);
        }
    }

    if to.includes_agentic() {
        if let Some(agentic) = states.agentic.as_mut() {
            if bundle.intent.is_some() {
                agentic.intent.clone_from(&bundle.intent);
            }
            let incoming = bundle
                .messages
                .iter()
                .filter(|m| visible_to(Mode::Agentic, m))
                .cloned()
                .collect();
            agentic.messages = merge_chronological([std::mem::take(&mut agentic.messages), incoming]);
        }
    }
}

/// User messages from the bundle missing in the target mode's sub-states.
pub fn missing_user_messages(bundle: &HandoffBundle, to: Mode, states: &ModeStates) -> Vec<Uuid> {
    let held: HashSet<Uuid> = states.messages(to).iter().map(|m| m.id).collect();
    bundle
        .user_message_ids()
        .into_iter()
        .filter(|id| !held.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use parley_core::UserPreferences;
    use parley_providers::IntentType;

    fn shared() -> SharedContext {
        SharedContext::new(Uuid::new_v4(), UserPreferences::default())
    }

    fn at(mut m: UnifiedMessage, secs_ago: i64) -> UnifiedMessage {
        m.timestamp = Utc::now() - Duration::seconds(secs_ago);
        m
    }

    fn guided_states() -> ModeStates {
        let mut states = ModeStates::default();
        states.ensure(Mode::Guided);
        let guided = states.guided.as_mut().unwrap();
        guided.phase = GuidedPhase::ReadyToGenerate;
        guided.requirements.product_or_service = Some("Laptops".to_string());
        guided.messages = vec![
            at(UnifiedMessage::user("Laptops", Mode::Guided), 30),
            at(UnifiedMessage::assistant("Value?", Mode::Guided), 29),
            at(UnifiedMessage::user("$40k", Mode::Guided), 28),
        ];
        states
    }

    #[test]
    fn test_guided_to_agentic_keeps_users_drops_guided_assistant() {
        let mut states = guided_states();
        let bundle = extract(Mode::Guided, &states, &shared());
        assert_eq!(bundle.phase, Some(GuidedPhase::ReadyToGenerate));
        assert_eq!(bundle.messages.len(), 3);

        states.ensure(Mode::Agentic);
        apply(&bundle, Mode::Agentic, &mut states);

        let agentic = states.agentic.as_ref().unwrap();
        assert_eq!(agentic.messages.len(), 2);
        assert!(agentic.messages.iter().all(|m| m.is_user()));
        assert!(missing_user_messages(&bundle, Mode::Agentic, &states).is_empty());
    }

    #[test]
    fn test_round_trip_preserves_user_messages() {
        let mut states = guided_states();
        let original_users: HashSet<Uuid> = states
            .guided
            .as_ref()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.is_user())
            .map(|m| m.id)
            .collect();

        // guided -> agentic
        let bundle = extract(Mode::Guided, &states, &shared());
        states.ensure(Mode::Agentic);
        apply(&bundle, Mode::Agentic, &mut states);
        let agentic = states.agentic.as_mut().unwrap();
        agentic.messages.push(UnifiedMessage::user("run vendor search", Mode::Agentic));
        agentic.messages.push(UnifiedMessage::assistant("Searching", Mode::Agentic));
        agentic.intent = Some(Intent::new(IntentType::CheckStatus, 0.8, true));

        // agentic -> hybrid
        let bundle = extract(Mode::Agentic, &states, &shared());
        states.ensure(Mode::Hybrid);
        apply(&bundle, Mode::Hybrid, &mut states);

        // hybrid -> guided
        let bundle = extract(Mode::Hybrid, &states, &shared());
        assert_eq!(bundle.intent.as_ref().map(|i| i.intent_type), Some(IntentType::CheckStatus));
        apply(&bundle, Mode::Guided, &mut states);

        let guided = states.guided.as_ref().unwrap();
        let held: HashSet<Uuid> = guided.messages.iter().map(|m| m.id).collect();
        assert!(original_users.is_subset(&held));
        assert!(guided.messages.iter().any(|m| m.content == "run vendor search"));
        assert!(!guided.messages.iter().any(|m| m.content == "Searching"));
        // Guided assistant message survived the round trip in place
        assert!(guided.messages.iter().any(|m| m.content == "Value?"));
    }

    #[test]
    fn test_hybrid_extraction_merges_by_time() {
        let mut states = ModeStates::default();
        states.ensure(Mode::Hybrid);
        let early = at(UnifiedMessage::user("first", Mode::Agentic), 20);
        let late = at(UnifiedMessage::user("second", Mode::Guided), 10);
        states.guided.as_mut().unwrap().messages = vec![late.clone()];
        states.agentic.as_mut().unwrap().messages = vec![early.clone(), late.clone()];

        let bundle = extract(Mode::Hybrid, &states, &shared());
        let ids: Vec<Uuid> = bundle.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }
}
