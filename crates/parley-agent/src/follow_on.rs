//! Follow-on action engine.
//!
//! Holds the current suggestion set and tracks which suggestions were
//! completed or dismissed. Generation itself is done by a
//! [`parley_providers::FollowOnActionService`]; the engine decides when
//! a new set is needed and where each action is executed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use parley_core::{ActionCategory, FollowOnAction, FollowOnActionSet, Mode};

/// Which side of the session executes a follow-on action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Enqueued on the task queue
    Agentic,
    /// Executed through the follow-on service
    Guided,
}

/// Route an action of `category` while in `mode`.
pub fn route(category: ActionCategory, mode: Mode) -> Route {
    match mode {
        Mode::Guided => Route::Guided,
        Mode::Agentic => Route::Agentic,
        Mode::Hybrid if category.is_agentic() => Route::Agentic,
        Mode::Hybrid => Route::Guided,
    }
}

/// Suggestion set plus completion bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct FollowOnEngine {
    current: Option<FollowOnActionSet>,
    completed: HashSet<Uuid>,
    completed_titles: Vec<String>,
    dismissed: HashSet<Uuid>,
    /// Running actions by id, with their titles; they outlive set replacement
    in_flight: HashMap<Uuid, String>,
    ever_completed: usize,
    generation_pending: bool,
    surfaced: usize,
}

impl FollowOnEngine {
    /// Engine surfacing the top `surfaced` actions.
    pub fn new(surfaced: usize) -> Self {
        Self {
            surfaced,
            ..Self::default()
        }
    }

    /// Replace the current set with a freshly generated one.
    pub fn install(&mut self, set: FollowOnActionSet) {
        debug!(set_id = %set.id, actions = set.actions.len(), "Installed follow-on set");
        self.generation_pending = false;
        self.current = Some(set);
    }

    pub fn current(&self) -> Option<&FollowOnActionSet> {
        self.current.as_ref()
    }

    /// Actions of the current set that are neither completed, dismissed
    /// nor expired, in generation order.
    pub fn available_actions(&self, completed: &HashSet<Uuid>, now: DateTime<Utc>) -> Vec<FollowOnAction> {
        self.current
            .iter()
            .flat_map(|set| set.actions.iter())
            .filter(|a| !completed.contains(&a.id))
            .filter(|a| !self.dismissed.contains(&a.id))
            .filter(|a| !a.is_expired(now))
            .cloned()
            .collect()
    }

    /// Available actions, highest priority first. Ties keep generation order.
    pub fn ranked(&self, now: DateTime<Utc>) -> Vec<FollowOnAction> {
        let mut actions = self.available_actions(&self.completed, now);
        actions.sort_by(|a, b| b.priority.cmp(&a.priority));
        actions
    }

    /// The top ranked actions shown in the transcript.
    pub fn surfaced(&self, now: DateTime<Utc>) -> Vec<FollowOnAction> {
        self.ranked(now).into_iter().take(self.surfaced).collect()
    }

    /// Ranked actions beyond the surfaced ones.
    pub fn overflow(&self, now: DateTime<Utc>) -> Vec<FollowOnAction> {
        self.ranked(now).into_iter().skip(self.surfaced).collect()
    }

    /// Look up an available action by id.
    pub fn get(&self, id: Uuid, now: DateTime<Utc>) -> Option<FollowOnAction> {
        self.available_actions(&self.completed, now)
            .into_iter()
            .find(|a| a.id == id)
    }

    /// Titles of every action completed in this session.
    pub fn completed_titles(&self) -> &[String] {
        &self.completed_titles
    }

    pub fn completed_ids(&self) -> &HashSet<Uuid> {
        &self.completed
    }

    /// Mark an action as started. Returns false if it already is.
    pub fn begin(&mut self, action: &FollowOnAction) -> bool {
        if self.in_flight.contains_key(&action.id) {
            return false;
        }
        self.in_flight.insert(action.id, action.title.clone());
        true
    }

    pub fn is_in_flight(&self, id: Uuid) -> bool {
        self.in_flight.contains_key(&id)
    }

    /// Title of a running or current action.
    pub fn title(&self, id: Uuid) -> Option<String> {
        self.in_flight.get(&id).cloned().or_else(|| {
            self.current
                .as_ref()
                .and_then(|set| set.actions.iter().find(|a| a.id == id))
                .map(|a| a.title.clone())
        })
    }

    /// Execution finished without completing the action.
    pub fn abandon(&mut self, id: Uuid) {
        self.in_flight.remove(&id);
    }

    /// Record a completion. Returns false for unknown or repeated ids.
    ///
    /// A running action completes even if a newer set replaced its own.
    pub fn complete(&mut self, id: Uuid) -> bool {
        let running = self.in_flight.remove(&id);
        if self.completed.contains(&id) {
            return false;
        }
        let Some(title) = running.or_else(|| self.title(id)) else {
            return false;
        };
        self.completed_titles.push(title);
        self.completed.insert(id);
        self.ever_completed += 1;
        true
    }

    /// Hide an action without completing it.
    pub fn dismiss(&mut self, id: Uuid) -> bool {
        let known = self
            .current
            .as_ref()
            .map(|set| set.actions.iter().any(|a| a.id == id))
            .unwrap_or(false);
        known && self.dismissed.insert(id)
    }

    /// Whether a new set is needed: nothing is left and at least one
    /// action has ever been completed.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.ever_completed > 0 && self.available_actions(&self.completed, now).is_empty()
    }

    /// Called after every completion. Returns true when the caller should
    /// generate a new set; the engine then waits for [`install`] or
    /// [`generation_failed`].
    ///
    /// [`install`]: Self::install
    /// [`generation_failed`]: Self::generation_failed
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        if self.generation_pending || !self.needs_refresh(now) {
            return false;
        }
        self.generation_pending = true;
        true
    }

    /// Start a generation regardless of the refresh rule. Returns false
    /// when one is already pending.
    pub fn begin_generation(&mut self) -> bool {
        if self.generation_pending {
            return false;
        }
        self.generation_pending = true;
        true
    }

    pub fn generation_failed(&mut self) {
        self.generation_pending = false;
    }

    pub fn generation_pending(&self) -> bool {
        self.generation_pending
    }
}

/// Transcript text listing suggested next steps.
pub fn describe(actions: &[FollowOnAction]) -> String {
    let mut out = String::from("Suggested next steps:");
    for (i, action) in actions.iter().enumerate() {
        let minutes = action.estimated_duration_secs / 60;
        out.push_str(&format!("\n{}. {} ({:?}, ~{} min)", i + 1, action.title, action.priority, minutes));
        if action.requires_user_input {
            out.push_str(" [needs input]");
        }
    }
    out
}
