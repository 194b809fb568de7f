//! Session observer for CLI integration.
//!
//! [`CliObserver`] prints transcript messages, mode changes, approval
//! prompts and drain summaries as the session runtime reports them.

use std::io::{self, Write};

use parley_agent::{ApprovalRequest, SessionObserver, TaskResult};
use parley_core::{Mode, Role, UnifiedMessage};

/// Observer that writes session activity to the terminal.
///
/// User messages are not echoed; the user just typed them.
#[derive(Debug, Default)]
pub struct CliObserver;

impl CliObserver {
    pub fn new() -> Self {
        Self
    }
}

impl SessionObserver for CliObserver {
    fn on_message(&self, message: &UnifiedMessage) {
        let mut out = io::stdout().lock();
        let _ = match message.role {
            Role::User => return,
            Role::System => writeln!(out, "\n[{}]", message.content),
            Role::Assistant if message.is_status() => writeln!(out, "\n{}", message.content),
            Role::Assistant => writeln!(out, "\n({}) {}", message.origin, message.content),
        };
        out.flush().ok();
    }

    fn on_mode_changed(&self, from: Mode, to: Mode) {
        eprintln!("[Mode: {} → {}]", from, to);
    }

    fn on_approval_needed(&self, request: &ApprovalRequest) {
        let id = request.id.to_string();
        eprintln!(
            "[Approval {}] {} (impact: {:?}). Use /approve {} or /reject {}",
            &id[..8],
            request.message,
            request.impact,
            &id[..8],
            &id[..8]
        );
    }

    fn on_drain_finished(&self, results: &[TaskResult]) {
        if results.is_empty() {
            return;
        }
        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        eprintln!(
            "[Queue: {} task(s) finished, {} succeeded, {} failed]",
            results.len(),
            succeeded,
            results.len() - succeeded
        );
    }
}
