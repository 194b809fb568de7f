//! Slash command handling for the REPL.

use chrono::Utc;
use uuid::Uuid;

use parley_agent::{Event, Outcome, SessionHandle, TransitionState};
use parley_core::{
    ActionType, AgentAction, AgentTask, ContextUpdate, FollowOnAction, Mode, Requirements,
};

/// Result of command execution.
pub enum CommandResult {
    /// Continue the REPL loop
    Continue,
    /// Exit the REPL
    Exit,
    /// An error occurred
    Error(String),
}

impl From<anyhow::Result<()>> for CommandResult {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => CommandResult::Continue,
            Err(e) => CommandResult::Error(e.to_string()),
        }
    }
}

/// Handle a slash command.
pub async fn handle_command(input: &str, handle: &SessionHandle) -> CommandResult {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let command = parts.first().copied().unwrap_or("");
    let args = &parts[1..];

    match command {
        "/help" | "/h" | "/?" => {
            print_help();
            CommandResult::Continue
        }
        "/exit" | "/quit" | "/q" => {
            println!("Goodbye!");
            CommandResult::Exit
        }
        "/mode" => handle_mode_command(args, handle, false).await.into(),
        "/force" => handle_mode_command(args, handle, true).await.into(),
        "/confirm" => handle_confirm_command(handle).await.into(),
        "/cancel" => handle_cancel_command(handle).await.into(),
        "/run" => handle_run_command(args, handle).await.into(),
        "/queue" => {
            print_queue(handle);
            CommandResult::Continue
        }
        "/approve" => handle_approval_command(args, handle, true).await.into(),
        "/reject" => handle_approval_command(args, handle, false).await.into(),
        "/retry" => handle_retry_command(args, handle).await.into(),
        "/actions" => {
            print_actions(handle);
            CommandResult::Continue
        }
        "/do" => handle_follow_on_command(args, handle, true).await.into(),
        "/dismiss" => handle_follow_on_command(args, handle, false).await.into(),
        "/requirements" | "/req" => handle_requirements_command(args, handle).await.into(),
        "/status" => {
            print_status(handle);
            CommandResult::Continue
        }
        _ => CommandResult::Error(format!(
            "Unknown command: {}. Type /help for available commands.",
            command
        )),
    }
}

/// Print help information.
fn print_help() {
    println!("Available commands:");
    println!();
    println!("  /help, /h, /?          Show this help message");
    println!("  /exit, /quit, /q       Exit the REPL");
    println!();
    println!("  /mode <mode>           Request a switch to guided, agentic or hybrid");
    println!("  /force <mode>          Switch modes without checking readiness");
    println!("  /confirm               Accept the proposed mode switch");
    println!("  /cancel                Decline the proposed mode switch");
    println!();
    println!("  /run [action]          Queue an action (optional) and process the queue");
    println!("  /queue                 Show queued, running and finished tasks");
    println!("  /approve <id>          Approve a gated task");
    println!("  /reject <id>           Reject a gated task");
    println!("  /retry <id>            Retry a failed task");
    println!();
    println!("  /actions               List suggested next steps");
    println!("  /do <n|id>             Run a suggested next step");
    println!("  /dismiss <n|id>        Hide a suggested next step");
    println!();
    println!("  /requirements          Show gathered requirements");
    println!("  /requirements <field> <value>");
    println!("                         Set a requirement field");
    println!("  /status                Show mode, phase and queue summary");
    println!();
    println!("Actions: {}", ACTION_NAMES.join(", "));
    println!("Ids may be shortened to any unique prefix.");
}

const ACTION_NAMES: [&str; 6] = [
    "gather_market_research",
    "generate_documents",
    "identify_vendors",
    "schedule_reviews",
    "submit_for_approval",
    "monitor_compliance",
];

fn short(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Resolve an id prefix against a set of candidates.
fn resolve_prefix(prefix: &str, candidates: impl IntoIterator<Item = Uuid>) -> anyhow::Result<Uuid> {
    let prefix = prefix.to_ascii_lowercase();
    let mut matches: Vec<Uuid> = candidates
        .into_iter()
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();
    matches.dedup();
    match matches.len() {
        0 => anyhow::bail!("No match for '{}'", prefix),
        1 => Ok(matches[0]),
        _ => anyhow::bail!(
            "Ambiguous id '{}'. Matches: {}",
            prefix,
            matches.iter().map(|id| short(*id)).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn report(outcome: Outcome) -> anyhow::Result<()> {
    match outcome {
        Outcome::Rejected(reason) => anyhow::bail!(reason),
        Outcome::Ignored => {
            println!("Nothing to do.");
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Handle /mode and /force.
async fn handle_mode_command(args: &[&str], handle: &SessionHandle, force: bool) -> anyhow::Result<()> {
    let Some(target) = args.first() else {
        println!("Current mode: {}", handle.snapshot().mode);
        return Ok(());
    };
    let target: Mode = target.parse().map_err(anyhow::Error::msg)?;

    let event = if force {
        Event::ForceTransition { target }
    } else {
        Event::RequestTransition {
            target,
            reason: "requested from the command line".to_string(),
        }
    };
    report(handle.dispatch(event).await?)
}

async fn handle_confirm_command(handle: &SessionHandle) -> anyhow::Result<()> {
    if handle.snapshot().pending_transition.is_none() {
        anyhow::bail!("No mode switch has been proposed");
    }
    report(handle.confirm_transition().await?)
}

async fn handle_cancel_command(handle: &SessionHandle) -> anyhow::Result<()> {
    let snapshot = handle.snapshot();
    let id = match (&snapshot.pending_transition, &snapshot.transition) {
        (Some(pending), _) => pending.id,
        (None, TransitionState::Transitioning { id, .. }) => *id,
        _ => anyhow::bail!("No mode switch to cancel"),
    };
    report(handle.cancel_transition(id).await?)?;
    println!("Mode switch cancelled.");
    Ok(())
}

/// Handle /run [action].
///
/// The drain runs in the background; the observer prints results.
async fn handle_run_command(args: &[&str], handle: &SessionHandle) -> anyhow::Result<()> {
    if let Some(name) = args.first() {
        let action_type: ActionType =
            serde_json::from_value(serde_json::Value::String(name.to_ascii_lowercase()))
                .map_err(|_| anyhow::anyhow!("Unknown action '{}'. Try: {}", name, ACTION_NAMES.join(", ")))?;
        let action = AgentAction::new(action_type)
            .with_approval(action_type.requires_approval_by_default());

        if let Outcome::Enqueued(id) = handle.enqueue(action, None, vec![]).await? {
            println!("Queued {} ({})", action_type.description(), short(id));
        }
    }

    if handle.snapshot().queue.active_drain.is_some() {
        println!("The queue is already being processed.");
        return Ok(());
    }

    let handle = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = handle.process_queue().await {
            eprintln!("Error: {}", e);
        }
    });
    Ok(())
}

fn print_tasks(title: &str, tasks: &[AgentTask]) {
    if tasks.is_empty() {
        return;
    }
    println!("{}:", title);
    for task in tasks {
        let detail = match (&task.output, &task.error) {
            (Some(output), _) => format!(" | {}", output.summary()),
            (None, Some(error)) => format!(" | {}", error),
            _ => String::new(),
        };
        println!(
            "  {}  {:?}  {:?}  {}{}",
            short(task.id),
            task.status,
            task.priority,
            task.action.description,
            detail
        );
    }
    println!();
}

fn print_queue(handle: &SessionHandle) {
    let queue = handle.snapshot().queue;
    if queue.queued.is_empty()
        && queue.awaiting_approval.is_empty()
        && queue.executing.is_empty()
        && queue.history.is_empty()
    {
        println!("The task queue is empty. Use /run <action> to add work.");
        return;
    }

    print_tasks("Running", &queue.executing);
    print_tasks("Awaiting approval", &queue.awaiting_approval);
    print_tasks("Queued", &queue.queued);
    print_tasks("History", &queue.history);
    println!(
        "{} succeeded, {} failed",
        queue.succeeded(),
        queue.failed()
    );
}

/// Handle /approve and /reject. Accepts a request id or a task id.
async fn handle_approval_command(args: &[&str], handle: &SessionHandle, approved: bool) -> anyhow::Result<()> {
    let pending = handle.snapshot().pending_approvals;
    let request_id = match args.first() {
        Some(prefix) => {
            let id = resolve_prefix(
                prefix,
                pending.iter().flat_map(|r| [r.id, r.task_id]),
            )?;
            pending
                .iter()
                .find(|r| r.id == id || r.task_id == id)
                .map(|r| r.id)
                .ok_or_else(|| anyhow::anyhow!("No pending approval for '{}'", prefix))?
        }
        None if pending.len() == 1 => pending[0].id,
        None if pending.is_empty() => anyhow::bail!("Nothing is waiting for approval"),
        None => anyhow::bail!("Several tasks await approval; give an id"),
    };

    report(handle.resolve(request_id, approved).await?)?;
    if approved {
        println!("Approved. Use /run to execute it.");
    } else {
        println!("Rejected.");
    }
    Ok(())
}

async fn handle_retry_command(args: &[&str], handle: &SessionHandle) -> anyhow::Result<()> {
    let Some(prefix) = args.first() else {
        anyhow::bail!("Usage: /retry <task id>");
    };
    let history = handle.snapshot().queue.history;
    let task_id = resolve_prefix(prefix, history.iter().map(|t| t.id))?;
    report(handle.retry(task_id).await?)?;
    println!("Task {} queued again. Use /run to execute it.", short(task_id));
    Ok(())
}

fn print_actions(handle: &SessionHandle) {
    let actions = handle.snapshot().follow_on_actions;
    if actions.is_empty() {
        println!("No suggested next steps right now.");
        return;
    }
    let now = Utc::now();
    for (i, action) in actions.iter().enumerate() {
        let expiry = match action.expires_at {
            Some(at) if at > now => format!(", expires in {} min", (at - now).num_minutes()),
            _ => String::new(),
        };
        println!(
            "{:>2}. {} ({:?}, ~{} min{}) [{}]",
            i + 1,
            action.title,
            action.priority,
            action.estimated_duration_secs / 60,
            expiry,
            short(action.id)
        );
        println!("    {}", action.description);
    }
}

/// Pick a follow-on by 1-based index or id prefix.
fn select_action(arg: &str, actions: &[FollowOnAction]) -> anyhow::Result<Uuid> {
    if let Ok(n) = arg.parse::<usize>() {
        return actions
            .get(n.wrapping_sub(1))
            .map(|a| a.id)
            .ok_or_else(|| anyhow::anyhow!("No suggestion #{}", n));
    }
    resolve_prefix(arg, actions.iter().map(|a| a.id))
}

/// Handle /do and /dismiss.
async fn handle_follow_on_command(args: &[&str], handle: &SessionHandle, execute: bool) -> anyhow::Result<()> {
    let Some(arg) = args.first() else {
        anyhow::bail!("Give a suggestion number or id (see /actions)");
    };
    let action_id = select_action(arg, &handle.snapshot().follow_on_actions)?;
    let outcome = if execute {
        handle.execute_follow_on(action_id).await?
    } else {
        handle.dismiss_follow_on(action_id).await?
    };
    report(outcome)
}

/// Handle /requirements [field value...].
async fn handle_requirements_command(args: &[&str], handle: &SessionHandle) -> anyhow::Result<()> {
    let Some((field, rest)) = args.split_first() else {
        print_requirements(&handle.snapshot().context.requirements);
        return Ok(());
    };
    let value = rest.join(" ");
    if value.is_empty() {
        anyhow::bail!("Usage: /requirements <field> <value>");
    }

    let mut update = Requirements::default();
    match *field {
        "title" => update.project_title = Some(value),
        "product" | "service" => update.product_or_service = Some(value),
        "value" => update.estimated_value = Some(value),
        "period" => update.performance_period = Some(value),
        "type" => update.requirement_type = Some(value),
        "need" => update.business_need = Some(value),
        "technical" => update.technical_requirements.push(value),
        "evaluation" => update.evaluation_criteria.push(value),
        "special" => update.special_considerations.push(value),
        other => anyhow::bail!(
            "Unknown field '{}'. Fields: title, product, value, period, type, need, technical, evaluation, special",
            other
        ),
    }

    report(handle.update_context(ContextUpdate::Requirements(update)).await?)?;
    print_requirements(&handle.snapshot().context.requirements);
    Ok(())
}

fn print_requirements(req: &Requirements) {
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    println!("Requirements ({:.0}% complete):", req.completion_percentage());
    println!("  Title:        {}", show(&req.project_title));
    println!("  Product:      {}", show(&req.product_or_service));
    println!("  Value:        {}", show(&req.estimated_value));
    println!("  Period:       {}", show(&req.performance_period));
    println!("  Type:         {}", show(&req.requirement_type));
    println!("  Need:         {}", show(&req.business_need));
    for (label, items) in [
        ("Technical", &req.technical_requirements),
        ("Evaluation", &req.evaluation_criteria),
        ("Special", &req.special_considerations),
    ] {
        if !items.is_empty() {
            println!("  {:<13} {}", format!("{}:", label), items.join("; "));
        }
    }
}

fn print_status(handle: &SessionHandle) {
    let snapshot = handle.snapshot();

    println!("Mode:        {}", snapshot.mode);
    match snapshot.transition {
        TransitionState::Stable => {}
        TransitionState::Transitioning { from, to, .. } => {
            println!("Transition:  {} → {} (settling)", from, to)
        }
        TransitionState::Error { ref reason } => println!("Transition:  failed: {}", reason),
    }
    if let Some(ref pending) = snapshot.pending_transition {
        println!(
            "Proposed:    switch to {} ({}). /confirm or /cancel",
            pending.target, pending.reason
        );
    }
    if let Some(phase) = snapshot.phase {
        println!("Phase:       {}", phase.label());
    }
    if let Some(state) = snapshot.agent_state {
        println!("Agent:       {:?}", state);
    }
    println!(
        "Progress:    {:.0}% of requirements",
        snapshot.context.requirements.completion_percentage()
    );
    println!(
        "Tasks:       {} queued, {} awaiting approval, {} running, {} done",
        snapshot.queue.queued.len(),
        snapshot.queue.awaiting_approval.len(),
        snapshot.queue.executing.len(),
        snapshot.queue.history.len()
    );
    if let Some(ref status) = snapshot.context.task_status {
        println!("Last status: {}", status);
    }
    println!("Suggestions: {}", snapshot.follow_on_actions.len());
    println!("Mode switches: {}", snapshot.transitions.len());

    if !snapshot.recovery_suggestions.is_empty() {
        println!("\nTo recover:");
        for suggestion in &snapshot.recovery_suggestions {
            println!("  - {}", suggestion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ActionCategory, ActionPriority};

    #[test]
    fn test_resolve_prefix() {
        let a = Uuid::parse_str("aaaaaaaa-0000-4000-8000-000000000001").unwrap();
        let b = Uuid::parse_str("aaaabbbb-0000-4000-8000-000000000002").unwrap();

        assert_eq!(resolve_prefix("aaaab", [a, b]).unwrap(), b);
        assert_eq!(resolve_prefix("AAAAAAAA", [a, b]).unwrap(), a);
        assert!(resolve_prefix("aaaa", [a, b]).is_err());
        assert!(resolve_prefix("ffff", [a, b]).is_err());
    }

    #[test]
    fn test_select_action_by_index() {
        let actions = vec![
            FollowOnAction::new(
                "Define Requirements",
                "Capture the core requirement fields",
                ActionCategory::RequirementGathering,
                ActionPriority::High,
            ),
            FollowOnAction::new(
                "Market Research",
                "Survey the vendor base",
                ActionCategory::MarketResearch,
                ActionPriority::Medium,
            ),
        ];

        assert_eq!(select_action("2", &actions).unwrap(), actions[1].id);
        assert!(select_action("0", &actions).is_err());
        assert!(select_action("3", &actions).is_err());
    }

    #[test]
    fn test_action_names_parse() {
        for name in ACTION_NAMES {
            let parsed: Result<ActionType, _> =
                serde_json::from_value(serde_json::Value::String(name.to_string()));
            assert!(parsed.is_ok(), "{} should parse", name);
        }
    }
}
