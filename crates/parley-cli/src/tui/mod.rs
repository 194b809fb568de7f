//! Terminal UI for interactive mode.
//!
//! Provides a readline-style REPL with:
//! - Input history
//! - Slash commands for modes, the task queue, approvals and follow-ons
//! - Transcript output through [`CliObserver`]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::time::timeout;

use parley_agent::{SessionBuilder, SessionHandle, Snapshot};
use parley_core::message::meta;

use crate::{AppContext, Cli};

mod commands;
mod handlers;

pub use handlers::CliObserver;

/// How long to wait for the reply to a message before showing the prompt.
const REPLY_WAIT: Duration = Duration::from_secs(60);

/// Run the interactive REPL.
pub async fn run(cli: Cli, ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let handle = start_session(&cli, &ctx)?;

    print_welcome_banner(&cli, &ctx, &handle);

    let mut editor = DefaultEditor::new()?;

    let history_path = get_history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
    }

    if let Some(ref prompt) = cli.prompt {
        process_message(prompt, &handle).await?;
    }

    loop {
        let prompt = format!("\n[{}] >>> ", handle.snapshot().mode);

        match editor.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                let _ = editor.add_history_entry(line);

                if line.starts_with('/') {
                    match commands::handle_command(line, &handle).await {
                        commands::CommandResult::Continue => continue,
                        commands::CommandResult::Exit => break,
                        commands::CommandResult::Error(e) => {
                            eprintln!("Error: {}", e);
                            continue;
                        }
                    }
                }

                if let Err(e) = process_message(line, &handle).await {
                    eprintln!("Error: {}", e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                // Stop the running drain, if any
                if let Some(drain_id) = handle.snapshot().queue.active_drain {
                    let _ = handle.cancel_drain(drain_id).await;
                }
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    handle.shutdown();

    if let Some(parent) = history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = editor.save_history(&history_path);

    Ok(())
}

/// Build and spawn the session runtime.
fn start_session(cli: &Cli, ctx: &AppContext) -> anyhow::Result<SessionHandle> {
    let model = ctx.model(cli);

    let mut builder = SessionBuilder::from_config(&ctx.config)
        .model(model.clone())
        .completion(ctx.registry.completion())
        .executor(ctx.executor())
        .follow_on(ctx.planner(&model))
        .observer(Arc::new(CliObserver::new()));

    if let Some(mode) = cli.mode {
        builder = builder.initial_mode(mode);
    }

    Ok(builder.spawn()?)
}

/// Send a message and wait for the reply to show up.
async fn process_message(input: &str, handle: &SessionHandle) -> anyhow::Result<()> {
    let before = replies(&handle.snapshot());
    handle.send_message(input).await?;

    if timeout(REPLY_WAIT, handle.wait_for(|s| replies(s) > before))
        .await
        .is_err()
    {
        eprintln!("[Still waiting for a reply; it will print when ready]");
    }
    Ok(())
}

fn replies(snapshot: &Snapshot) -> usize {
    snapshot
        .messages
        .iter()
        .filter(|m| m.metadata.contains_key(meta::REPLY_TO))
        .count()
}

/// Print the welcome banner.
fn print_welcome_banner(cli: &Cli, ctx: &AppContext, handle: &SessionHandle) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!(
        "║  parley v{:<52}║",
        env!("CARGO_PKG_VERSION")
    );
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Type /help for commands, or describe your acquisition.      ║");
    println!("║  Press Ctrl+D to exit, Ctrl+C to stop running tasks.         ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    if let Some(provider) = ctx.registry.default_provider() {
        println!("[Provider: {} | Model: {}]", provider.name(), ctx.model(cli));
    } else {
        println!("[No provider configured. Replies use built-in guidance; set OPENAI_API_KEY to enable a model]");
    }

    println!("[Mode: {}]", handle.snapshot().mode);
}

/// Get the path to the history file.
fn get_history_path() -> PathBuf {
    parley_core::Config::data_dir().join("history.txt")
}
