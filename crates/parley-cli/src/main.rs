//! # parley-cli
//!
//! Command-line interface for Parley.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parley_core::{Config, Mode};
use parley_providers::{FollowOnPlanner, ProviderRegistry, SimulatedTaskExecutor};

mod commands;
mod tui;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
    pub registry: ProviderRegistry,
}

impl AppContext {
    /// Model used for replies and follow-on planning.
    pub fn model(&self, cli: &Cli) -> String {
        cli.model
            .clone()
            .unwrap_or_else(|| self.config.general.model.clone())
    }

    /// Build the built-in task executor from config.
    pub fn executor(&self) -> Arc<SimulatedTaskExecutor> {
        Arc::new(SimulatedTaskExecutor::new(Duration::from_millis(
            self.config.executor.simulated_latency_ms,
        )))
    }

    /// Follow-on planner, model-backed when a provider is configured.
    pub fn planner(&self, model: &str) -> Arc<FollowOnPlanner> {
        let planner = FollowOnPlanner::new();
        match self.registry.default_provider() {
            Some(provider) => Arc::new(planner.with_provider(provider, model)),
            None => Arc::new(planner),
        }
    }
}

/// Parley - contract-document assistant with guided and agentic modes
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Initial message to send (starts interactive mode after)
    #[arg(value_name = "PROMPT")]
    prompt: Option<String>,

    /// Mode to start in (guided, agentic, hybrid)
    #[arg(long, value_name = "MODE")]
    mode: Option<Mode>,

    /// Model to use for replies (e.g., gpt-4o-mini, llama3.2)
    #[arg(short, long)]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check installation and provider setup
    Doctor,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they don't interleave with the transcript
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load_validated().unwrap_or_else(|e| {
        eprintln!("{}", e.with_suggestion());
        tracing::warn!("Failed to load config, using defaults");
        Config::default()
    });

    let registry = ProviderRegistry::from_config(&config);
    let ctx = Arc::new(AppContext { config, registry });

    match cli.command {
        Some(Commands::Config { action }) => {
            commands::config::handle(action, &ctx)?;
        }
        Some(Commands::Doctor) => {
            commands::doctor::run(&ctx).await?;
        }
        None => {
            tui::run(cli, ctx).await?;
        }
    }

    Ok(())
}
