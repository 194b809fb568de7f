//! Diagnostic command to check installation.

use std::sync::Arc;

use parley_core::Config;
use parley_providers::LocalProvider;

use crate::AppContext;

pub async fn run(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    println!("Running diagnostics...\n");

    let config_dir = Config::config_dir();
    println!("Config directory: {:?}", config_dir);
    if config_dir.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist (defaults in use)");
    }

    let data_dir = Config::data_dir();
    println!("\nData directory: {:?}", data_dir);
    if data_dir.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist (will be created on first use)");
    }

    println!("\nConfiguration:");
    let result = ctx.config.validate();
    if result.issues.is_empty() {
        println!("  ✓ Valid");
    }
    for issue in result.errors() {
        println!("  ✗ {}: {}", issue.field, issue.message);
    }
    for issue in result.warnings() {
        println!("  ! {}: {}", issue.field, issue.message);
    }

    println!("\nProviders:");
    let mut providers = ctx.registry.list();
    providers.sort_unstable();
    if providers.is_empty() {
        println!("  ✗ No providers configured (replies use the built-in fallback)");
    } else {
        for provider_id in &providers {
            if let Some(provider) = ctx.registry.get(provider_id) {
                let status = if provider.is_configured() {
                    "✓ configured"
                } else {
                    "✗ not configured"
                };
                println!("  {} {} ({})", status, provider.name(), provider_id);
            }
        }
    }

    if let Some(default) = ctx.registry.default_provider() {
        println!("\nDefault provider: {} ({})", default.name(), default.id());
    } else {
        println!("\nDefault provider: ✗ none");
    }

    println!("\nAPI Keys:");
    if std::env::var("OPENAI_API_KEY").is_ok() {
        println!("  ✓ OPENAI_API_KEY is set");
    } else {
        println!("  ✗ OPENAI_API_KEY is not set");
    }

    println!("\nLocal Models (Ollama):");
    let ollama = match ctx.config.providers.local.as_ref().and_then(|l| l.base_url.clone()) {
        Some(url) => LocalProvider::with_url(url),
        None => LocalProvider::new(),
    };
    if ollama.is_running().await {
        println!("  ✓ Ollama is running");
        match ollama.list_models().await {
            Ok(models) if models.is_empty() => println!("  ✗ No models installed"),
            Ok(models) => {
                println!("  Available models:");
                for model in models.iter().take(5) {
                    println!("    - {}", model);
                }
                if models.len() > 5 {
                    println!("    ... and {} more", models.len() - 5);
                }
            }
            Err(e) => println!("  ✗ Failed to list models: {}", e),
        }
    } else {
        println!("  ✗ Ollama is not running");
    }

    println!("\nDiagnostics complete.");
    Ok(())
}
