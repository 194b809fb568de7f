//! Configuration commands.

use std::sync::Arc;

use parley_core::Config;

use crate::{AppContext, ConfigAction};

pub fn handle(action: ConfigAction, ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let mut config = ctx.config.clone();
            if let Some(key) = config.providers.openai.as_mut().and_then(|c| c.api_key.as_mut()) {
                *key = "********".to_string();
            }

            println!("# Effective configuration\n");
            print!("{}", config.to_toml()?);

            let result = ctx.config.validate();
            for issue in &result.issues {
                eprintln!("[{:?}] {}: {}", issue.severity, issue.field, issue.message);
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_dir().join("config.toml").display());
        }
    }
    Ok(())
}
