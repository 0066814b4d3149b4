use anyhow::{Context, Result};
use colored::Colorize;

use crate::{
    app::{get_config_dir, init_config, Config},
    proxy::is_relay_running,
    session::SessionStore,
};

use super::Commands;

/// Handle subcommands that do not need a live session
///
/// Returns `Ok(false)` when the command needs the full runtime.
pub async fn handle_command(command: &Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Init => {
            println!("Initializing Paychat configuration...");
            for path in init_config()? {
                println!("  {} {}", "wrote".green(), path.display());
            }
            println!("Configuration initialized successfully!");
            Ok(true)
        }
        Commands::Version => {
            show_version();
            Ok(true)
        }
        Commands::Status => {
            show_status(config).await?;
            Ok(true)
        }
        Commands::Reset => {
            reset_session(config)?;
            Ok(true)
        }
        Commands::Serve { .. } | Commands::Chat { .. } | Commands::Ask { .. } => Ok(false),
    }
}

/// Show version information
pub fn show_version() {
    println!("Paychat v{}", env!("CARGO_PKG_VERSION"));
    println!("   A pay-gated conversational relay");
}

fn reset_session(config: &Config) -> Result<()> {
    let data_dir = config.data_dir()?;
    let store = SessionStore::open(&data_dir)
        .with_context(|| format!("Failed to open session store at {}", data_dir.display()))?;
    store.clear().context("Failed to clear session store")?;
    println!("Conversation and access proof cleared.");
    Ok(())
}

async fn show_status(config: &Config) -> Result<()> {
    println!("Paychat Status:");
    println!();

    // Completion backend
    println!(
        "  Backend: {} ({})",
        config.upstream.model.green(),
        config.upstream.api_url
    );
    if config.api_key().is_ok() {
        println!("  [OK] {}: Set", config.upstream.api_key_env);
    } else {
        println!("  [ERROR] {}: Not set", config.upstream.api_key_env);
    }

    if config.session.core_prompt.trim().is_empty() {
        println!("  [WARNING] Core prompt: Empty");
    } else {
        println!(
            "  [OK] Core prompt: {} chars",
            config.session.core_prompt.chars().count()
        );
    }

    // Persisted session
    let data_dir = config.data_dir()?;
    match SessionStore::open(&data_dir) {
        Ok(store) => {
            let snapshot = store.load();
            println!(
                "  [OK] Session: {} messages, {} tokens ({})",
                snapshot.log.len(),
                snapshot.log.total_tokens(),
                data_dir.display()
            );
            if store.load_proof().is_some() {
                println!("  [OK] Access: Authenticated");
            } else {
                println!("  [WARNING] Access: No payment proof on record");
            }
        }
        Err(e) => println!("  [ERROR] Session store: {}", e),
    }

    // Relay endpoint
    let base_url = format!("http://{}:{}", config.server.host, config.server.port);
    if is_relay_running(&base_url).await {
        println!("  [OK] Relay endpoint: Running at {}", base_url);
    } else {
        println!("  [WARNING] Relay endpoint: Not running");
    }

    if let Ok(dir) = get_config_dir() {
        let config_path = dir.join("config.toml");
        if config_path.exists() {
            println!("  [OK] Configuration: {}", config_path.display());
        } else {
            println!("  [WARNING] Configuration: Not found (using defaults)");
        }
    }

    println!();
    Ok(())
}
