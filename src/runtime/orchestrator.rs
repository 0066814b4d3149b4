use anyhow::Result;
use colored::Colorize;
use tracing::{info, warn};

use crate::{
    app::{load_config, load_config_from, AppState, Config},
    cli::{handle_command, Cli, Commands, OutputFormat},
    proxy::serve,
    utils::log_progress,
};

use super::non_interactive::NonInteractiveRunner;
use super::repl::run_repl;

/// Main runtime orchestrator
pub struct Orchestrator {
    cli: Cli,
    config: Config,
}

impl Orchestrator {
    /// Create a new orchestrator from CLI args
    pub fn new(cli: Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(config_path) => load_config_from(config_path)?,
            None => match load_config() {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("{} Failed to load config: {:#}. Using defaults.", "warning:".yellow(), e);
                    Config::default()
                }
            },
        };

        Ok(Self { cli, config })
    }

    /// Run the orchestrator
    pub async fn run(self) -> Result<()> {
        if handle_command(&self.cli.command, &self.config).await? {
            return Ok(());
        }

        let Orchestrator { cli, mut config } = self;
        match cli.command {
            Commands::Serve { host, port } => {
                if let Some(host) = host {
                    config.server.host = host;
                }
                if let Some(port) = port {
                    config.server.port = port;
                }
                log_progress(1, 2, format!("Connecting {} backend", config.upstream.model));
                let state = AppState::from_config(config)?;
                log_progress(
                    2,
                    2,
                    format!(
                        "Serving on http://{}:{}",
                        state.config.server.host, state.config.server.port
                    ),
                );
                serve(state).await
            }
            Commands::Chat { proof } => {
                let state = AppState::from_config(config)?;
                if let Some(proof) = proof {
                    if let Err(kind) = state.session.authenticate(&proof) {
                        warn!(kind = kind.label(), "Payment proof rejected");
                        eprintln!("{}", kind.user_message().red());
                    }
                }
                info!(
                    messages = state.session.log().len(),
                    "Starting interactive session"
                );
                run_repl(state).await
            }
            Commands::Ask {
                prompt,
                proof,
                json,
            } => {
                let runner = NonInteractiveRunner::new(AppState::from_config(config)?);
                let result = runner.execute(prompt, proof.as_deref()).await;
                println!("{}", runner.format_result(&result, OutputFormat::from_json_flag(json)));

                if !result.errors.is_empty() {
                    std::process::exit(1);
                }
                Ok(())
            }
            Commands::Init | Commands::Status | Commands::Reset | Commands::Version => Ok(()),
        }
    }
}
