use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "paychat")]
#[command(version)]
#[command(about = "A pay-gated conversational relay for chat completion APIs", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration
    Init,
    /// Run the relay endpoint
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Start an interactive chat session
    Chat {
        /// Payment proof to authenticate with
        #[arg(long, env = "ACCESS_PROOF", hide_env_values = true)]
        proof: Option<String>,
    },
    /// Send a single prompt and print the reply
    Ask {
        /// The prompt to send
        prompt: String,
        /// Payment proof to authenticate with
        #[arg(long, env = "ACCESS_PROOF", hide_env_values = true)]
        proof: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show configuration and session status
    Status,
    /// Clear the persisted conversation and access proof
    Reset,
    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON structured output
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}
