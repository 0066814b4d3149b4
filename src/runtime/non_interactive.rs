use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::{app::AppState, cli::OutputFormat};

/// Result of a single `ask` run
#[derive(Debug, Serialize, Deserialize)]
pub struct NonInteractiveResult {
    /// The prompt that was submitted
    pub prompt: String,
    /// The assistant reply, empty on failure
    pub response: String,
    /// User-safe error texts
    pub errors: Vec<String>,
    /// Metadata about the execution
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// Model configured for the upstream
    pub model: String,
    /// Tokens reported by the upstream
    pub tokens_used: Option<u64>,
    /// Payment reference attached to the reply
    pub payment_ref: Option<String>,
    /// Block explorer link for `payment_ref`
    pub explorer_url: Option<String>,
    /// Execution time in milliseconds
    pub duration_ms: u128,
}

/// Runs one prompt through the session and reports the outcome
pub struct NonInteractiveRunner {
    state: AppState,
}

impl NonInteractiveRunner {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Authenticate if a proof is given, then submit `prompt` once
    pub async fn execute(&self, prompt: String, proof: Option<&str>) -> NonInteractiveResult {
        let start_time = Instant::now();
        let session = &self.state.session;
        let mut errors = Vec::new();
        let mut response = String::new();
        let mut tokens_used = None;
        let mut payment_ref = None;
        let mut explorer_url = None;

        let authenticated = match proof {
            Some(proof) if !session.is_authenticated() => match session.authenticate(proof) {
                Ok(()) => true,
                Err(kind) => {
                    warn!(kind = kind.label(), "Payment proof rejected");
                    errors.push(kind.user_message().to_string());
                    false
                }
            },
            _ => true,
        };

        if authenticated {
            match session.submit(&prompt).await {
                Ok(turn) => {
                    response = turn.assistant.content().to_string();
                    tokens_used = turn.assistant.tokens();
                    payment_ref = turn.assistant.payment_ref().map(str::to_string);
                    explorer_url = self.state.explorer_link(&turn.assistant);
                }
                Err(kind) => {
                    debug!(error = %kind, "Submission failed");
                    warn!(kind = kind.label(), "Submission failed");
                    errors.push(kind.user_message().to_string());
                }
            }
        }

        NonInteractiveResult {
            prompt,
            response,
            errors,
            metadata: ExecutionMetadata {
                model: self.state.config.upstream.model.clone(),
                tokens_used,
                payment_ref,
                explorer_url,
                duration_ms: start_time.elapsed().as_millis(),
            },
        }
    }

    /// Format the result according to the output format
    pub fn format_result(&self, result: &NonInteractiveResult, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_else(|e| {
                format!("{{\"error\": \"Failed to serialize result: {}\"}}", e)
            }),
            OutputFormat::Text => {
                let mut output = String::new();
                output.push_str(&result.response);

                if let Some(tokens) = result.metadata.tokens_used {
                    output.push_str(&format!("\n\n{}", format!("Tokens used: {}", tokens).dimmed()));
                }
                if let Some(ref link) = result.metadata.explorer_url {
                    output.push_str(&format!("\nPayment: {}", link));
                }

                if !result.errors.is_empty() {
                    output.push_str("\n--- Errors ---\n");
                    for error in &result.errors {
                        output.push_str(&format!("• {}\n", error));
                    }
                }

                output
            }
        }
    }
}
