use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::app::AppState;
use crate::utils::GENERIC_FAILURE_MESSAGE;

const LOADING_TEXT: &str = "Loading.. Please wait...";

/// One line of REPL input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Prompt(String),
    Auth(String),
    Reset,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Classify a raw input line
pub fn parse_line(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplInput::Empty;
    }
    if !trimmed.starts_with('/') {
        return ReplInput::Prompt(trimmed.to_string());
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };
    match command {
        "/auth" => ReplInput::Auth(rest.to_string()),
        "/reset" => ReplInput::Reset,
        "/status" => ReplInput::Status,
        "/help" => ReplInput::Help,
        "/quit" | "/exit" => ReplInput::Quit,
        other => ReplInput::Unknown(other.to_string()),
    }
}

fn print_help() {
    println!("  {}  present a payment proof", "/auth <proof>".cyan());
    println!("  {}         clear the conversation and access", "/reset".cyan());
    println!("  {}        show session state", "/status".cyan());
    println!("  {}          leave", "/quit".cyan());
}

fn print_status(state: &AppState) {
    let session = &state.session;
    let log = session.log();
    println!(
        "  access: {}",
        if session.is_authenticated() {
            "authenticated".green()
        } else {
            "locked".yellow()
        }
    );
    println!("  status: {}", session.status().label());
    println!(
        "  messages: {} ({} tokens)",
        log.len(),
        log.total_tokens()
    );
    if let Some(payment_ref) = session.last_payment_ref() {
        println!("  last payment: {}{}", state.config.session.explorer_url, payment_ref);
    }
}

fn prompt_marker() {
    print!("{} ", ">".bold());
    let _ = std::io::stdout().flush();
}

/// Interactive chat loop over stdin
pub async fn run_repl(state: AppState) -> Result<()> {
    let session = state.session.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", "Paychat - type /help for commands".bold());
    if !session.is_authenticated() {
        println!("{}", "Present a payment proof with /auth <proof> to start.".yellow());
    }
    for message in session.log().messages() {
        println!("{} {}", format!("[{}]", message.role().as_str()).dimmed(), message.content());
    }

    loop {
        prompt_marker();
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_line(&line) {
            ReplInput::Empty => continue,
            ReplInput::Quit => break,
            ReplInput::Help => print_help(),
            ReplInput::Status => print_status(&state),
            ReplInput::Unknown(command) => {
                println!("{} {}", "Unknown command:".yellow(), command);
            }
            ReplInput::Auth(proof) => match session.authenticate(&proof) {
                Ok(()) => println!("{}", "Access granted.".green()),
                Err(kind) => println!("{}", kind.user_message().red()),
            },
            ReplInput::Reset => match session.reset() {
                Ok(()) => println!("{}", "Conversation cleared.".green()),
                Err(kind) => println!("{}", kind.user_message().red()),
            },
            ReplInput::Prompt(prompt) => {
                let mut status = session.subscribe();
                let handle = match session.dispatch(&prompt) {
                    Ok(handle) => handle,
                    Err(kind) => {
                        println!("{}", kind.user_message().red());
                        continue;
                    }
                };
                if status.borrow_and_update().is_pending() {
                    println!("{}", LOADING_TEXT.dimmed());
                }

                match handle.await {
                    Ok(Ok(turn)) => {
                        println!("{}", turn.assistant.content());
                        if let Some(tokens) = turn.assistant.tokens() {
                            println!("{}", format!("Tokens used: {}", tokens).dimmed());
                        }
                        if let Some(link) = state.explorer_link(&turn.assistant) {
                            println!("{} {}", "Payment:".dimmed(), link);
                        }
                    }
                    Ok(Err(kind)) => println!("{}", kind.user_message().red()),
                    Err(e) => {
                        debug!("Submission task ended abnormally: {}", e);
                        println!("{}", GENERIC_FAILURE_MESSAGE.red());
                    }
                }
            }
        }
    }

    Ok(())
}
