/// Runtime orchestrator module - Gateway

mod non_interactive;
mod orchestrator;
mod repl;
mod session;

pub use non_interactive::{ExecutionMetadata, NonInteractiveResult, NonInteractiveRunner};
pub use orchestrator::Orchestrator;
pub use repl::{parse_line, run_repl, ReplInput};
pub use session::{ConversationSession, SubmissionStatus, Turn};
