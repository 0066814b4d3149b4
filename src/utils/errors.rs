use thiserror::Error;

/// The only failure text ever shown to the presentation layer
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred during processing.";

/// Failure taxonomy for a single submission
///
/// Every variant is recoverable at the session boundary. The detail strings
/// on `Transport` and `Upstream` are for logs only; use [`ErrorKind::user_message`]
/// for anything a user sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("a submission is already in flight")]
    Busy,

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("invalid proof")]
    InvalidProof,

    #[error("stored session is corrupt")]
    StorageCorrupt,
}

impl ErrorKind {
    /// Text safe to surface to a user, identical for every kind
    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE_MESSAGE
    }

    /// Short stable label for logs and telemetry
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::NotAuthenticated => "not_authenticated",
            ErrorKind::Busy => "busy",
            ErrorKind::EmptyPrompt => "empty_prompt",
            ErrorKind::Transport(_) => "transport",
            ErrorKind::Upstream(_) => "upstream",
            ErrorKind::InvalidProof => "invalid_proof",
            ErrorKind::StorageCorrupt => "storage_corrupt",
        }
    }

    /// Whether a manual re-submit can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transport(_) | ErrorKind::Busy)
    }
}

/// Startup and infrastructure errors for Paychat
#[derive(Error, Debug)]
pub enum PaychatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing API key: set the {0} environment variable")]
    MissingApiKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
