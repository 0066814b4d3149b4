use async_trait::async_trait;

use super::types::RelayReply;
use crate::session::ContextMessage;
use crate::utils::ErrorKind;

/// Forwards an assembled context to a completion backend
///
/// Implementations make exactly one attempt per call. Retrying is a user
/// decision, not a transport one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Relay: Send + Sync {
    /// Send the context and return the assistant reply
    async fn send(&self, messages: &[ContextMessage]) -> Result<RelayReply, ErrorKind>;

    /// Name of the backend model, for logs
    fn name(&self) -> &str;
}
