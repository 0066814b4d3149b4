// Gateway module for relay - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod client;
mod traits;
mod types;

// Public re-exports - the ONLY way to access relay functionality
pub use client::HttpRelayClient;
pub use traits::Relay;
#[cfg(test)]
pub use traits::MockRelay;
pub use types::RelayReply;
