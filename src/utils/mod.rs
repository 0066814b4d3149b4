// Gateway module for utils - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod errors;
mod fingerprint;
mod logger;

// Public re-exports - the ONLY way to access utils functionality
pub use errors::{ErrorKind, PaychatError, GENERIC_FAILURE_MESSAGE};
pub use fingerprint::fingerprint;
pub use logger::{init_logger, log_progress};
