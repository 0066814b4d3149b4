pub mod access;
pub mod app;
pub mod cli;
pub mod constants;
pub mod proxy;
pub mod relay;
pub mod runtime;
pub mod session;
pub mod utils;

pub use access::{AccessGate, AccessState};
pub use app::{load_config, AppState, Config};
pub use relay::{HttpRelayClient, Relay, RelayReply};
pub use runtime::{ConversationSession, SubmissionStatus, Turn};
pub use session::{ContextAssembler, ConversationLog, Message, Role, SessionStore};
pub use utils::{ErrorKind, PaychatError};
