/// Session management module - Gateway

mod context;
mod conversation;
mod state;
mod store;

pub use context::{ContextAssembler, ContextMessage};
pub use conversation::{ConversationLog, LogError, Message, Role};
pub use state::SessionSnapshot;
pub use store::{FileKvStore, KeyValueStore, MemoryKvStore, SessionStore};
