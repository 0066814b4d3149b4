/// Relay endpoint module - Gateway
mod handlers;
mod health;
mod server;

pub use handlers::{AuthRequest, RelayRequest, RelayResponse};
pub use health::is_relay_running;
pub use server::{router, serve};
