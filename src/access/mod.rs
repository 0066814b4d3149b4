// Gateway module for access - follows the Train Station Pattern
// All external access must go through this gateway

mod gate;

pub use gate::{AccessGate, AccessState};
