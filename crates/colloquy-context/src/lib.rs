mod strategy;
mod tokens;
mod window;
mod windowed;

pub use strategy::{ContextStrategy, ContextWindow};
pub use tokens::{estimate_messages_tokens, estimate_tokens};
pub use window::{build_window, to_wire};
pub use windowed::{prepare, WindowedContextStrategy};
