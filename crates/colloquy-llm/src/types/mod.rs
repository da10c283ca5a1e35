pub mod content;
pub mod message;

pub use content::{extract_text, normalize_for_wire, Content, ContentBlock, MediaSource};
pub use message::Message;
