pub mod config;
pub mod conversation;
pub mod events;
pub mod message;

pub use config::EngineConfig;
pub use conversation::Conversation;
pub use events::{DispatchEvent, Usage};
pub use message::{FileAttachment, Message, MessageState, Role};

pub use colloquy_llm::{extract_text, normalize_for_wire, Content, ContentBlock, MediaSource};
