mod fs_assets;
mod json;
mod memory;

pub use fs_assets::FsAssetStore;
pub use json::JsonConversationStore;
pub use memory::{InMemoryAssetStore, InMemoryConversationStore};
