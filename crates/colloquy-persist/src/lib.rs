pub mod dirty;
pub mod error;
pub mod export;
pub mod store;
pub mod stores;

pub use dirty::{DirtySet, FlushReport, PersistenceBridge, Snapshot};
pub use error::{PersistError, Result};
pub use export::{render, ExportFormat};
pub use store::{AssetStore, ConversationStore};
pub use stores::{FsAssetStore, InMemoryAssetStore, InMemoryConversationStore, JsonConversationStore};
