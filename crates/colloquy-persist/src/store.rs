use async_trait::async_trait;
use colloquy_types::Conversation;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::export::ExportFormat;

/// Durable record of conversations
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Conversation>>;

    async fn save(&self, conversation: &Conversation) -> Result<()>;

    async fn delete(&self, conversation_id: &str, project_id: Option<&str>) -> Result<()>;

    /// Write an export and return where it went; `None` for an empty conversation
    async fn export(&self, conversation: &Conversation, format: ExportFormat) -> Result<Option<PathBuf>>;
}

/// Byte storage for message attachments
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store bytes and return a durable path
    async fn save(
        &self,
        conversation_id: &str,
        filename: &str,
        bytes: &[u8],
        project_id: Option<&str>,
    ) -> Result<PathBuf>;

    async fn load(&self, conversation_id: &str, path: &Path) -> Result<Vec<u8>>;

    async fn delete(&self, conversation_id: &str, path: &Path) -> Result<()>;

    async fn delete_all(&self, conversation_id: &str) -> Result<()>;
}
