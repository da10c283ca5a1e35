use async_trait::async_trait;
use colloquy_types::Conversation;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{PersistError, Result};
use crate::export::{render, ExportFormat};
use crate::store::{AssetStore, ConversationStore};

/// Conversation store kept in memory, with switchable save failures
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<String, Conversation>>,
    exports: Mutex<HashMap<PathBuf, String>>,
    failing: Mutex<HashSet<String>>,
    saves: AtomicUsize,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversations(conversations: impl IntoIterator<Item = Conversation>) -> Self {
        let store = Self::new();
        {
            let mut map = store.conversations.lock();
            for conversation in conversations {
                map.insert(conversation.id.clone(), conversation);
            }
        }
        store
    }

    /// Make every later save of `conversation_id` fail until [`Self::heal`]
    pub fn fail_saves_for(&self, conversation_id: &str) {
        self.failing.lock().insert(conversation_id.to_string());
    }

    pub fn heal(&self, conversation_id: &str) {
        self.failing.lock().remove(conversation_id);
    }

    pub fn get(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations.lock().get(conversation_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn export_contents(&self, path: &Path) -> Option<String> {
        self.exports.lock().get(path).cloned()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load_all(&self) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self.conversations.lock().values().cloned().collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        if self.failing.lock().contains(&conversation.id) {
            return Err(PersistError::Internal(format!(
                "Simulated save failure for {}",
                conversation.id
            )));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.conversations
            .lock()
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn delete(&self, conversation_id: &str, _project_id: Option<&str>) -> Result<()> {
        self.conversations.lock().remove(conversation_id);
        Ok(())
    }

    async fn export(&self, conversation: &Conversation, format: ExportFormat) -> Result<Option<PathBuf>> {
        if conversation.is_empty() {
            return Ok(None);
        }
        let path = PathBuf::from(format!("exports/{}.{}", conversation.id, format.extension()));
        let rendered = render(conversation, format)?;
        self.exports.lock().insert(path.clone(), rendered);
        Ok(Some(path))
    }
}

/// Asset store kept in memory
#[derive(Default)]
pub struct InMemoryAssetStore {
    assets: Mutex<HashMap<PathBuf, (String, Vec<u8>)>>,
    fail_deletes: Mutex<bool>,
    next: AtomicUsize,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `delete` and `delete_all` fail
    pub fn fail_deletes(&self, fail: bool) {
        *self.fail_deletes.lock() = fail;
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.assets.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.assets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.lock().is_empty()
    }

    fn check_delete(&self) -> Result<()> {
        if *self.fail_deletes.lock() {
            return Err(PersistError::Internal("Simulated asset delete failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn save(
        &self,
        conversation_id: &str,
        filename: &str,
        bytes: &[u8],
        _project_id: Option<&str>,
    ) -> Result<PathBuf> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let path = PathBuf::from(format!("assets/{}/{}-{}", conversation_id, n, filename));
        self.assets
            .lock()
            .insert(path.clone(), (conversation_id.to_string(), bytes.to_vec()));
        Ok(path)
    }

    async fn load(&self, _conversation_id: &str, path: &Path) -> Result<Vec<u8>> {
        self.assets
            .lock()
            .get(path)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| PersistError::AssetNotFound(path.display().to_string()))
    }

    async fn delete(&self, _conversation_id: &str, path: &Path) -> Result<()> {
        self.check_delete()?;
        self.assets.lock().remove(path);
        Ok(())
    }

    async fn delete_all(&self, conversation_id: &str) -> Result<()> {
        self.check_delete()?;
        self.assets.lock().retain(|_, (owner, _)| owner != conversation_id);
        Ok(())
    }
}
