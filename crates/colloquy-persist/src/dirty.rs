// Dirty tracking and write-through to the conversation store

use colloquy_types::Conversation;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as WriteLock;

use crate::error::Result;
use crate::store::ConversationStore;

#[derive(Debug, Default)]
struct DirtyInner {
    entries: HashMap<String, u64>,
    generation: u64,
}

/// Conversation ids awaiting a durable write.
///
/// Each mark stamps the id with a fresh generation. An id is only cleared
/// when a write of a snapshot taken at that same generation succeeds, so a
/// mutation that lands while a write is in flight keeps it dirty.
#[derive(Debug, Default)]
pub struct DirtySet {
    inner: Mutex<DirtyInner>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, conversation_id: &str) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        let generation = inner.generation;
        inner.entries.insert(conversation_id.to_string(), generation);
        generation
    }

    pub fn generation(&self, conversation_id: &str) -> Option<u64> {
        self.inner.lock().entries.get(conversation_id).copied()
    }

    /// Clear the entry if it has not been re-marked since `generation`
    pub fn clear_if(&self, conversation_id: &str, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get(conversation_id) {
            Some(current) if *current == generation => {
                inner.entries.remove(conversation_id);
                true
            }
            _ => false,
        }
    }

    pub fn forget(&self, conversation_id: &str) {
        self.inner.lock().entries.remove(conversation_id);
    }

    pub fn is_dirty(&self, conversation_id: &str) -> bool {
        self.inner.lock().entries.contains_key(conversation_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

/// A conversation clone paired with the dirty generation it was taken at.
///
/// `sequence` orders snapshots of the same bridge by when they were taken.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub conversation: Conversation,
    pub generation: Option<u64>,
    pub sequence: u64,
}

/// Per-conversation write serialization
#[derive(Debug, Default)]
struct WriteSlot {
    lock: Arc<WriteLock<()>>,
    written: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlushReport {
    pub saved: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Marks conversations dirty and writes snapshots through to a [`ConversationStore`]
pub struct PersistenceBridge {
    store: Arc<dyn ConversationStore>,
    dirty: DirtySet,
    sequence: AtomicU64,
    slots: Mutex<HashMap<String, WriteSlot>>,
}

impl PersistenceBridge {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            dirty: DirtySet::new(),
            sequence: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn mark_dirty(&self, conversation_id: &str) {
        self.dirty.mark(conversation_id);
    }

    pub fn is_dirty(&self, conversation_id: &str) -> bool {
        self.dirty.is_dirty(conversation_id)
    }

    pub fn forget(&self, conversation_id: &str) {
        self.dirty.forget(conversation_id);
        self.slots.lock().remove(conversation_id);
    }

    fn write_lock(&self, conversation_id: &str) -> Arc<WriteLock<()>> {
        let mut slots = self.slots.lock();
        Arc::clone(&slots.entry(conversation_id.to_string()).or_default().lock)
    }

    /// A snapshot taken before the last successful write of the same conversation
    fn is_stale(&self, conversation_id: &str, sequence: u64) -> bool {
        self.slots
            .lock()
            .get(conversation_id)
            .and_then(|slot| slot.written)
            .is_some_and(|written| sequence < written)
    }

    fn record_written(&self, conversation_id: &str, sequence: u64) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(conversation_id.to_string()).or_default();
        slot.written = Some(slot.written.map_or(sequence, |w| w.max(sequence)));
    }

    /// Clone `conversation` with its current generation. Take this while the
    /// caller still holds whatever lock guards the conversation.
    pub fn snapshot(&self, conversation: &Conversation) -> Snapshot {
        Snapshot {
            generation: self.dirty.generation(&conversation.id),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            conversation: conversation.clone(),
        }
    }

    /// Snapshots of every dirty conversation in `conversations`
    pub fn dirty_snapshots(&self, conversations: &[Conversation]) -> Vec<Snapshot> {
        conversations
            .iter()
            .filter(|c| self.dirty.is_dirty(&c.id))
            .map(|c| self.snapshot(c))
            .collect()
    }

    /// Write one snapshot; on failure the id stays (or becomes) dirty.
    ///
    /// Writes of one conversation run one at a time, and a snapshot older than
    /// the last successful write is dropped instead of overwriting it.
    pub async fn flush(&self, snapshot: Snapshot) -> Result<()> {
        let id = snapshot.conversation.id.clone();
        let lock = self.write_lock(&id);
        let _guard = lock.lock().await;

        if self.is_stale(&id, snapshot.sequence) {
            tracing::debug!(conversation_id = %id, "Skipping snapshot older than the last write");
            return Ok(());
        }

        match self.store.save(&snapshot.conversation).await {
            Ok(()) => {
                self.record_written(&id, snapshot.sequence);
                if let Some(generation) = snapshot.generation {
                    self.dirty.clear_if(&id, generation);
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(conversation_id = %id, "Failed to save conversation: {}", e);
                if !self.dirty.is_dirty(&id) {
                    self.dirty.mark(&id);
                }
                Err(e)
            }
        }
    }

    /// Immediate write of one conversation
    pub async fn flush_one(&self, conversation: &Conversation) -> Result<()> {
        let snapshot = self.snapshot(conversation);
        self.flush(snapshot).await
    }

    /// Attempt every snapshot independently
    pub async fn flush_snapshots(&self, snapshots: Vec<Snapshot>) -> FlushReport {
        let mut report = FlushReport::default();

        for snapshot in snapshots {
            let id = snapshot.conversation.id.clone();
            match self.flush(snapshot).await {
                Ok(()) => report.saved.push(id),
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }

        if !report.saved.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                saved = report.saved.len(),
                failed = report.failed.len(),
                "Flushed dirty conversations"
            );
        }
        report
    }

    /// Write every dirty conversation in `conversations`
    pub async fn flush_all(&self, conversations: &[Conversation]) -> FlushReport {
        let snapshots = self.dirty_snapshots(conversations);
        self.flush_snapshots(snapshots).await
    }
}
