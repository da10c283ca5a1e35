use async_trait::async_trait;
use colloquy_persist::{
    ConversationStore, ExportFormat, InMemoryConversationStore, PersistenceBridge,
};
use colloquy_types::{Conversation, Message};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};

fn conversation(text: &str) -> Conversation {
    Conversation::new(None).with_messages(vec![Message::user(text)])
}

#[tokio::test]
async fn test_flush_all_continues_after_failure() {
    let store = Arc::new(InMemoryConversationStore::new());
    let bridge = PersistenceBridge::new(store.clone());

    let a = conversation("a");
    let b = conversation("b");
    let c = conversation("c");
    for conv in [&a, &b, &c] {
        bridge.mark_dirty(&conv.id);
    }
    store.fail_saves_for(&b.id);

    let report = bridge.flush_all(&[a.clone(), b.clone(), c.clone()]).await;

    assert_eq!(report.saved.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, b.id);
    assert!(store.get(&a.id).is_some());
    assert!(store.get(&c.id).is_some());
    assert!(store.get(&b.id).is_none());

    // failed entry is retried on the next cycle
    assert!(bridge.is_dirty(&b.id));
    assert!(!bridge.is_dirty(&a.id));

    store.heal(&b.id);
    let report = bridge.flush_all(&[a, b.clone(), c]).await;
    assert_eq!(report.saved, vec![b.id.clone()]);
    assert!(report.is_clean());
    assert!(!bridge.is_dirty(&b.id));
}

#[tokio::test]
async fn test_mutation_during_write_keeps_entry_dirty() {
    let store = Arc::new(InMemoryConversationStore::new());
    let bridge = PersistenceBridge::new(store.clone());

    let mut conv = conversation("first");
    bridge.mark_dirty(&conv.id);
    let snapshot = bridge.snapshot(&conv);

    // a mutation lands after the snapshot was taken
    conv.messages.push(Message::assistant("reply", "m1"));
    conv.touch();
    bridge.mark_dirty(&conv.id);

    bridge.flush(snapshot).await.unwrap();

    assert!(bridge.is_dirty(&conv.id));
    assert_eq!(store.get(&conv.id).unwrap().messages.len(), 1);

    bridge.flush_all(std::slice::from_ref(&conv)).await;
    assert!(!bridge.is_dirty(&conv.id));
    assert_eq!(store.get(&conv.id).unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_flush_one_failure_marks_dirty() {
    let store = Arc::new(InMemoryConversationStore::new());
    let bridge = PersistenceBridge::new(store.clone());
    let conv = conversation("x");

    store.fail_saves_for(&conv.id);
    assert!(bridge.flush_one(&conv).await.is_err());
    assert!(bridge.is_dirty(&conv.id));
}

#[tokio::test]
async fn test_clean_conversations_are_not_written() {
    let store = Arc::new(InMemoryConversationStore::new());
    let bridge = PersistenceBridge::new(store.clone());

    let report = bridge.flush_all(&[conversation("a"), conversation("b")]).await;

    assert!(report.saved.is_empty());
    assert_eq!(store.save_count(), 0);
    assert!(store.load_all().await.unwrap().is_empty());
}

/// Holds the first save open until released
struct GatedStore {
    inner: InMemoryConversationStore,
    gate: parking_lot::Mutex<Option<oneshot::Receiver<()>>>,
    entered: Notify,
}

impl GatedStore {
    fn new(gate: oneshot::Receiver<()>) -> Self {
        Self {
            inner: InMemoryConversationStore::new(),
            gate: parking_lot::Mutex::new(Some(gate)),
            entered: Notify::new(),
        }
    }
}

#[async_trait]
impl ConversationStore for GatedStore {
    async fn load_all(&self) -> colloquy_persist::Result<Vec<Conversation>> {
        self.inner.load_all().await
    }

    async fn save(&self, conversation: &Conversation) -> colloquy_persist::Result<()> {
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            let _ = gate.await;
        }
        self.inner.save(conversation).await
    }

    async fn delete(&self, conversation_id: &str, project_id: Option<&str>) -> colloquy_persist::Result<()> {
        self.inner.delete(conversation_id, project_id).await
    }

    async fn export(
        &self,
        conversation: &Conversation,
        format: ExportFormat,
    ) -> colloquy_persist::Result<Option<PathBuf>> {
        self.inner.export(conversation, format).await
    }
}

#[tokio::test]
async fn test_slow_write_cannot_overwrite_newer_one() {
    let (release, gate) = oneshot::channel();
    let store = Arc::new(GatedStore::new(gate));
    let bridge = Arc::new(PersistenceBridge::new(store.clone()));

    let mut conv = conversation("first");
    bridge.mark_dirty(&conv.id);
    let older = bridge.snapshot(&conv);
    let slow = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.flush(older).await })
    };
    store.entered.notified().await;

    conv.messages.push(Message::assistant("reply", "m1"));
    conv.touch();
    bridge.mark_dirty(&conv.id);
    let newer = {
        let bridge = Arc::clone(&bridge);
        let conv = conv.clone();
        tokio::spawn(async move { bridge.flush_one(&conv).await })
    };

    release.send(()).unwrap();
    slow.await.unwrap().unwrap();
    newer.await.unwrap().unwrap();

    assert_eq!(store.inner.get(&conv.id).unwrap().messages.len(), 2);
    assert!(!bridge.is_dirty(&conv.id));
}

#[tokio::test]
async fn test_snapshot_older_than_last_write_is_dropped() {
    let store = Arc::new(InMemoryConversationStore::new());
    let bridge = PersistenceBridge::new(store.clone());

    let mut conv = conversation("first");
    bridge.mark_dirty(&conv.id);
    let older = bridge.snapshot(&conv);

    conv.messages.push(Message::assistant("reply", "m1"));
    conv.touch();
    bridge.mark_dirty(&conv.id);
    bridge.flush_one(&conv).await.unwrap();

    bridge.flush(older).await.unwrap();

    assert_eq!(store.get(&conv.id).unwrap().messages.len(), 2);
    assert!(!bridge.is_dirty(&conv.id));
}
