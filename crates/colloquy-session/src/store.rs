// Session store: authoritative conversation state and its mutation operations

use colloquy_context::{build_window, ContextStrategy, WindowedContextStrategy};
use colloquy_llm::CostLookup;
use colloquy_persist::{
    AssetStore, ConversationStore, ExportFormat, FlushReport, PersistenceBridge,
};
use colloquy_types::{
    extract_text, Content, ContentBlock, Conversation, DispatchEvent, EngineConfig,
    FileAttachment, Message, Role, Usage,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::encoder::{AttachmentEncoder, PendingFile};
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;

const EVENT_CAPACITY: usize = 1024;

/// Per-call overrides for a generation
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub model: Option<String>,
    pub reasoning: Option<bool>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn reasoning(mut self, enabled: bool) -> Self {
        self.reasoning = Some(enabled);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

/// How a generation ended, when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed { message_id: String, usage: Usage },
    /// Stopped by the user; `message_id` is `None` if it was stopped before
    /// the assistant turn was created
    Stopped { message_id: Option<String> },
}

impl GenerationOutcome {
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Completed { message_id, .. } => Some(message_id),
            Self::Stopped { message_id } => message_id.as_deref(),
        }
    }
}

struct ActiveGeneration {
    id: u64,
    message_id: Option<String>,
    token: CancellationToken,
}

/// Claim on a conversation's single generation slot
struct Reservation {
    conversation_id: String,
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct SessionState {
    conversations: Vec<Conversation>,
    active_id: Option<String>,
    selected_model: Option<String>,
    last_error: Option<String>,
    generations: HashMap<String, ActiveGeneration>,
    next_generation: u64,
}

impl SessionState {
    fn conversation(&self, id: &str) -> Result<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| SessionError::ConversationNotFound(id.to_string()))
    }

    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SessionError::ConversationNotFound(id.to_string()))
    }

    fn reserve(&mut self, conversation_id: &str) -> Result<Reservation> {
        if self.generations.contains_key(conversation_id) {
            return Err(SessionError::GenerationInProgress(conversation_id.to_string()));
        }
        self.next_generation += 1;
        let token = CancellationToken::new();
        self.generations.insert(
            conversation_id.to_string(),
            ActiveGeneration {
                id: self.next_generation,
                message_id: None,
                token: token.clone(),
            },
        );
        Ok(Reservation {
            conversation_id: conversation_id.to_string(),
            id: self.next_generation,
            token,
        })
    }

    fn holds(&self, reservation: &Reservation) -> bool {
        !reservation.token.is_cancelled()
            && self
                .generations
                .get(&reservation.conversation_id)
                .is_some_and(|g| g.id == reservation.id)
    }

    fn release(&mut self, reservation: &Reservation) {
        if self
            .generations
            .get(&reservation.conversation_id)
            .is_some_and(|g| g.id == reservation.id)
        {
            self.generations.remove(&reservation.conversation_id);
        }
    }
}

fn message_index(conversation: &Conversation, message_id: &str) -> Result<usize> {
    conversation
        .position(message_id)
        .ok_or_else(|| SessionError::MessageNotFound {
            conversation_id: conversation.id.clone(),
            message_id: message_id.to_string(),
        })
}

fn reject<T>(err: SessionError) -> Result<T> {
    tracing::warn!("{}", err);
    Err(err)
}

/// Authoritative in-memory state for all conversations.
///
/// Every mutation is one synchronous transition under the state lock, which
/// is never held across an `.await`.
pub struct SessionStore {
    config: EngineConfig,
    state: Mutex<SessionState>,
    dispatcher: Dispatcher,
    bridge: PersistenceBridge,
    assets: Arc<dyn AssetStore>,
    encoder: Arc<dyn AttachmentEncoder>,
    costs: Arc<dyn CostLookup>,
    context: Arc<dyn ContextStrategy>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new(
        config: EngineConfig,
        dispatcher: Dispatcher,
        conversation_store: Arc<dyn ConversationStore>,
        asset_store: Arc<dyn AssetStore>,
        encoder: Arc<dyn AttachmentEncoder>,
        cost_lookup: Arc<dyn CostLookup>,
    ) -> Self {
        let context = Arc::new(WindowedContextStrategy::new(
            config.max_messages,
            config.max_messages_with_attachments,
        ));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            config,
            state: Mutex::new(SessionState::default()),
            dispatcher,
            bridge: PersistenceBridge::new(conversation_store),
            assets: asset_store,
            encoder,
            costs: cost_lookup,
            context,
            events,
        }
    }

    pub fn with_context_strategy(mut self, strategy: Arc<dyn ContextStrategy>) -> Self {
        self.context = strategy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.state.lock().conversation(conversation_id).ok().cloned()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().conversations.clone()
    }

    pub fn active_id(&self) -> Option<String> {
        self.state.lock().active_id.clone()
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        let state = self.state.lock();
        let id = state.active_id.as_deref()?;
        state.conversation(id).ok().cloned()
    }

    pub fn selected_model(&self) -> Option<String> {
        self.state.lock().selected_model.clone()
    }

    /// Selected model, or the configured default
    pub fn current_model(&self) -> String {
        self.state
            .lock()
            .selected_model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    pub fn is_loading(&self) -> bool {
        !self.state.lock().generations.is_empty()
    }

    pub fn is_generating(&self, conversation_id: &str) -> bool {
        self.state.lock().generations.contains_key(conversation_id)
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn is_dirty(&self, conversation_id: &str) -> bool {
        self.bridge.is_dirty(conversation_id)
    }

    // ========================================================================
    // Simple mutations
    // ========================================================================

    /// Apply `f` to a conversation, then touch it and mark it dirty
    fn mutate<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut Conversation) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock();
        let conversation = match state.conversation_mut(conversation_id) {
            Ok(c) => c,
            Err(e) => return reject(e),
        };
        let out = f(&mut *conversation)?;
        conversation.touch();
        self.bridge.mark_dirty(conversation_id);
        Ok(out)
    }

    /// Immediate write of the current state of one conversation. Failures are
    /// logged and leave it dirty.
    async fn checkpoint(&self, conversation_id: &str) {
        let snapshot = {
            let state = self.state.lock();
            match state.conversation(conversation_id) {
                Ok(conversation) => self.bridge.snapshot(conversation),
                Err(_) => return,
            }
        };
        let _ = self.bridge.flush(snapshot).await;
    }

    pub fn create_conversation(&self, project_id: Option<String>) -> String {
        let conversation = Conversation::new(project_id);
        let id = conversation.id.clone();

        let mut state = self.state.lock();
        state.conversations.insert(0, conversation);
        state.active_id = Some(id.clone());
        self.bridge.mark_dirty(&id);

        tracing::info!(conversation_id = %id, "Created conversation");
        id
    }

    pub fn set_active(&self, conversation_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Err(e) = state.conversation(conversation_id) {
            return reject(e);
        }
        state.active_id = Some(conversation_id.to_string());
        Ok(())
    }

    pub fn rename(&self, conversation_id: &str, title: &str) -> Result<()> {
        let title = title.trim().to_string();
        self.mutate(conversation_id, |c| {
            c.title = title;
            Ok(())
        })
    }

    pub fn set_starred(&self, conversation_id: &str, starred: bool) -> Result<()> {
        self.mutate(conversation_id, |c| {
            c.starred = starred;
            Ok(())
        })
    }

    /// Returns the new starred value
    pub fn toggle_star(&self, conversation_id: &str) -> Result<bool> {
        self.mutate(conversation_id, |c| {
            c.starred = !c.starred;
            Ok(c.starred)
        })
    }

    pub fn select_model(&self, model: impl Into<String>) {
        self.state.lock().selected_model = Some(model.into());
    }

    pub fn dismiss_error(&self) {
        self.state.lock().last_error = None;
    }

    // ========================================================================
    // Load / delete / export
    // ========================================================================

    /// Replace in-memory state with what the conversation store holds.
    ///
    /// Image previews are rebuilt from the asset store, and turns left
    /// streaming by an interrupted run are closed as stopped.
    pub async fn load(&self) -> Result<usize> {
        let mut conversations = self.bridge.store().load_all().await?;
        let mut interrupted = Vec::new();

        for conversation in conversations.iter_mut() {
            let mut closed = false;
            for message in conversation.messages.iter_mut() {
                if message.is_streaming() {
                    message.stop(&self.config.stop_marker);
                    closed = true;
                }
                for attachment in message.attachments_mut().iter_mut().filter(|a| a.is_image()) {
                    match self.assets.load(&conversation.id, Path::new(&attachment.path)).await {
                        Ok(bytes) => attachment.preview = Some(bytes),
                        Err(e) => {
                            tracing::warn!(path = %attachment.path, "Could not rebuild preview: {}", e)
                        }
                    }
                }
            }
            if closed {
                interrupted.push(conversation.id.clone());
            }
        }

        let count = conversations.len();
        {
            let mut state = self.state.lock();
            state.active_id = state
                .active_id
                .take()
                .filter(|id| conversations.iter().any(|c| &c.id == id))
                .or_else(|| conversations.first().map(|c| c.id.clone()));
            state.conversations = conversations;
            for id in &interrupted {
                self.bridge.mark_dirty(id);
            }
        }

        tracing::info!(count, "Session loaded");
        Ok(count)
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.stop(conversation_id);

        let removed = {
            let mut state = self.state.lock();
            let Some(index) = state.conversations.iter().position(|c| c.id == conversation_id) else {
                return reject(SessionError::ConversationNotFound(conversation_id.to_string()));
            };
            let removed = state.conversations.remove(index);
            if state.active_id.as_deref() == Some(conversation_id) {
                state.active_id = state.conversations.first().map(|c| c.id.clone());
            }
            self.bridge.forget(conversation_id);
            removed
        };

        if let Err(e) = self
            .bridge
            .store()
            .delete(conversation_id, removed.project_id.as_deref())
            .await
        {
            tracing::error!(conversation_id, "Failed to delete conversation record: {}", e);
        }
        if let Err(e) = self.assets.delete_all(conversation_id).await {
            tracing::warn!(conversation_id, "Failed to delete conversation assets: {}", e);
        }

        tracing::info!(conversation_id, "Deleted conversation");
        Ok(())
    }

    pub async fn export(&self, conversation_id: &str, format: ExportFormat) -> Result<Option<PathBuf>> {
        let conversation = match self.conversation(conversation_id) {
            Some(c) => c,
            None => return reject(SessionError::ConversationNotFound(conversation_id.to_string())),
        };
        Ok(self.bridge.store().export(&conversation, format).await?)
    }

    /// Write every dirty conversation
    pub async fn flush_dirty(&self) -> FlushReport {
        let snapshots = {
            let state = self.state.lock();
            self.bridge.dirty_snapshots(&state.conversations)
        };
        self.bridge.flush_snapshots(snapshots).await
    }

    /// Periodic bulk flush until `shutdown` fires, then one last flush
    pub fn spawn_autosave(self: &Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            // interval panics on a zero period
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            // the first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        store.flush_dirty().await;
                    }
                }
            }

            store.flush_dirty().await;
            tracing::debug!("Autosave stopped");
        })
    }

    /// Stop live generations and flush everything outstanding
    pub async fn shutdown(&self) -> FlushReport {
        let live: Vec<String> = self.state.lock().generations.keys().cloned().collect();
        for conversation_id in live {
            self.stop(&conversation_id);
        }
        self.flush_dirty().await
    }

    // ========================================================================
    // History operations
    // ========================================================================

    /// Cancel the live generation of a conversation.
    ///
    /// Returns `false` (and changes nothing) when nothing is running.
    pub fn stop(&self, conversation_id: &str) -> bool {
        let message_id = {
            let mut state = self.state.lock();
            let Some(generation) = state.generations.remove(conversation_id) else {
                return false;
            };
            generation.token.cancel();

            if let Some(message_id) = &generation.message_id {
                if let Ok(conversation) = state.conversation_mut(conversation_id) {
                    if let Some(message) = conversation.message_mut(message_id) {
                        if message.is_streaming() {
                            message.stop(&self.config.stop_marker);
                        }
                    }
                    conversation.touch();
                    self.bridge.mark_dirty(conversation_id);
                }
            }
            generation.message_id
        };

        tracing::info!(conversation_id, "Generation stopped");
        self.publish(SessionEvent::GenerationStopped {
            conversation_id: conversation_id.to_string(),
            message_id,
        });
        true
    }

    /// Remove one message; its attachments are cleaned up best-effort
    pub async fn delete(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let paths: Vec<String> = {
            let mut state = self.state.lock();
            let live = state
                .generations
                .get(conversation_id)
                .and_then(|g| g.message_id.as_deref())
                == Some(message_id);
            if live {
                return reject(SessionError::MessageStreaming(message_id.to_string()));
            }

            let conversation = match state.conversation_mut(conversation_id) {
                Ok(c) => c,
                Err(e) => return reject(e),
            };
            let index = match message_index(conversation, message_id) {
                Ok(i) => i,
                Err(e) => return reject(e),
            };
            let removed = conversation.messages.remove(index);
            conversation.touch();
            self.bridge.mark_dirty(conversation_id);

            removed.attachments().iter().map(|a| a.path.clone()).collect()
        };

        for path in paths {
            if let Err(e) = self.assets.delete(conversation_id, Path::new(&path)).await {
                tracing::warn!(conversation_id, path = %path, "Failed to delete attachment: {}", e);
            }
        }
        Ok(())
    }

    /// Append a user turn and stream the assistant reply
    pub async fn send(
        &self,
        conversation_id: &str,
        text: &str,
        model: &str,
        reasoning_enabled: bool,
        options: GenerationOptions,
        files: Vec<PendingFile>,
    ) -> Result<GenerationOutcome> {
        let reservation = {
            let mut state = self.state.lock();
            if let Err(e) = state.conversation(conversation_id) {
                return reject(e);
            }
            match state.reserve(conversation_id) {
                Ok(r) => r,
                Err(e) => return reject(e),
            }
        };

        self.send_reserved(reservation, text, model, reasoning_enabled, &options, files)
            .await
    }

    /// Drop the target user turn and everything after it, then send it again
    pub async fn resend(
        &self,
        conversation_id: &str,
        message_id: &str,
        options: GenerationOptions,
    ) -> Result<GenerationOutcome> {
        let (reservation, text, attachments, model, reasoning) = {
            let mut state = self.state.lock();
            let conversation = match state.conversation(conversation_id) {
                Ok(c) => c,
                Err(e) => return reject(e),
            };
            let index = match message_index(conversation, message_id) {
                Ok(i) => i,
                Err(e) => return reject(e),
            };
            let target = &conversation.messages[index];
            if !target.is_user() {
                return reject(SessionError::WrongRole {
                    message_id: message_id.to_string(),
                    expected: Role::User,
                });
            }

            let following = conversation.messages.get(index + 1).filter(|m| m.is_assistant());
            let inherited = following.and_then(|m| m.model()).map(str::to_string);
            let reasoning = options
                .reasoning
                .unwrap_or_else(|| following.is_some_and(|m| m.has_thinking()));
            let text = target.text();
            let attachments = target.attachments().to_vec();

            let model = self.resolve_model(&state, options.model.as_deref(), inherited.as_deref());
            let reservation = match state.reserve(conversation_id) {
                Ok(r) => r,
                Err(e) => return reject(e),
            };
            (reservation, text, attachments, model, reasoning)
        };

        let mut files = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            match self.assets.load(conversation_id, Path::new(&attachment.path)).await {
                Ok(bytes) => files.push(
                    PendingFile::new(attachment.name, attachment.mime_type, bytes)
                        .with_stored_path(attachment.path),
                ),
                Err(e) => {
                    tracing::warn!(conversation_id, path = %attachment.path, "Skipping missing attachment: {}", e);
                }
            }
        }

        // truncate to messages[..index]
        {
            let mut state = self.state.lock();
            if !state.holds(&reservation) {
                return Ok(GenerationOutcome::Stopped { message_id: None });
            }
            let truncated = state.conversation_mut(conversation_id).and_then(|conversation| {
                let index = message_index(conversation, message_id)?;
                conversation.truncate(index);
                conversation.touch();
                Ok(())
            });
            if let Err(e) = truncated {
                state.release(&reservation);
                return reject(e);
            }
            self.bridge.mark_dirty(conversation_id);
        }
        self.checkpoint(conversation_id).await;

        self.send_reserved(reservation, &text, &model, reasoning, &options, files)
            .await
    }

    /// Replace an assistant turn with a fresh reply over the same context
    pub async fn regenerate(
        &self,
        conversation_id: &str,
        message_id: &str,
        options: GenerationOptions,
    ) -> Result<GenerationOutcome> {
        let (reservation, model, reasoning) = {
            let mut state = self.state.lock();
            let conversation = match state.conversation(conversation_id) {
                Ok(c) => c,
                Err(e) => return reject(e),
            };
            let index = match message_index(conversation, message_id) {
                Ok(i) => i,
                Err(e) => return reject(e),
            };
            let target = &conversation.messages[index];
            if !target.is_assistant() {
                return reject(SessionError::WrongRole {
                    message_id: message_id.to_string(),
                    expected: Role::Assistant,
                });
            }
            if index == 0 {
                return reject(SessionError::NothingToRegenerate(message_id.to_string()));
            }

            let reasoning = options.reasoning.unwrap_or_else(|| target.has_thinking());
            let inherited = target.model().map(str::to_string);
            let model = self.resolve_model(&state, options.model.as_deref(), inherited.as_deref());

            let reservation = match state.reserve(conversation_id) {
                Ok(r) => r,
                Err(e) => return reject(e),
            };

            // holds: conversation exists, checked above
            if let Ok(conversation) = state.conversation_mut(conversation_id) {
                conversation.truncate(index);
                conversation.touch();
            }
            self.bridge.mark_dirty(conversation_id);
            (reservation, model, reasoning)
        };
        self.checkpoint(conversation_id).await;

        tracing::info!(conversation_id, model = %model, "Regenerating reply");
        self.stream_reply(reservation, &model, reasoning, &options).await
    }

    /// Edit a message.
    ///
    /// Assistant turns are edited in place and nothing is sent (`Ok(None)`).
    /// User turns become plain text, everything after them is dropped and a
    /// new reply is streamed. Their attachments stay as display metadata but
    /// are not sent again.
    pub async fn edit(
        &self,
        conversation_id: &str,
        message_id: &str,
        new_content: impl Into<Content>,
        options: GenerationOptions,
    ) -> Result<Option<GenerationOutcome>> {
        let new_content = new_content.into();

        let (reservation, model, reasoning) = {
            let mut state = self.state.lock();
            let conversation = match state.conversation(conversation_id) {
                Ok(c) => c,
                Err(e) => return reject(e),
            };
            let index = match message_index(conversation, message_id) {
                Ok(i) => i,
                Err(e) => return reject(e),
            };

            if conversation.messages[index].is_assistant() {
                let live = state
                    .generations
                    .get(conversation_id)
                    .and_then(|g| g.message_id.as_deref())
                    == Some(message_id);
                if live {
                    return reject(SessionError::MessageStreaming(message_id.to_string()));
                }
                if let Ok(conversation) = state.conversation_mut(conversation_id) {
                    conversation.messages[index].edit(new_content);
                    conversation.touch();
                }
                self.bridge.mark_dirty(conversation_id);
                return Ok(None);
            }

            let following = conversation.messages.get(index + 1).filter(|m| m.is_assistant());
            let inherited = following.and_then(|m| m.model()).map(str::to_string);
            let reasoning = options
                .reasoning
                .unwrap_or_else(|| following.is_some_and(|m| m.has_thinking()));
            let model = self.resolve_model(&state, options.model.as_deref(), inherited.as_deref());

            let reservation = match state.reserve(conversation_id) {
                Ok(r) => r,
                Err(e) => return reject(e),
            };

            if let Ok(conversation) = state.conversation_mut(conversation_id) {
                conversation.messages[index].edit(Content::Text(extract_text(&new_content)));
                conversation.truncate(index + 1);
                conversation.touch();
            }
            self.bridge.mark_dirty(conversation_id);
            (reservation, model, reasoning)
        };
        self.checkpoint(conversation_id).await;

        self.stream_reply(reservation, &model, reasoning, &options)
            .await
            .map(Some)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// explicit → inherited → selected → configured default
    fn resolve_model(&self, state: &SessionState, explicit: Option<&str>, inherited: Option<&str>) -> String {
        explicit
            .or(inherited)
            .map(str::to_string)
            .or_else(|| state.selected_model.clone())
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    async fn send_reserved(
        &self,
        reservation: Reservation,
        text: &str,
        model: &str,
        reasoning_enabled: bool,
        options: &GenerationOptions,
        files: Vec<PendingFile>,
    ) -> Result<GenerationOutcome> {
        let conversation_id = reservation.conversation_id.clone();

        let (blocks, attachments) = match self.store_files(&conversation_id, files).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(conversation_id = %conversation_id, "Failed to attach files: {}", e);
                self.state.lock().release(&reservation);
                return Err(e);
            }
        };

        let content = if blocks.is_empty() {
            Content::text(text)
        } else {
            let mut all = Vec::with_capacity(blocks.len() + 1);
            if !text.is_empty() {
                all.push(ContentBlock::text(text));
            }
            all.extend(blocks);
            Content::Blocks(all)
        };

        {
            let mut state = self.state.lock();
            if !state.holds(&reservation) {
                return Ok(GenerationOutcome::Stopped { message_id: None });
            }
            let conversation = match state.conversation_mut(&conversation_id) {
                Ok(c) => c,
                Err(e) => {
                    state.release(&reservation);
                    return reject(e);
                }
            };
            conversation
                .messages
                .push(Message::user_with_attachments(content, attachments));
            conversation.title_from_first_message();
            conversation.touch();
            self.bridge.mark_dirty(&conversation_id);
        }
        self.checkpoint(&conversation_id).await;

        self.stream_reply(reservation, model, reasoning_enabled, options).await
    }

    /// Save (or reuse) each file in the asset store and encode it
    async fn store_files(
        &self,
        conversation_id: &str,
        files: Vec<PendingFile>,
    ) -> Result<(Vec<ContentBlock>, Vec<FileAttachment>)> {
        if files.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let project_id = self
            .state
            .lock()
            .conversation(conversation_id)
            .ok()
            .and_then(|c| c.project_id.clone());

        let mut blocks = Vec::with_capacity(files.len());
        let mut attachments = Vec::with_capacity(files.len());

        for file in files {
            let block = self.encoder.encode(&file)?;
            let path = match &file.stored_path {
                Some(path) => path.clone(),
                None => {
                    self.assets
                        .save(conversation_id, &file.name, &file.bytes, project_id.as_deref())
                        .await?
                }
            };

            let mut attachment = FileAttachment::new(
                file.name.clone(),
                file.mime_type.clone(),
                file.size(),
                path.to_string_lossy().into_owned(),
            );
            if file.is_image() {
                attachment.preview = Some(file.bytes);
            }

            blocks.push(block);
            attachments.push(attachment);
        }

        Ok((blocks, attachments))
    }

    /// Append an assistant placeholder, dispatch and apply events until the
    /// generation ends
    async fn stream_reply(
        &self,
        reservation: Reservation,
        model: &str,
        reasoning: bool,
        options: &GenerationOptions,
    ) -> Result<GenerationOutcome> {
        let conversation_id = reservation.conversation_id.clone();

        let (message_id, request) = {
            let mut state = self.state.lock();
            if !state.holds(&reservation) {
                return Ok(GenerationOutcome::Stopped { message_id: None });
            }
            let conversation = match state.conversation_mut(&conversation_id) {
                Ok(c) => c,
                Err(e) => {
                    state.release(&reservation);
                    return reject(e);
                }
            };

            let window = build_window(
                &conversation.messages,
                self.config.system_prompt.as_deref(),
                self.context.as_ref(),
            );

            let placeholder = Message::assistant_placeholder(model);
            let message_id = placeholder.id().to_string();
            conversation.messages.push(placeholder);
            conversation.touch();
            self.bridge.mark_dirty(&conversation_id);

            if let Some(generation) = state.generations.get_mut(&conversation_id) {
                generation.message_id = Some(message_id.clone());
            }

            let request = DispatchRequest {
                model: model.to_string(),
                messages: window.into_messages(),
                temperature: options.temperature.or(self.config.temperature),
                max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
                reasoning,
            };
            (message_id, request)
        };

        self.publish(SessionEvent::GenerationStarted {
            conversation_id: conversation_id.clone(),
            message_id: message_id.clone(),
            model: model.to_string(),
        });

        let rx = self.dispatcher.dispatch(request, reservation.token.clone());
        self.consume(reservation, message_id, model, rx).await
    }

    async fn consume(
        &self,
        reservation: Reservation,
        message_id: String,
        model: &str,
        mut rx: mpsc::Receiver<DispatchEvent>,
    ) -> Result<GenerationOutcome> {
        let conversation_id = reservation.conversation_id.clone();
        let stopped = || GenerationOutcome::Stopped {
            message_id: Some(message_id.clone()),
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = reservation.token.cancelled() => return Ok(stopped()),
                event = rx.recv() => event,
            };

            let event = event.unwrap_or_else(|| {
                DispatchEvent::Error("Stream ended without a result".to_string())
            });

            match event {
                DispatchEvent::Content(delta) => {
                    if !self.apply_delta(&reservation, &message_id, |m| m.append_content(&delta)) {
                        return Ok(stopped());
                    }
                    self.publish(SessionEvent::Content {
                        conversation_id: conversation_id.clone(),
                        message_id: message_id.clone(),
                        delta,
                    });
                }
                DispatchEvent::Reasoning(delta) => {
                    if !self.apply_delta(&reservation, &message_id, |m| m.append_thinking(&delta)) {
                        return Ok(stopped());
                    }
                    self.publish(SessionEvent::Reasoning {
                        conversation_id: conversation_id.clone(),
                        message_id: message_id.clone(),
                        delta,
                    });
                }
                DispatchEvent::Complete(usage) => {
                    let cost = self.costs.cost(usage.prompt_tokens, model, false)
                        + self.costs.cost(usage.completion_tokens, model, true);
                    let finalized = self.apply_delta(&reservation, &message_id, |m| {
                        m.finalize(usage.completion_tokens, cost)
                    });
                    if !finalized {
                        return Ok(stopped());
                    }
                    self.state.lock().release(&reservation);
                    self.checkpoint(&conversation_id).await;

                    tracing::info!(
                        conversation_id = %conversation_id,
                        message_id = %message_id,
                        completion_tokens = usage.completion_tokens,
                        "Generation finished"
                    );
                    self.publish(SessionEvent::GenerationFinished {
                        conversation_id: conversation_id.clone(),
                        message_id: message_id.clone(),
                        usage,
                    });
                    return Ok(GenerationOutcome::Completed {
                        message_id: message_id.clone(),
                        usage,
                    });
                }
                DispatchEvent::Error(error) => {
                    {
                        let mut state = self.state.lock();
                        if !state.holds(&reservation) {
                            return Ok(stopped());
                        }
                        state.release(&reservation);
                        state.last_error = Some(error.clone());
                        if let Ok(conversation) = state.conversation_mut(&conversation_id) {
                            if let Some(index) = conversation.position(&message_id) {
                                conversation.messages.remove(index);
                            }
                            conversation.touch();
                        }
                        self.bridge.mark_dirty(&conversation_id);
                    }

                    tracing::warn!(conversation_id = %conversation_id, "Generation failed: {}", error);
                    self.publish(SessionEvent::GenerationFailed {
                        conversation_id: conversation_id.clone(),
                        error: error.clone(),
                    });
                    return Err(SessionError::Transport(error));
                }
            }
        }
    }

    /// Mutate the in-flight message if this generation is still live
    fn apply_delta(
        &self,
        reservation: &Reservation,
        message_id: &str,
        f: impl FnOnce(&mut Message),
    ) -> bool {
        let mut state = self.state.lock();
        if !state.holds(reservation) {
            return false;
        }
        let Ok(conversation) = state.conversation_mut(&reservation.conversation_id) else {
            return false;
        };
        let Some(message) = conversation.message_mut(message_id) else {
            return false;
        };
        f(message);
        conversation.touch();
        self.bridge.mark_dirty(&reservation.conversation_id);
        true
    }
}
