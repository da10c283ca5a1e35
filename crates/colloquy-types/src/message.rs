use chrono::{DateTime, Utc};
use colloquy_llm::Content;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Display metadata for a file attached to a message.
///
/// `path` is the durable location handed back by the asset store. `preview`
/// only lives in memory and is rebuilt on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub path: String,
    #[serde(skip)]
    pub preview: Option<Vec<u8>>,
}

impl FileAttachment {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            path: path.into(),
            preview: None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Lifecycle state derived from a message's fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Streaming,
    Finalized,
    Stopped,
}

/// One conversation turn.
///
/// Fields are private so that a user turn can never carry a model or
/// reasoning text, and a streaming turn never carries tokens or cost.
/// Stored records are normalized to the same rules when read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MessageRecord")]
pub struct Message {
    id: String,
    role: Role,
    content: Content,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    edited_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(default)]
    streaming: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<FileAttachment>,
}

/// Message as found on disk, before normalization
#[derive(Deserialize)]
struct MessageRecord {
    id: String,
    role: Role,
    content: Content,
    created_at: DateTime<Utc>,
    #[serde(default)]
    edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tokens: Option<u32>,
    #[serde(default)]
    cost: Option<f64>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    streaming: bool,
    #[serde(default)]
    attachments: Vec<FileAttachment>,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        let is_user = record.role == Role::User;
        let unfinished = is_user || record.streaming;

        Self {
            id: record.id,
            role: record.role,
            content: record.content,
            created_at: record.created_at,
            edited_at: record.edited_at,
            model: record.model.filter(|_| !is_user),
            thinking: record.thinking.filter(|_| !is_user),
            tokens: record.tokens.filter(|_| !unfinished),
            cost: record.cost.filter(|_| !unfinished),
            streaming: record.streaming && !is_user,
            attachments: record.attachments,
        }
    }
}

impl Message {
    fn base(role: Role, content: Content) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
            edited_at: None,
            model: None,
            tokens: None,
            cost: None,
            thinking: None,
            streaming: false,
            attachments: Vec::new(),
        }
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::base(Role::User, content.into())
    }

    pub fn user_with_attachments(content: impl Into<Content>, attachments: Vec<FileAttachment>) -> Self {
        let mut message = Self::user(content);
        message.attachments = attachments;
        message
    }

    /// A finished assistant turn
    pub fn assistant(content: impl Into<Content>, model: impl Into<String>) -> Self {
        let mut message = Self::base(Role::Assistant, content.into());
        message.model = Some(model.into());
        message
    }

    /// Empty assistant turn that receives streamed deltas
    pub fn assistant_placeholder(model: impl Into<String>) -> Self {
        let mut message = Self::assistant(Content::default(), model);
        message.streaming = true;
        message
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        if self.role == Role::Assistant {
            self.thinking = Some(thinking.into());
        }
        self
    }

    /// Same turn with different content (used when trimming context)
    pub fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn text(&self) -> String {
        colloquy_llm::extract_text(&self.content)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn edited_at(&self) -> Option<DateTime<Utc>> {
        self.edited_at
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn tokens(&self) -> Option<u32> {
        self.tokens
    }

    pub fn cost(&self) -> Option<f64> {
        self.cost
    }

    pub fn thinking(&self) -> Option<&str> {
        self.thinking.as_deref()
    }

    pub fn has_thinking(&self) -> bool {
        self.thinking.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn attachments(&self) -> &[FileAttachment] {
        &self.attachments
    }

    pub fn attachments_mut(&mut self) -> &mut [FileAttachment] {
        &mut self.attachments
    }

    pub fn state(&self, stop_marker: &str) -> MessageState {
        if self.streaming {
            MessageState::Streaming
        } else if !stop_marker.is_empty() && self.text().ends_with(stop_marker) {
            MessageState::Stopped
        } else {
            MessageState::Finalized
        }
    }

    pub fn append_content(&mut self, delta: &str) {
        self.content.push_text(delta);
    }

    /// Ignored on user turns
    pub fn append_thinking(&mut self, delta: &str) {
        if self.role == Role::Assistant {
            self.thinking.get_or_insert_with(String::new).push_str(delta);
        }
    }

    pub fn finalize(&mut self, tokens: u32, cost: f64) {
        self.streaming = false;
        self.tokens = Some(tokens);
        self.cost = Some(cost);
    }

    /// Append the stop marker; tokens and cost stay unset
    pub fn stop(&mut self, stop_marker: &str) {
        self.content.push_text(stop_marker);
        self.streaming = false;
    }

    pub fn edit(&mut self, content: Content) {
        self.content = content;
        self.edited_at = Some(Utc::now());
    }
}
