use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

pub const DEFAULT_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl Conversation {
    pub fn new(project_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            starred: false,
            project_id,
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Advance `updated_at`, strictly, even within one clock tick
    pub fn touch(&mut self) {
        let floor = self.updated_at + Duration::milliseconds(1);
        self.updated_at = Utc::now().max(floor);
    }

    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == message_id)
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == message_id)
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id() == message_id)
    }

    /// Keep `messages[..len]`
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// True when the history is exactly one user turn
    pub fn is_first_turn(&self) -> bool {
        matches!(self.messages.as_slice(), [only] if only.is_user())
    }

    /// Title from the first user turn while the default title is still in place
    pub fn title_from_first_message(&mut self) {
        if self.title != DEFAULT_TITLE {
            return;
        }
        if let Some(first) = self.messages.iter().find(|m| m.is_user()) {
            let text = first.text();
            let line = text.lines().next().unwrap_or("").trim();
            if !line.is_empty() {
                self.title = line.chars().take(50).collect();
            }
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.messages.iter().filter_map(|m| m.cost()).sum()
    }
}
