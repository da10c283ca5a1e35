use colloquy_types::Usage;
use serde::Serialize;

/// Progress of generations, broadcast to whoever renders the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    GenerationStarted {
        conversation_id: String,
        message_id: String,
        model: String,
    },
    Content {
        conversation_id: String,
        message_id: String,
        delta: String,
    },
    Reasoning {
        conversation_id: String,
        message_id: String,
        delta: String,
    },
    GenerationFinished {
        conversation_id: String,
        message_id: String,
        usage: Usage,
    },
    GenerationStopped {
        conversation_id: String,
        message_id: Option<String>,
    },
    GenerationFailed {
        conversation_id: String,
        error: String,
    },
}

impl SessionEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::GenerationStarted { conversation_id, .. }
            | Self::Content { conversation_id, .. }
            | Self::Reasoning { conversation_id, .. }
            | Self::GenerationFinished { conversation_id, .. }
            | Self::GenerationStopped { conversation_id, .. }
            | Self::GenerationFailed { conversation_id, .. } => conversation_id,
        }
    }
}
