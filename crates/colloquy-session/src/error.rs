use colloquy_persist::PersistError;
use colloquy_types::Role;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Message {message_id} not found in conversation {conversation_id}")]
    MessageNotFound {
        conversation_id: String,
        message_id: String,
    },

    #[error("Message {message_id} must be a {expected} message")]
    WrongRole { message_id: String, expected: Role },

    #[error("A generation is already running in conversation {0}")]
    GenerationInProgress(String),

    #[error("Nothing precedes message {0}, so there is nothing to regenerate")]
    NothingToRegenerate(String),

    #[error("Message {0} is still streaming")]
    MessageStreaming(String),

    #[error("Attachment encoding failed for {name}: {reason}")]
    Encoding { name: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl SessionError {
    /// Caller mistakes that leave state untouched
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound(_)
                | Self::MessageNotFound { .. }
                | Self::WrongRole { .. }
                | Self::GenerationInProgress(_)
                | Self::NothingToRegenerate(_)
                | Self::MessageStreaming(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
