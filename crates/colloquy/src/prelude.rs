//! Prelude module for convenient imports
//!
//! ```rust
//! use colloquy::prelude::*;
//! ```

pub use crate::{
    CancellationToken, ChatClient, Content, ContentBlock, Conversation, EngineBuilder,
    EngineConfig, ExportFormat, GenerationOptions, GenerationOutcome, Message, ModelCatalog,
    OpenAIClient, PendingFile, PricingTable, ProviderConfig, Role, SessionError, SessionEvent,
    SessionStore,
};
