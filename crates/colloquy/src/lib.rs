//! # Colloquy
//!
//! Conversation streaming and session-consistency engine for chat clients
//! talking to a remote LLM completion endpoint.
//!
//! It keeps multi-turn conversations in memory, streams replies into them,
//! supports editing history in place (send, resend, regenerate, edit,
//! delete, stop) and writes every change through to a local store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colloquy::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = EngineBuilder::new()
//!         .config(EngineConfig::default().with_default_model("gpt-4o-mini"))
//!         .provider(ProviderConfig::openai(std::env::var("OPENAI_API_KEY")?))?
//!         .data_dir("./data")
//!         .build()?;
//!
//!     session.load().await?;
//!     let conversation = session.create_conversation(None);
//!
//!     let mut events = session.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let SessionEvent::Content { delta, .. } = event {
//!                 print!("{}", delta);
//!             }
//!         }
//!     });
//!
//!     session
//!         .send(&conversation, "Hello!", "gpt-4o-mini", false, GenerationOptions::new(), vec![])
//!         .await?;
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`colloquy-llm`**: content model, SSE parsing, OpenAI-compatible client, model catalog
//! - **`colloquy-types`**: messages, conversations, engine configuration
//! - **`colloquy-context`**: context window trimming and token estimation
//! - **`colloquy-persist`**: conversation and asset stores, dirty tracking
//! - **`colloquy-session`**: streaming dispatcher and the session store
//!
//! ## License
//!
//! MIT

mod builder;
pub mod prelude;

pub use builder::EngineBuilder;

pub use colloquy_llm::{
    extract_text, normalize_for_wire, ChatClient, ChatOptions, ChatRequest, ClientFactory, EventStream,
    Content, ContentBlock, CostLookup, MediaSource, ModelCatalog, ModelRecord, OpenAIClient,
    OpenAIConfig, PricingEntry, PricingTable, ProviderConfig, ReasoningCapability,
    ReasoningEffort, ReasoningParams, StreamEvent, TokenUsage,
};

pub use colloquy_types::{
    Conversation, DispatchEvent, EngineConfig, FileAttachment, Message, MessageState, Role, Usage,
};

pub use colloquy_context::{prepare, ContextStrategy, ContextWindow, WindowedContextStrategy};

pub use colloquy_persist::{
    AssetStore, ConversationStore, ExportFormat, FlushReport, FsAssetStore,
    InMemoryAssetStore, InMemoryConversationStore, JsonConversationStore, PersistError,
    PersistenceBridge,
};

pub use colloquy_session::{
    AttachmentEncoder, Base64Encoder, Dispatcher, GenerationOptions, GenerationOutcome,
    PendingFile, SessionError, SessionEvent, SessionStore,
};

pub use tokio_util::sync::CancellationToken;
