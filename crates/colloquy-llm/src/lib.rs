pub mod types;
pub mod traits;
pub mod streaming;
pub mod buffer_utils;
pub mod reasoning;
pub mod catalog;
pub mod openai;
pub mod config;

pub use traits::{ChatClient, ChatOptions, ChatRequest, EventStream, TokenUsage};

pub use streaming::{ChatSseParser, StreamEvent};
pub use openai::OpenAIClient;
pub use reasoning::{
    reasoning_budget, ReasoningCapability, ReasoningEffort, ReasoningParams,
    DEFAULT_REASONING_BUDGET_FLOOR,
};
pub use catalog::{CostLookup, ModelCatalog, ModelPricing, ModelRecord, PricingEntry, PricingTable};
pub use config::{ClientFactory, OpenAIConfig, ProviderConfig};
pub use types::{extract_text, normalize_for_wire, Content, ContentBlock, MediaSource, Message};
