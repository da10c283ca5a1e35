use serde::{Deserialize, Serialize};

/// Prompt and completion token counts reported at the end of a stream
pub type Usage = colloquy_llm::TokenUsage;

/// Event delivered by one dispatch, in wire order.
///
/// `Complete` or `Error` is always the last event; the channel closes right
/// after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DispatchEvent {
    Content(String),
    Reasoning(String),
    Complete(Usage),
    Error(String),
}

impl DispatchEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }
}
