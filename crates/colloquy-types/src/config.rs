use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_STOP_MARKER: &str = "\n\n[stopped]";

/// Engine-wide settings for context trimming, dispatch and autosave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_model: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub max_messages: usize,
    pub max_messages_with_attachments: usize,
    pub stop_marker: String,
    #[serde(with = "duration_secs")]
    pub autosave_interval: Duration,
    pub reasoning_budget_floor: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            temperature: None,
            max_tokens: 4096,
            max_messages: 20,
            max_messages_with_attachments: 5,
            stop_marker: DEFAULT_STOP_MARKER.to_string(),
            autosave_interval: Duration::from_secs(30),
            reasoning_budget_floor: colloquy_llm::DEFAULT_REASONING_BUDGET_FLOOR,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_context_limits(mut self, max_messages: usize, max_messages_with_attachments: usize) -> Self {
        self.max_messages = max_messages;
        self.max_messages_with_attachments = max_messages_with_attachments;
        self
    }

    pub fn with_stop_marker(mut self, marker: impl Into<String>) -> Self {
        self.stop_marker = marker.into();
        self
    }

    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    pub fn with_reasoning_budget_floor(mut self, floor: u32) -> Self {
        self.reasoning_budget_floor = floor;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
