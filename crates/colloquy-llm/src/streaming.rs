use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::buffer_utils::SseLineParser;
use crate::traits::TokenUsage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Reasoning ("thinking") delta, separate from visible content
    Reasoning {
        content: String,
    },

    /// Visible assistant text delta
    Content {
        content: String,
    },

    /// Token accounting, usually sent right before the end of the stream
    Usage {
        usage: TokenUsage,
    },

    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<UsageChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    pub role: Option<String>,
    pub content: Option<String>,
    /// DeepSeek / vLLM style reasoning field
    pub reasoning_content: Option<String>,
    /// OpenRouter style reasoning field
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageChunk {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatStreamChunk {
    fn to_stream_events(&self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(choice) = self.choices.first() {
            let reasoning = choice
                .delta
                .reasoning_content
                .as_ref()
                .or(choice.delta.reasoning.as_ref());

            if let Some(reasoning) = reasoning {
                if !reasoning.is_empty() {
                    events.push(StreamEvent::Reasoning {
                        content: reasoning.clone(),
                    });
                }
            }

            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::Content {
                        content: content.clone(),
                    });
                }
            }
        }

        if let Some(usage) = &self.usage {
            events.push(StreamEvent::Usage {
                usage: TokenUsage::new(usage.prompt_tokens, usage.completion_tokens),
            });
        }

        events
    }
}

/// SSE strategy for OpenAI-compatible `/chat/completions` streams
///
/// `finish_reason` is not treated as terminal: the usage chunk arrives after
/// it, so only `[DONE]` ends the stream.
pub struct ChatSseParser;

impl SseLineParser for ChatSseParser {
    fn parse_data_line(&self, data: &str) -> Result<Vec<StreamEvent>> {
        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| anyhow::anyhow!("Failed to parse chat chunk: {}", e))?;

        // Some providers report failures in-band after a 200 response
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(anyhow::anyhow!("Provider error: {}", message));
        }

        let chunk: ChatStreamChunk = serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("Failed to parse chat chunk: {}", e))?;

        Ok(chunk.to_stream_events())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_delta() {
        let events = ChatSseParser
            .parse_data_line(r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#)
            .unwrap();

        assert_eq!(events, vec![StreamEvent::Content { content: "Hi".to_string() }]);
    }

    #[test]
    fn test_reasoning_before_content_in_same_chunk() {
        let events = ChatSseParser
            .parse_data_line(r#"{"choices":[{"delta":{"reasoning_content":"hmm","content":"ok"},"finish_reason":null}]}"#)
            .unwrap();

        assert_eq!(
            events,
            vec![
                StreamEvent::Reasoning { content: "hmm".to_string() },
                StreamEvent::Content { content: "ok".to_string() },
            ]
        );
    }

    #[test]
    fn test_openrouter_reasoning_field() {
        let events = ChatSseParser
            .parse_data_line(r#"{"choices":[{"delta":{"reasoning":"step 1"},"finish_reason":null}]}"#)
            .unwrap();

        assert_eq!(events, vec![StreamEvent::Reasoning { content: "step 1".to_string() }]);
    }

    #[test]
    fn test_usage_chunk_without_choices() {
        let events = ChatSseParser
            .parse_data_line(r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34,"total_tokens":46}}"#)
            .unwrap();

        assert_eq!(events, vec![StreamEvent::Usage { usage: TokenUsage::new(12, 34) }]);
    }

    #[test]
    fn test_finish_reason_is_not_terminal() {
        let events = ChatSseParser
            .parse_data_line(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap();

        assert!(events.is_empty());
    }

    #[test]
    fn test_in_band_error() {
        let err = ChatSseParser
            .parse_data_line(r#"{"error":{"message":"overloaded"}}"#)
            .unwrap_err();

        assert!(err.to_string().contains("overloaded"));
    }
}
