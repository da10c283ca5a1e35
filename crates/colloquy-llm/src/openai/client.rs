// OpenAI-compatible chat completions client (streaming only)

use crate::buffer_utils::parse_sse_response;
use crate::reasoning::ReasoningParams;
use crate::streaming::ChatSseParser;
use crate::traits::{ChatClient, ChatOptions, ChatRequest, EventStream};
use crate::types::{normalize_for_wire, Content, ContentBlock, Message};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Map, Value};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI client (HTTP direct, no SDK)
///
/// Works against any endpoint speaking the `/chat/completions` SSE dialect
/// (OpenRouter, DeepSeek, vLLM, local gateways) via [`OpenAIClient::with_base_url`].
pub struct OpenAIClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenAIClient {
    /// Create new client with API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build chat completion request payload
    pub(crate) fn build_chat_request(
        model: &str,
        messages: Vec<Message>,
        options: &ChatOptions,
    ) -> Value {
        let wire_messages: Vec<Value> = messages.into_iter().map(convert_message).collect();

        let mut request = Map::new();
        request.insert("model".to_string(), json!(model));
        request.insert("messages".to_string(), Value::Array(wire_messages));
        request.insert("stream".to_string(), json!(true));
        request.insert("stream_options".to_string(), json!({ "include_usage": true }));

        if let Some(temp) = options.temperature {
            request.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tokens) = options.max_tokens {
            request.insert("max_tokens".to_string(), json!(max_tokens));
        }

        match &options.reasoning {
            Some(ReasoningParams::Effort(effort)) => {
                request.insert("reasoning_effort".to_string(), json!(effort));
            }
            Some(ReasoningParams::Budget { budget_tokens }) => {
                request.insert(
                    "thinking".to_string(),
                    json!({ "type": "enabled", "budget_tokens": budget_tokens }),
                );
            }
            Some(ReasoningParams::Tokens { max_tokens }) => {
                request.insert("reasoning".to_string(), json!({ "max_tokens": max_tokens }));
            }
            None => {}
        }

        Value::Object(request)
    }
}

fn convert_message(message: Message) -> Value {
    let role = message.role().to_string();
    let content = match message {
        Message::System { content } | Message::Human { content } | Message::AI { content } => {
            convert_content(content)
        }
    };
    json!({ "role": role, "content": content })
}

/// Plain text stays a string; blocks become OpenAI content parts
fn convert_content(content: Content) -> Value {
    if let Content::Text(text) = content {
        return json!(text);
    }

    let parts: Vec<Value> = normalize_for_wire(content)
        .into_iter()
        .map(|block| match block {
            ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
            ContentBlock::Image { source } => json!({
                "type": "image_url",
                "image_url": { "url": source.data_url() },
            }),
            ContentBlock::Document { source, name } => json!({
                "type": "file",
                "file": {
                    "filename": name.unwrap_or_else(|| "document".to_string()),
                    "file_data": source.data_url(),
                },
            }),
            ContentBlock::Audio { source } => json!({
                "type": "input_audio",
                "input_audio": {
                    "data": source.data,
                    "format": source.media_type.rsplit('/').next().unwrap_or("wav"),
                },
            }),
            ContentBlock::Video { source } => json!({
                "type": "video_url",
                "video_url": { "url": source.data_url() },
            }),
        })
        .collect();

    Value::Array(parts)
}

#[async_trait]
impl ChatClient for OpenAIClient {
    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        let payload = Self::build_chat_request(&request.model, request.messages, &request.options);

        tracing::debug!(model = %request.model, "Sending streaming chat request");

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        Ok(parse_sse_response(response, ChatSseParser))
    }
}
