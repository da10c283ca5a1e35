// Streaming dispatcher: one request in, ordered DispatchEvents out

use colloquy_context::{estimate_messages_tokens, estimate_tokens};
use colloquy_llm::{
    ChatClient, ChatOptions, ChatRequest, Message as WireMessage, ModelCatalog, StreamEvent,
    TokenUsage, DEFAULT_REASONING_BUDGET_FLOOR,
};
use colloquy_types::DispatchEvent;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 256;

/// Everything needed to open one completion stream
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub reasoning: bool,
}

pub struct Dispatcher {
    client: Arc<dyn ChatClient>,
    catalog: Arc<ModelCatalog>,
    reasoning_budget_floor: u32,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn ChatClient>, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            client,
            catalog,
            reasoning_budget_floor: DEFAULT_REASONING_BUDGET_FLOOR,
        }
    }

    pub fn with_reasoning_budget_floor(mut self, floor: u32) -> Self {
        self.reasoning_budget_floor = floor;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Translate a dispatch request into a provider request, adding
    /// reasoning fields the target model understands
    pub fn shape_request(&self, request: DispatchRequest) -> ChatRequest {
        let mut options = ChatOptions::new().max_tokens(request.max_tokens);
        if let Some(temp) = request.temperature {
            options = options.temperature(temp);
        }

        let capability = self.catalog.capability(&request.model);
        if let Some(params) = capability.shape(
            request.reasoning,
            request.max_tokens,
            self.reasoning_budget_floor,
        ) {
            options = options.reasoning(params);
        } else if request.reasoning && !capability.supports_reasoning() {
            tracing::debug!(model = %request.model, "Model has no reasoning support, ignoring flag");
        }

        ChatRequest::new(request.model, request.messages).with_options(options)
    }

    /// Start streaming in a background task.
    ///
    /// The receiver yields `Content` / `Reasoning` in wire order, then exactly
    /// one `Complete` or `Error`, then closes. Once `cancel` fires the task
    /// drops the stream and sends nothing more.
    pub fn dispatch(
        &self,
        request: DispatchRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<DispatchEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let prompt_estimate = estimate_messages_tokens(&request.messages);
        let chat_request = self.shape_request(request);
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            run_stream(client, chat_request, prompt_estimate, tx, cancel).await;
        });

        rx
    }
}

/// Send unless cancelled; `false` means stop
async fn emit(
    tx: &mpsc::Sender<DispatchEvent>,
    cancel: &CancellationToken,
    event: DispatchEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

async fn run_stream(
    client: Arc<dyn ChatClient>,
    request: ChatRequest,
    prompt_estimate: u32,
    tx: mpsc::Sender<DispatchEvent>,
    cancel: CancellationToken,
) {
    let model = request.model.clone();
    tracing::info!(model = %model, messages = request.messages.len(), "Dispatching chat request");

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(model = %model, "Dispatch cancelled before the stream opened");
            return;
        }
        opened = client.chat_stream(request) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(model = %model, "Failed to open stream: {}", e);
            emit(&tx, &cancel, DispatchEvent::Error(e.to_string())).await;
            return;
        }
    };

    let mut usage: Option<TokenUsage> = None;
    let mut generated = String::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(model = %model, "Dispatch cancelled mid-stream");
                return;
            }
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(StreamEvent::Content { content })) => {
                generated.push_str(&content);
                DispatchEvent::Content(content)
            }
            Some(Ok(StreamEvent::Reasoning { content })) => {
                generated.push_str(&content);
                DispatchEvent::Reasoning(content)
            }
            Some(Ok(StreamEvent::Usage { usage: reported })) => {
                usage = Some(reported);
                continue;
            }
            // end of stream, with or without the done marker
            Some(Ok(StreamEvent::Done { .. })) | None => break,
            Some(Err(e)) => {
                tracing::warn!(model = %model, "Stream failed: {}", e);
                emit(&tx, &cancel, DispatchEvent::Error(e.to_string())).await;
                return;
            }
        };

        if !emit(&tx, &cancel, event).await {
            return;
        }
    }

    let usage = usage.unwrap_or_else(|| {
        tracing::debug!(model = %model, "Provider sent no usage, estimating");
        TokenUsage::new(prompt_estimate, estimate_tokens(&generated))
    });

    tracing::info!(
        model = %model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "Dispatch complete"
    );
    emit(&tx, &cancel, DispatchEvent::Complete(usage)).await;
}
