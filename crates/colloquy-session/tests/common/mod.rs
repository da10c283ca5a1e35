#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use colloquy_llm::{ChatClient, ChatRequest, EventStream, ModelCatalog, PricingTable, StreamEvent, TokenUsage};
use colloquy_persist::{InMemoryAssetStore, InMemoryConversationStore};
use colloquy_session::{Base64Encoder, Dispatcher, SessionEvent, SessionStore};
use colloquy_types::EngineConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

pub const MODEL: &str = "test-model";

/// One scripted reply
pub enum Script {
    /// Yield these items, then end
    Events(Vec<anyhow::Result<StreamEvent>>),
    /// Fail before any byte arrives
    OpenError(String),
    /// Driven by the test through a channel
    Live(mpsc::UnboundedReceiver<anyhow::Result<StreamEvent>>),
}

pub fn content(text: &str) -> anyhow::Result<StreamEvent> {
    Ok(StreamEvent::Content {
        content: text.to_string(),
    })
}

pub fn reasoning(text: &str) -> anyhow::Result<StreamEvent> {
    Ok(StreamEvent::Reasoning {
        content: text.to_string(),
    })
}

pub fn usage(prompt: u32, completion: u32) -> anyhow::Result<StreamEvent> {
    Ok(StreamEvent::Usage {
        usage: TokenUsage::new(prompt, completion),
    })
}

pub fn done() -> anyhow::Result<StreamEvent> {
    Ok(StreamEvent::Done { finish_reason: None })
}

pub fn failure(message: &str) -> anyhow::Result<StreamEvent> {
    Err(anyhow!(message.to_string()))
}

/// Plays back scripts in order and records every request it receives
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    /// Reply with `text`, reporting usage
    pub fn reply(&self, text: &str) {
        self.push(Script::Events(vec![content(text), usage(10, 20), done()]));
    }

    /// Reply whose events the returned sender controls
    pub fn live(&self) -> mpsc::UnboundedSender<anyhow::Result<StreamEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Script::Live(rx));
        tx
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> ChatRequest {
        self.requests.lock().last().cloned().expect("no request recorded")
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat_stream(&self, request: ChatRequest) -> anyhow::Result<EventStream> {
        self.requests.lock().push(request);
        let script = self.scripts.lock().pop_front();

        match script {
            Some(Script::Events(events)) => Ok(Box::pin(futures::stream::iter(events))),
            Some(Script::OpenError(message)) => Err(anyhow!(message)),
            Some(Script::Live(rx)) => Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            }))),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

pub struct Harness {
    pub session: Arc<SessionStore>,
    pub client: Arc<ScriptedClient>,
    pub conversations: Arc<InMemoryConversationStore>,
    pub assets: Arc<InMemoryAssetStore>,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default().with_default_model(MODEL), InMemoryConversationStore::new())
}

pub fn harness_with(config: EngineConfig, conversations: InMemoryConversationStore) -> Harness {
    let client = Arc::new(ScriptedClient::default());
    let conversations = Arc::new(conversations);
    let assets = Arc::new(InMemoryAssetStore::new());
    let pricing = PricingTable::new().with_price(MODEL, 1000.0, 2000.0);

    let dispatcher = Dispatcher::new(client.clone(), Arc::new(ModelCatalog::new()));
    let session = SessionStore::new(
        config,
        dispatcher,
        conversations.clone(),
        assets.clone(),
        Arc::new(Base64Encoder),
        Arc::new(pricing),
    );

    Harness {
        session: Arc::new(session),
        client,
        conversations,
        assets,
    }
}

/// Wait until the session has applied a content delta
pub async fn wait_for_content(events: &mut broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Content { .. }) => return,
            Ok(_) => continue,
            Err(e) => panic!("event stream closed: {e}"),
        }
    }
}

/// Give spawned dispatch tasks time to run
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
