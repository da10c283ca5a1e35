use anyhow::{anyhow, Result};
use colloquy_llm::{ChatClient, ClientFactory, CostLookup, ModelCatalog, PricingTable, ProviderConfig};
use colloquy_persist::{AssetStore, ConversationStore, FsAssetStore, JsonConversationStore};
use colloquy_session::{AttachmentEncoder, Base64Encoder, Dispatcher, SessionStore};
use colloquy_types::EngineConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for a ready-to-use [`SessionStore`]
///
/// Only the chat client and the two stores are required. The encoder falls
/// back to [`Base64Encoder`], pricing to an empty table (every reply costs 0)
/// and the catalog to the built-in known-model table.
pub struct EngineBuilder {
    config: EngineConfig,
    client: Option<Arc<dyn ChatClient>>,
    catalog: ModelCatalog,
    conversations: Option<Arc<dyn ConversationStore>>,
    assets: Option<Arc<dyn AssetStore>>,
    encoder: Arc<dyn AttachmentEncoder>,
    costs: Arc<dyn CostLookup>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            client: None,
            catalog: ModelCatalog::new(),
            conversations: None,
            assets: None,
            encoder: Arc::new(Base64Encoder),
            costs: Arc::new(PricingTable::new()),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Create the chat client from provider settings
    pub fn provider(mut self, provider: ProviderConfig) -> Result<Self> {
        self.client = Some(ClientFactory::create_chat_client(provider)?);
        Ok(self)
    }

    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn conversation_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    pub fn asset_store(mut self, store: Arc<dyn AssetStore>) -> Self {
        self.assets = Some(store);
        self
    }

    /// JSON conversations and file assets under one data directory
    pub fn data_dir(self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.conversation_store(Arc::new(JsonConversationStore::new(root.clone())))
            .asset_store(Arc::new(FsAssetStore::new(root)))
    }

    pub fn encoder(mut self, encoder: Arc<dyn AttachmentEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn cost_lookup(mut self, costs: Arc<dyn CostLookup>) -> Self {
        self.costs = costs;
        self
    }

    pub fn build(self) -> Result<SessionStore> {
        let client = self.client.ok_or_else(|| anyhow!("Chat client is required"))?;
        let conversations = self
            .conversations
            .ok_or_else(|| anyhow!("Conversation store is required"))?;
        let assets = self.assets.ok_or_else(|| anyhow!("Asset store is required"))?;

        let dispatcher = Dispatcher::new(client, Arc::new(self.catalog))
            .with_reasoning_budget_floor(self.config.reasoning_budget_floor);

        Ok(SessionStore::new(
            self.config,
            dispatcher,
            conversations,
            assets,
            self.encoder,
            self.costs,
        ))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
