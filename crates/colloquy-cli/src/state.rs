use colloquy::{CancellationToken, EngineBuilder, SessionStore};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::Config;

/// Everything a command needs, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<SessionStore>,
}

impl AppState {
    pub fn new(config: Config, session: SessionStore) -> Self {
        Self {
            config: Arc::new(config),
            session: Arc::new(session),
        }
    }

    /// Wire the engine from configuration and load stored conversations
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let session = EngineBuilder::new()
            .config(config.engine_config())
            .provider(config.provider())?
            .cost_lookup(Arc::new(config.pricing_table()))
            .data_dir(&config.storage.data_dir)
            .build()?;

        let loaded = session.load().await?;
        tracing::info!(
            conversations = loaded,
            data_dir = %config.storage.data_dir.display(),
            "Session ready"
        );

        Ok(Self::new(config, session))
    }

    /// Periodic flush of dirty conversations at the configured autosave interval
    pub fn spawn_autosave(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let period = self.session.config().autosave_interval;
        self.session.spawn_autosave(period, shutdown)
    }
}
