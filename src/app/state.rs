use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::app::Config;
use crate::relay::{HttpRelayClient, Relay};
use crate::runtime::ConversationSession;
use crate::session::{ContextAssembler, Message, SessionStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Config>,
    /// The conversation this process owns
    pub session: ConversationSession,
}

impl AppState {
    /// Create new app state
    pub fn new(config: Config, session: ConversationSession) -> Self {
        Self {
            config: Arc::new(config),
            session,
        }
    }

    /// Wire the real relay client and the on-disk store from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let client = HttpRelayClient::from_config(&config)?;
        info!(model = client.name(), url = %config.upstream.api_url, "Completion backend configured");

        let data_dir = config.data_dir()?;
        let store = SessionStore::open(&data_dir)
            .with_context(|| format!("Failed to open session store at {}", data_dir.display()))?;
        let assembler = ContextAssembler::from_config(&config.session);

        let session = ConversationSession::new(Arc::new(client), assembler, store);
        Ok(Self::new(config, session))
    }

    /// Block explorer link for a message's payment reference
    pub fn explorer_link(&self, message: &Message) -> Option<String> {
        message.explorer_link(&self.config.session.explorer_url)
    }
}
