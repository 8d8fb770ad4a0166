use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::ConsoleConfig;
use crate::database::ConsoleDatabase;
use crate::http_client::build_http_client;
use crate::proxy::TalkDbProxy;

pub struct BackendRuntime {
    pub config: ConsoleConfig,
    pub database: Arc<ConsoleDatabase>,
    pub talkdb: Arc<TalkDbProxy>,
}

impl BackendRuntime {
    pub fn bootstrap(config: ConsoleConfig) -> Result<Self> {
        let database = ConsoleDatabase::new(&config.database_path)
            .with_context(|| format!("Failed to open store at {}", config.database_path))?;
        tracing::info!("Store ready at {}", config.database_path);

        let http = build_http_client(Some(config.webhook_timeout()))?;
        if config.talkdb_webhook_url.is_none() {
            tracing::warn!("N8N_TALKDB_WEBHOOK_URL not set; /api/talkdb will answer 500");
        }
        let talkdb = TalkDbProxy::new(http, config.talkdb_webhook_url.clone());

        Ok(Self {
            config,
            database: Arc::new(database),
            talkdb: Arc::new(talkdb),
        })
    }
}
