use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    // Store
    #[serde(default = "default_database_path")]
    pub database_path: String,

    // Automation webhooks (n8n). Unset means the feature is unavailable.
    #[serde(default)]
    pub chat_webhook_url: Option<String>,
    #[serde(default)]
    pub admin_reply_webhook_url: Option<String>,
    #[serde(default)]
    pub talkdb_webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,

    // Operator identity used for take-over and replies
    #[serde(default = "default_operator_name")]
    pub operator_name: String,

    // Live conversation view
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_error_display_ms")]
    pub error_display_ms: u64,
}

fn default_database_path() -> String {
    "bantuai.db".to_string()
}

fn default_webhook_timeout_secs() -> u64 {
    30
}

fn default_operator_name() -> String {
    "Admin".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_error_display_ms() -> u64 {
    4000
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            chat_webhook_url: None,
            admin_reply_webhook_url: None,
            talkdb_webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout_secs(),
            operator_name: default_operator_name(),
            poll_interval_ms: default_poll_interval_ms(),
            error_display_ms: default_error_display_ms(),
        }
    }
}

impl ConsoleConfig {
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Config file lives next to the executable.
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("bantuai_config.toml")
    }

    /// Load `bantuai_config.toml` if present, then apply environment overrides.
    pub fn load() -> Self {
        let path = Self::config_path();
        let mut config = match Self::load_from(&path) {
            Ok(Some(config)) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Ok(None) => {
                tracing::warn!("No config file found, using defaults + env vars");
                Self::default()
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        toml::from_str::<ConsoleConfig>(&contents)
            .map(Some)
            .with_context(|| format!("Failed to parse {:?}", path))
    }

    /// Environment variables win over the file. `lookup` is injectable for tests.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(path) = non_empty("BANTUAI_DATABASE_PATH") {
            self.database_path = path;
        }
        if let Some(url) = non_empty("N8N_CHAT_WEBHOOK_URL") {
            self.chat_webhook_url = Some(url);
        }
        if let Some(url) = non_empty("N8N_ADMIN_REPLY_WEBHOOK_URL") {
            self.admin_reply_webhook_url = Some(url);
        }
        if let Some(url) = non_empty("N8N_TALKDB_WEBHOOK_URL") {
            self.talkdb_webhook_url = Some(url);
        }
        if let Some(name) = non_empty("BANTUAI_OPERATOR_NAME") {
            self.operator_name = name;
        }
        if let Some(ms) = non_empty("BANTUAI_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = ms;
        }
        if let Some(ms) = non_empty("BANTUAI_ERROR_DISPLAY_MS").and_then(|v| v.parse().ok()) {
            self.error_display_ms = ms;
        }
        if let Some(secs) = non_empty("BANTUAI_WEBHOOK_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            self.webhook_timeout_secs = secs;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn error_display(&self) -> Duration {
        Duration::from_millis(self.error_display_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}
