// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{RelayError, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. CLI arguments (highest, applied by the caller)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest)
    ///
    /// `OPENAI_API_KEY` and `OPENAI_MODEL` fill in the credential and model
    /// when neither the file nor `CHAT_RELAY_*` variables set them.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // Load from config file if it exists
            .add_source(File::from(config_path).required(path.is_some()))
            // Override with environment variables (e.g. CHAT_RELAY_UPSTREAM__API_KEY)
            .add_source(
                Environment::with_prefix("CHAT_RELAY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        let mut app: AppConfig = config
            .try_deserialize()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        app.apply_openai_env(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("OPENAI_MODEL").ok(),
        );

        Ok(app)
    }

    fn apply_openai_env(&mut self, api_key: Option<String>, model: Option<String>) {
        if self.upstream.credential().is_none() {
            if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
                self.upstream.api_key = Some(ApiKey::new(key));
            }
        }
        if self.upstream.model == default_model() {
            if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
                self.upstream.model = model;
            }
        }
    }

    fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chat-relay")
            .join("config.toml")
    }
}
