use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    common::{
        errors::{ClientError, ClientResult},
        http::{DEFAULT_TIMEOUT_MS, HttpClient},
        types::UserId,
    },
    configs::*,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClientConfig {
    /// The bot's own user id. Voice state updates for anyone else are ignored.
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default = "HttpClient::default_user_agent")]
    pub client_name: String,
    #[serde(default)]
    pub rest: RestConfig,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RestConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl ClientConfig {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            client_name: HttpClient::default_user_agent(),
            rest: RestConfig::default(),
            logging: None,
            nodes: Vec::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        if config_str.trim().is_empty() {
            return Err(ClientError::config(format!("{} is empty", path.display())));
        }
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> ClientResult<Self> {
        let config: ClientConfig =
            toml::from_str(config_str).map_err(|e| ClientError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.user_id.0 == 0 {
            return Err(ClientError::config("user_id (the bot's identity) is required"));
        }
        if self.client_name.trim().is_empty() {
            return Err(ClientError::config("client_name must not be empty"));
        }
        if self.rest.timeout_ms == 0 {
            return Err(ClientError::config("rest.timeout_ms must be greater than zero"));
        }
        for node in &self.nodes {
            node.validate()?;
        }
        Ok(())
    }
}
