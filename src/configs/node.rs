use serde::{Deserialize, Serialize};

use crate::common::errors::{ClientError, ClientResult};

/// Connection parameters of one backend node.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct NodeConfig {
    /// Display name; falls back to `host:port`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub secure: bool,
}

impl NodeConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            name: None,
            host: host.into(),
            port,
            password: password.into(),
            secure: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Host, port and password are all required; a node missing any of them
    /// can never authenticate.
    pub fn validate(&self) -> ClientResult<()> {
        if self.host.trim().is_empty() {
            return Err(ClientError::config("node host is required"));
        }
        if self.port == 0 {
            return Err(ClientError::config(format!(
                "node {} needs a non-zero port",
                self.host
            )));
        }
        if self.password.is_empty() {
            return Err(ClientError::config(format!(
                "node {}:{} needs a password",
                self.host, self.port
            )));
        }
        Ok(())
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    pub fn ws_url(&self) -> String {
        format!(
            "ws{}://{}:{}/v4/websocket",
            if self.secure { "s" } else { "" },
            self.host,
            self.port
        )
    }

    pub fn http_url(&self) -> String {
        format!(
            "http{}://{}:{}",
            if self.secure { "s" } else { "" },
            self.host,
            self.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_secure_flag() {
        let plain = NodeConfig::new("localhost", 2333, "youshallnotpass");
        assert_eq!(plain.ws_url(), "ws://localhost:2333/v4/websocket");
        assert_eq!(plain.http_url(), "http://localhost:2333");

        let tls = plain.with_secure(true);
        assert_eq!(tls.ws_url(), "wss://localhost:2333/v4/websocket");
        assert_eq!(tls.http_url(), "https://localhost:2333");
    }

    #[test]
    fn missing_fields_are_configuration_errors() {
        use crate::common::ErrorKind;

        for config in [
            NodeConfig::new("", 2333, "pw"),
            NodeConfig::new("localhost", 0, "pw"),
            NodeConfig::new("localhost", 2333, ""),
        ] {
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
        assert!(NodeConfig::new("localhost", 2333, "pw").validate().is_ok());
    }

    #[test]
    fn display_name_defaults_to_address() {
        let config = NodeConfig::new("10.0.0.2", 2333, "pw");
        assert_eq!(config.display_name(), "10.0.0.2:2333");
        assert_eq!(config.with_name("eu-1").display_name(), "eu-1");
    }
}
