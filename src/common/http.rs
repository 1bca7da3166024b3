use std::time::Duration;

use reqwest::Client;

use crate::common::errors::{ClientError, ClientResult};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub struct HttpClient;

impl HttpClient {
    pub fn default_user_agent() -> String {
        format!("rustalink-client/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Builds the client shared by every REST call to one node. The timeout
    /// bounds the whole request, so a hung node surfaces as a transport error.
    pub fn new(user_agent: &str, timeout_ms: u64) -> ClientResult<Client> {
        if timeout_ms == 0 {
            return Err(ClientError::config("rest timeout must be greater than zero"));
        }

        Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(ClientError::from)
    }
}
