use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{
    common::{
        errors::{ClientError, ClientResult, ErrorResponse},
        http::HttpClient,
        types::{GuildId, SessionId},
    },
    configs::{NodeConfig, RestConfig},
    protocol::{
        info::Info,
        player::{PlayerInfo, PlayerUpdate},
        stats::Stats,
        tracks::{LoadResult, Track},
    },
};

/// Request/response side of a node. Every call is independent; no state is
/// kept between calls besides the connection pool.
#[async_trait]
pub trait NodeRest: Send + Sync {
    async fn update_player(
        &self,
        session_id: &SessionId,
        guild_id: &GuildId,
        update: &PlayerUpdate,
        no_replace: bool,
    ) -> ClientResult<PlayerInfo>;

    async fn get_player(&self, session_id: &SessionId, guild_id: &GuildId)
    -> ClientResult<PlayerInfo>;

    async fn destroy_player(&self, session_id: &SessionId, guild_id: &GuildId) -> ClientResult<()>;

    async fn load_tracks(&self, identifier: &str) -> ClientResult<LoadResult>;

    async fn load_lyrics(&self, encoded: &str, language: Option<&str>) -> ClientResult<Value>;

    async fn decode_track(&self, encoded: &str) -> ClientResult<Track>;

    async fn decode_tracks(&self, encoded: &[String]) -> ClientResult<Vec<Track>>;

    async fn stats(&self) -> ClientResult<Stats>;

    async fn info(&self) -> ClientResult<Info>;
}

/// `reqwest` implementation against the node's `/v4` routes.
pub struct RestClient {
    client: Client,
    base_url: String,
    password: String,
}

impl RestClient {
    pub fn new(config: &NodeConfig, rest: &RestConfig, client_name: &str) -> ClientResult<Self> {
        Ok(Self {
            client: HttpClient::new(client_name, rest.timeout_ms)?,
            base_url: format!("{}/v4", config.http_url()),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", &self.password)
    }

    fn player_path(session_id: &SessionId, guild_id: &GuildId) -> String {
        format!("/sessions/{}/players/{}", session_id, guild_id)
    }

    async fn execute(&self, request: RequestBuilder, path: &str) -> ClientResult<Response> {
        let response = request.send().await.map_err(|e| transport_error(e, path))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("Node responded {} on {}: {}", status, path, body);
        Err(match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => error.into_error(path),
            Err(_) => ClientError::Rest {
                status: status.as_u16(),
                message: if body.is_empty() {
                    status.canonical_reason().unwrap_or_default().to_string()
                } else {
                    body
                },
                path: path.to_string(),
            },
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> ClientResult<T> {
        let response = self.execute(request, path).await?;
        let bytes = response.bytes().await.map_err(|e| transport_error(e, path))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn transport_error(err: reqwest::Error, path: &str) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout {
            path: path.to_string(),
        }
    } else {
        ClientError::Http(err)
    }
}

#[async_trait]
impl NodeRest for RestClient {
    async fn update_player(
        &self,
        session_id: &SessionId,
        guild_id: &GuildId,
        update: &PlayerUpdate,
        no_replace: bool,
    ) -> ClientResult<PlayerInfo> {
        let path = Self::player_path(session_id, guild_id);
        let request = self
            .request(Method::PATCH, &format!("{}?noReplace={}", path, no_replace))
            .json(update);
        self.json(request, &path).await
    }

    async fn get_player(
        &self,
        session_id: &SessionId,
        guild_id: &GuildId,
    ) -> ClientResult<PlayerInfo> {
        let path = Self::player_path(session_id, guild_id);
        self.json(self.request(Method::GET, &path), &path).await
    }

    async fn destroy_player(&self, session_id: &SessionId, guild_id: &GuildId) -> ClientResult<()> {
        let path = Self::player_path(session_id, guild_id);
        self.execute(self.request(Method::DELETE, &path), &path)
            .await
            .map(|_| ())
    }

    async fn load_tracks(&self, identifier: &str) -> ClientResult<LoadResult> {
        let path = "/loadtracks";
        let request = self.request(
            Method::GET,
            &format!("{}?identifier={}", path, urlencoding::encode(identifier)),
        );
        self.json(request, path).await
    }

    async fn load_lyrics(&self, encoded: &str, language: Option<&str>) -> ClientResult<Value> {
        let path = "/loadlyrics";
        let mut url = format!("{}?encodedTrack={}", path, urlencoding::encode(encoded));
        if let Some(language) = language.filter(|l| !l.is_empty()) {
            url.push_str("&language=");
            url.push_str(&urlencoding::encode(language));
        }
        self.json(self.request(Method::GET, &url), path).await
    }

    async fn decode_track(&self, encoded: &str) -> ClientResult<Track> {
        let path = "/decodetrack";
        let request = self.request(
            Method::GET,
            &format!("{}?encodedTrack={}", path, urlencoding::encode(encoded)),
        );
        self.json(request, path).await
    }

    async fn decode_tracks(&self, encoded: &[String]) -> ClientResult<Vec<Track>> {
        let path = "/decodetracks";
        self.json(self.request(Method::POST, path).json(encoded), path)
            .await
    }

    async fn stats(&self) -> ClientResult<Stats> {
        let path = "/stats";
        self.json(self.request(Method::GET, path), path).await
    }

    async fn info(&self) -> ClientResult<Info> {
        let path = "/info";
        self.json(self.request(Method::GET, path), path).await
    }
}
