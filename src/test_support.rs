use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::{
    cluster::{Cluster, ClusterEvent, GuildRegistry},
    common::{
        errors::{ClientError, ClientResult},
        types::{GuildId, SessionId, UserId},
    },
    configs::{ClientConfig, NodeConfig},
    node::{Node, NodeContext, NodeRest},
    protocol::{
        gateway::GatewayPayload,
        info::Info,
        player::{PlayerInfo, PlayerState, PlayerUpdate, VoiceState},
        stats::Stats,
        tracks::{LoadResult, Track, TrackInfo},
    },
    voice::correlator::VoiceSessionCorrelator,
};

pub(crate) type GatewayRx = flume::Receiver<(GuildId, GatewayPayload)>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RestCall {
    UpdatePlayer {
        session_id: SessionId,
        guild_id: GuildId,
        update: PlayerUpdate,
        no_replace: bool,
    },
    GetPlayer(GuildId),
    DestroyPlayer(GuildId),
    LoadTracks(String),
    Stats,
}

/// In-memory node that records every call and keeps player state the way a
/// real node would echo it back.
#[derive(Default)]
pub(crate) struct RecordingRest {
    calls: Mutex<Vec<RestCall>>,
    players: Mutex<HashMap<GuildId, PlayerInfo>>,
    fail: AtomicBool,
    stats: Mutex<Stats>,
}

impl RecordingRest {
    pub fn calls(&self) -> Vec<RestCall> {
        self.calls.lock().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_stats(&self, stats: Stats) {
        *self.stats.lock() = stats;
    }

    /// Updates carrying a voice descriptor for the guild.
    pub fn connect_calls(&self, guild: &GuildId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| {
                matches!(call, RestCall::UpdatePlayer { guild_id, update, .. }
                    if guild_id == guild && update.voice.is_some())
            })
            .count()
    }

    pub fn destroy_calls(&self, guild: &GuildId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, RestCall::DestroyPlayer(g) if g == guild))
            .count()
    }

    fn check(&self, path: &str) -> ClientResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Rest {
                status: 500,
                message: "Internal Server Error".into(),
                path: path.into(),
            });
        }
        Ok(())
    }
}

pub(crate) fn track(encoded: &str) -> Track {
    Track {
        encoded: encoded.to_string(),
        info: TrackInfo {
            identifier: encoded.to_string(),
            title: encoded.to_string(),
            source_name: "http".into(),
            ..Default::default()
        },
        plugin_info: json!({}),
        user_data: json!({}),
    }
}

fn empty_player(guild_id: &GuildId) -> PlayerInfo {
    PlayerInfo {
        guild_id: guild_id.clone(),
        track: None,
        volume: 100,
        paused: false,
        state: PlayerState {
            time: 1,
            position: 0,
            connected: false,
            ping: -1,
        },
        voice: VoiceState::default(),
        filters: Default::default(),
    }
}

#[async_trait]
impl NodeRest for RecordingRest {
    async fn update_player(
        &self,
        session_id: &SessionId,
        guild_id: &GuildId,
        update: &PlayerUpdate,
        no_replace: bool,
    ) -> ClientResult<PlayerInfo> {
        self.calls.lock().push(RestCall::UpdatePlayer {
            session_id: session_id.clone(),
            guild_id: guild_id.clone(),
            update: update.clone(),
            no_replace,
        });
        self.check("/v4/sessions/players")?;

        let mut players = self.players.lock();
        let info = players
            .entry(guild_id.clone())
            .or_insert_with(|| empty_player(guild_id));

        if let Some(encoded) = update.track.as_ref().and_then(|t| t.encoded.clone()) {
            info.track = encoded.as_deref().map(track);
            info.state.position = 0;
        }
        if let Some(position) = update.position {
            info.state.position = position;
        }
        if let Some(volume) = update.volume {
            info.volume = volume;
        }
        if let Some(paused) = update.paused {
            info.paused = paused;
        }
        if let Some(filters) = &update.filters {
            info.filters = filters.clone();
        }
        if let Some(voice) = &update.voice {
            info.voice = voice.clone();
            info.state.connected = true;
        }
        Ok(info.clone())
    }

    async fn get_player(
        &self,
        _session_id: &SessionId,
        guild_id: &GuildId,
    ) -> ClientResult<PlayerInfo> {
        self.calls.lock().push(RestCall::GetPlayer(guild_id.clone()));
        self.check("/v4/sessions/players")?;
        self.players
            .lock()
            .get(guild_id)
            .cloned()
            .ok_or_else(|| ClientError::Rest {
                status: 404,
                message: "Player not found".into(),
                path: "/v4/sessions/players".into(),
            })
    }

    async fn destroy_player(&self, _session_id: &SessionId, guild_id: &GuildId) -> ClientResult<()> {
        self.calls
            .lock()
            .push(RestCall::DestroyPlayer(guild_id.clone()));
        self.check("/v4/sessions/players")?;
        self.players.lock().remove(guild_id);
        Ok(())
    }

    async fn load_tracks(&self, identifier: &str) -> ClientResult<LoadResult> {
        self.calls
            .lock()
            .push(RestCall::LoadTracks(identifier.to_string()));
        self.check("/v4/loadtracks")?;
        Ok(LoadResult::Search(vec![track(identifier)]))
    }

    async fn load_lyrics(&self, _encoded: &str, _language: Option<&str>) -> ClientResult<Value> {
        self.check("/v4/loadlyrics")?;
        Ok(json!({}))
    }

    async fn decode_track(&self, encoded: &str) -> ClientResult<Track> {
        self.check("/v4/decodetrack")?;
        Ok(track(encoded))
    }

    async fn decode_tracks(&self, encoded: &[String]) -> ClientResult<Vec<Track>> {
        self.check("/v4/decodetracks")?;
        Ok(encoded.iter().map(|e| track(e)).collect())
    }

    async fn stats(&self) -> ClientResult<Stats> {
        self.calls.lock().push(RestCall::Stats);
        self.check("/v4/stats")?;
        Ok(self.stats.lock().clone())
    }

    async fn info(&self) -> ClientResult<Info> {
        self.check("/v4/info")?;
        Err(ClientError::Rest {
            status: 404,
            message: "Not Found".into(),
            path: "/v4/info".into(),
        })
    }
}

pub(crate) fn recording_rest() -> Arc<RecordingRest> {
    Arc::new(RecordingRest::default())
}

pub(crate) fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new(1u64);
    config.client_name = "tester/1.0".into();
    config
}

pub(crate) fn test_context() -> (
    Arc<NodeContext>,
    broadcast::Receiver<ClusterEvent>,
    GatewayRx,
) {
    let (gateway_tx, gateway_rx) = flume::unbounded();
    let (events, events_rx) = broadcast::channel(64);
    let context = Arc::new(NodeContext {
        user_id: UserId(1),
        client_name: "tester/1.0".into(),
        gateway: Arc::new(gateway_tx),
        registry: Arc::new(GuildRegistry::default()),
        correlator: Arc::new(VoiceSessionCorrelator::new()),
        events,
        first_ready: AtomicBool::new(false),
    });
    (context, events_rx, gateway_rx)
}

pub(crate) fn test_cluster() -> (Cluster, GatewayRx) {
    let (gateway_tx, gateway_rx) = flume::unbounded();
    let cluster = match Cluster::new(test_config(), Arc::new(gateway_tx)) {
        Ok(cluster) => cluster,
        Err(e) => panic!("test cluster: {e}"),
    };
    (cluster, gateway_rx)
}

pub(crate) fn ready_frame(session_id: &str) -> String {
    json!({"op": "ready", "resumed": false, "sessionId": session_id}).to_string()
}

pub(crate) fn stats_frame(system_load: f64) -> String {
    json!({
        "op": "stats",
        "players": 0,
        "playingPlayers": 0,
        "uptime": 1000,
        "memory": {"free": 0, "used": 0, "allocated": 0, "reservable": 0},
        "cpu": {"cores": 4, "systemLoad": system_load, "lavalinkLoad": 0.0}
    })
    .to_string()
}

/// Registers a node under `host`, marks it ready and optionally feeds it a
/// stats frame with `load`.
pub(crate) fn add_ready_node(
    cluster: &Cluster,
    host: &str,
    load: Option<f64>,
) -> (Arc<Node>, Arc<RecordingRest>) {
    let rest = recording_rest();
    let node = match cluster.register(NodeConfig::new(host, 2333, "pw"), rest.clone()) {
        Ok(node) => node,
        Err(e) => panic!("register {host}: {e}"),
    };
    node.handle_text(&ready_frame(&format!("session-{host}")));
    if let Some(load) = load {
        node.handle_text(&stats_frame(load));
    }
    (node, rest)
}
