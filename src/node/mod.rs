pub mod connection;
pub mod rest;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cluster::{ClusterEvent, GuildRegistry},
    common::{
        errors::{ClientError, ClientResult},
        types::{ChannelId, GuildId, NodeKey, UserId},
    },
    configs::NodeConfig,
    player::Player,
    protocol::{
        gateway::GatewayPayload,
        info::Info,
        messages::IncomingMessage,
        stats::Stats,
        tracks::{LoadResult, Track},
    },
    voice::{correlator::VoiceSessionCorrelator, gateway::GatewaySender},
};

pub use connection::NodeState;
pub use rest::{NodeRest, RestClient};

use connection::ConnectionState;

/// Collaborators shared by every node of one cluster.
pub(crate) struct NodeContext {
    pub user_id: UserId,
    pub client_name: String,
    pub gateway: Arc<dyn GatewaySender>,
    pub registry: Arc<GuildRegistry>,
    pub correlator: Arc<VoiceSessionCorrelator>,
    pub events: broadcast::Sender<ClusterEvent>,
    pub first_ready: AtomicBool,
}

impl NodeContext {
    pub fn emit(&self, event: ClusterEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOptions {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub mute: bool,
    pub deaf: bool,
}

impl JoinOptions {
    pub fn new(guild_id: impl Into<GuildId>, channel_id: impl Into<ChannelId>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            mute: false,
            deaf: true,
        }
    }

    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    pub fn with_deaf(mut self, deaf: bool) -> Self {
        self.deaf = deaf;
        self
    }
}

/// One backend node: its socket, its session and the players it serves.
pub struct Node {
    key: NodeKey,
    name: String,
    config: NodeConfig,
    context: Arc<NodeContext>,
    connection: RwLock<ConnectionState>,
    stats: RwLock<Option<Stats>>,
    players: DashMap<GuildId, Arc<Player>>,
    rest: Arc<dyn NodeRest>,
    cancel: Mutex<CancellationToken>,
}

impl Node {
    pub(crate) fn new(
        key: NodeKey,
        config: NodeConfig,
        context: Arc<NodeContext>,
        rest: Arc<dyn NodeRest>,
    ) -> Self {
        Self {
            key,
            name: config.display_name(),
            config,
            context,
            connection: RwLock::new(ConnectionState::default()),
            stats: RwLock::new(None),
            players: DashMap::new(),
            rest,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn rest(&self) -> &Arc<dyn NodeRest> {
        &self.rest
    }

    /// Last stats pushed by the node or fetched over REST.
    pub fn stats(&self) -> Option<Stats> {
        self.stats.read().clone()
    }

    /// Load used for node selection. A node without stats counts as idle.
    pub fn system_load(&self) -> f64 {
        self.stats
            .read()
            .as_ref()
            .map(Stats::system_load)
            .unwrap_or(0.0)
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.players
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn player(&self, guild_id: &GuildId) -> Option<Arc<Player>> {
        self.players
            .get(guild_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Demultiplexes one socket frame. Never fails; bad frames are logged.
    pub(crate) fn handle_text(&self, text: &str) {
        let message = match serde_json::from_str::<IncomingMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Node {} sent an undecodable frame: {}", self.name, e);
                return;
            }
        };

        match message {
            IncomingMessage::Ready {
                resumed,
                session_id,
            } => {
                {
                    let mut connection = self.connection.write();
                    match connection.state {
                        NodeState::Ready => {
                            warn!("Node {} sent a second ready frame, ignored", self.name);
                            return;
                        }
                        NodeState::Closed => return,
                        NodeState::Disconnected | NodeState::Connecting => {}
                    }
                    connection.state = NodeState::Ready;
                    connection.session_id = Some(session_id.clone());
                }

                info!("Node {} ready with session {}", self.name, session_id);
                self.context.emit(ClusterEvent::NodeReady {
                    node: self.key,
                    session_id,
                    resumed,
                });
                if !self.context.first_ready.swap(true, Ordering::AcqRel) {
                    self.context.emit(ClusterEvent::Ready);
                }
            }
            IncomingMessage::Stats(stats) => {
                debug!(
                    "Node {} stats: players={}, load={:.2}",
                    self.name,
                    stats.players,
                    stats.system_load()
                );
                *self.stats.write() = Some(stats);
            }
            IncomingMessage::PlayerUpdate { guild_id, state } => match self.player(&guild_id) {
                Some(player) => player.handle_player_update(state),
                None => debug!("Dropping player update for unknown guild {}", guild_id),
            },
            IncomingMessage::Event(event) => {
                let Some(guild_id) = event.guild_id().cloned() else {
                    debug!("Dropping unknown event type from node {}", self.name);
                    return;
                };
                match self.player(&guild_id) {
                    Some(player) => player.handle_event(event),
                    None => debug!("Dropping event for unknown guild {}", guild_id),
                }
            }
        }
    }

    /// Asks the chat gateway to join a voice channel and opens a pending
    /// voice descriptor. The player turns `Connected` once both voice
    /// notifications have been dispatched to the cluster.
    pub async fn join_voice_channel(self: &Arc<Self>, options: JoinOptions) -> ClientResult<Arc<Player>> {
        self.require_session()?;
        let guild_id = options.guild_id.clone();

        if let Some(owner) = self
            .context
            .registry
            .owner(&guild_id)
            .filter(|owner| *owner != self.key)
        {
            return Err(ClientError::validation(format!(
                "guild {} is already served by node {}",
                guild_id, owner
            )));
        }

        let existing = self.player(&guild_id);
        let created = existing.is_none();
        let player = existing.unwrap_or_else(|| {
            let player = Arc::new(Player::new(
                guild_id.clone(),
                Arc::downgrade(self),
                self.name.clone(),
            ));
            self.players.insert(guild_id.clone(), Arc::clone(&player));
            player
        });

        self.context.registry.assign(guild_id.clone(), self.key);
        self.context.correlator.begin(guild_id.clone());
        player.mark_connecting();

        let payload = GatewayPayload::voice_state(
            &guild_id,
            Some(options.channel_id),
            options.mute,
            options.deaf,
        );
        if let Err(e) = self.context.gateway.send_payload(&guild_id, payload).await {
            warn!("Voice join for guild {} failed: {}", guild_id, e);
            self.context.correlator.discard(&guild_id);
            if created {
                self.forget(&guild_id);
            }
            return Err(e);
        }

        info!(
            "Joining channel {} in guild {} on node {}",
            options.channel_id, guild_id, self.name
        );
        Ok(player)
    }

    /// Destroys the remote player, leaves the voice channel and removes the
    /// guild everywhere. Local cleanup always happens; the first failure is
    /// returned.
    pub async fn leave_voice_channel(&self, guild_id: &GuildId) -> ClientResult<()> {
        if self.player(guild_id).is_none() {
            return Err(ClientError::PlayerNotFound(guild_id.clone()));
        }

        let mut result = Ok(());
        match self.require_session() {
            Ok(session_id) => {
                if let Err(e) = self.rest.destroy_player(&session_id, guild_id).await {
                    warn!("Remote destroy for guild {} failed: {}", guild_id, e);
                    result = Err(e);
                }
            }
            Err(e) => debug!("Skipping remote destroy for guild {}: {}", guild_id, e),
        }

        let payload = GatewayPayload::voice_state(guild_id, None, false, false);
        if let Err(e) = self.context.gateway.send_payload(guild_id, payload).await {
            warn!("Voice leave for guild {} failed: {}", guild_id, e);
            if result.is_ok() {
                result = Err(e);
            }
        }

        self.forget(guild_id);
        info!("Left voice in guild {} on node {}", guild_id, self.name);
        result
    }

    /// Removes every local trace of the guild.
    pub(crate) fn forget(&self, guild_id: &GuildId) {
        if let Some((_, player)) = self.players.remove(guild_id) {
            player.detach();
        }
        self.context.registry.release(guild_id, self.key);
        self.context.correlator.discard(guild_id);
    }

    /// Detaches and drops every player this node serves.
    pub(crate) fn forget_all(&self) {
        let guilds: Vec<GuildId> = self.players.iter().map(|e| e.key().clone()).collect();
        for guild_id in guilds {
            self.forget(&guild_id);
        }
    }

    pub async fn load_tracks(&self, identifier: &str) -> ClientResult<LoadResult> {
        if identifier.trim().is_empty() {
            return Err(ClientError::validation("identifier must not be empty"));
        }
        self.rest.load_tracks(identifier).await
    }

    pub async fn load_lyrics(&self, encoded: &str, language: Option<&str>) -> ClientResult<Value> {
        if encoded.is_empty() {
            return Err(ClientError::validation("no track provided"));
        }
        self.rest.load_lyrics(encoded, language).await
    }

    pub async fn decode_track(&self, encoded: &str) -> ClientResult<Track> {
        if encoded.is_empty() {
            return Err(ClientError::validation("no track provided"));
        }
        self.rest.decode_track(encoded).await
    }

    pub async fn decode_tracks(&self, encoded: &[String]) -> ClientResult<Vec<Track>> {
        if encoded.is_empty() {
            return Ok(Vec::new());
        }
        self.rest.decode_tracks(encoded).await
    }

    /// Fetches stats over REST and stores them as the current snapshot.
    pub async fn fetch_stats(&self) -> ClientResult<Stats> {
        let stats = self.rest.stats().await?;
        *self.stats.write() = Some(stats.clone());
        Ok(stats)
    }

    pub async fn info(&self) -> ClientResult<Info> {
        self.rest.info().await
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("players", &self.players.len())
            .finish()
    }
}
