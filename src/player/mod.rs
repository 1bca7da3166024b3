pub mod events;
pub mod state;

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    common::{
        errors::{ClientError, ClientResult},
        types::{GuildId, SessionId},
    },
    node::Node,
    protocol::{
        events::{NodeEvent, TrackEndReason},
        filters::Filters,
        player::{PlayerInfo, PlayerState, PlayerUpdate, PlayerUpdateTrack},
    },
    voice::correlator::VoiceDescriptor,
};

pub use events::PlayerEvent;
pub use state::{MAX_VOLUME, PlayerCache, PlayerStatus, VoiceConnection};

const EVENT_CAPACITY: usize = 64;

/// Local handle for one guild's remote player.
///
/// Mutations update the cache before the node answers and reconcile with the
/// node's reply; a failed call restores the fields it touched. Commands for the
/// same guild are not serialized here, so callers that need strict ordering
/// must await each call before issuing the next.
pub struct Player {
    guild_id: GuildId,
    node: Weak<Node>,
    node_name: String,
    connection: Mutex<VoiceConnection>,
    cache: RwLock<PlayerCache>,
    events: Mutex<Option<broadcast::Sender<PlayerEvent>>>,
}

impl Player {
    pub(crate) fn new(guild_id: GuildId, node: Weak<Node>, node_name: String) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            guild_id,
            node,
            node_name,
            connection: Mutex::new(VoiceConnection::default()),
            cache: RwLock::new(PlayerCache::default()),
            events: Mutex::new(Some(tx)),
        }
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn node(&self) -> ClientResult<Arc<Node>> {
        self.node.upgrade().ok_or_else(|| ClientError::NodeClosed {
            node: self.node_name.clone(),
        })
    }

    fn session(&self) -> ClientResult<(Arc<Node>, SessionId)> {
        let node = self.node()?;
        let session_id = node.require_session()?;
        Ok((node, session_id))
    }

    /// Cached playback state. May lag behind the node.
    pub fn snapshot(&self) -> PlayerCache {
        self.cache.read().clone()
    }

    pub fn status(&self) -> PlayerStatus {
        self.cache.read().status
    }

    pub fn connection(&self) -> VoiceConnection {
        self.connection.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        match self.events.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub(crate) fn mark_connecting(&self) {
        let mut cache = self.cache.write();
        if !cache.status.is_active() {
            cache.status = PlayerStatus::Connecting;
        }
    }

    pub(crate) fn set_connection(&self, descriptor: VoiceDescriptor) {
        *self.connection.lock() = VoiceConnection::from(descriptor);
    }

    /// Sends the cached voice connection to the node.
    pub async fn connect(&self) -> ClientResult<PlayerInfo> {
        let voice = self
            .connection
            .lock()
            .to_voice_state()
            .ok_or_else(|| ClientError::IncompleteVoice(self.guild_id.clone()))?;
        let (node, session_id) = self.session()?;

        let update = PlayerUpdate {
            voice: Some(voice),
            ..Default::default()
        };
        let info = node
            .rest()
            .update_player(&session_id, &self.guild_id, &update, true)
            .await
            .inspect_err(|e| warn!("Voice connect failed for guild {}: {}", self.guild_id, e))?;

        let mut cache = self.cache.write();
        cache.reconcile(&info);
        if !cache.status.is_active() {
            cache.status = PlayerStatus::Connected;
        }
        debug!("Voice connected for guild {} on node {}", self.guild_id, self.node_name);
        Ok(info)
    }

    /// Sends an arbitrary update. Cache handling is the same as for the
    /// dedicated operations.
    pub async fn update(&self, update: PlayerUpdate, no_replace: bool) -> ClientResult<PlayerInfo> {
        let (node, session_id) = self.session()?;

        let snapshot = {
            let mut cache = self.cache.write();
            let snapshot = cache.clone();
            cache.apply_update(&update);
            snapshot
        };

        match node
            .rest()
            .update_player(&session_id, &self.guild_id, &update, no_replace)
            .await
        {
            Ok(info) => {
                self.cache.write().reconcile(&info);
                Ok(info)
            }
            Err(e) => {
                warn!("Player update failed for guild {}: {}", self.guild_id, e);
                self.cache.write().restore(&snapshot, &update);
                Err(e)
            }
        }
    }

    /// Starts `encoded`, replacing the current track.
    pub async fn play(&self, encoded: impl Into<String>) -> ClientResult<PlayerInfo> {
        let update = PlayerUpdate {
            track: Some(PlayerUpdateTrack::encoded(encoded)),
            ..Default::default()
        };
        self.update(update, false).await
    }

    pub async fn pause(&self) -> ClientResult<PlayerInfo> {
        self.set_paused(true).await
    }

    pub async fn resume(&self) -> ClientResult<PlayerInfo> {
        self.set_paused(false).await
    }

    pub async fn set_paused(&self, paused: bool) -> ClientResult<PlayerInfo> {
        let update = PlayerUpdate {
            paused: Some(paused),
            ..Default::default()
        };
        self.update(update, false).await
    }

    pub async fn stop(&self) -> ClientResult<PlayerInfo> {
        let update = PlayerUpdate {
            track: Some(PlayerUpdateTrack::stop()),
            ..Default::default()
        };
        self.update(update, false).await
    }

    pub async fn seek(&self, position_ms: u64) -> ClientResult<PlayerInfo> {
        let update = PlayerUpdate {
            position: Some(position_ms),
            ..Default::default()
        };
        self.update(update, false).await
    }

    /// Volume must lie in `0..1000`.
    pub async fn set_volume(&self, volume: i32) -> ClientResult<PlayerInfo> {
        if !(0..MAX_VOLUME).contains(&volume) {
            return Err(ClientError::validation(format!(
                "volume must be between 0 and {}, got {}",
                MAX_VOLUME - 1,
                volume
            )));
        }
        let update = PlayerUpdate {
            volume: Some(volume as u16),
            ..Default::default()
        };
        self.update(update, false).await
    }

    pub async fn set_filters(&self, filters: Filters) -> ClientResult<PlayerInfo> {
        let update = PlayerUpdate {
            filters: Some(filters),
            ..Default::default()
        };
        self.update(update, false).await
    }

    pub async fn clear_filters(&self) -> ClientResult<PlayerInfo> {
        self.set_filters(Filters::default()).await
    }

    /// Fetches the player from the node and refreshes the cache.
    pub async fn fetch(&self) -> ClientResult<PlayerInfo> {
        let (node, session_id) = self.session()?;
        let info = node.rest().get_player(&session_id, &self.guild_id).await?;
        self.cache.write().reconcile(&info);
        Ok(info)
    }

    /// Volume as reported by the node, not the cache.
    pub async fn get_volume(&self) -> ClientResult<u16> {
        self.fetch().await.map(|info| info.volume)
    }

    /// Filters as reported by the node, not the cache.
    pub async fn get_filters(&self) -> ClientResult<Filters> {
        self.fetch().await.map(|info| info.filters)
    }

    /// Leaves the voice channel and removes the player from its node.
    pub async fn destroy(&self) -> ClientResult<()> {
        self.node()?.leave_voice_channel(&self.guild_id).await
    }

    pub(crate) fn handle_event(&self, event: NodeEvent) {
        {
            let mut cache = self.cache.write();
            match &event {
                NodeEvent::TrackStart { track, .. } => {
                    cache.track = Some(track.clone());
                    cache.status = if cache.paused {
                        PlayerStatus::Paused
                    } else {
                        PlayerStatus::Playing
                    };
                }
                NodeEvent::TrackEnd { reason, .. } => {
                    if *reason != TrackEndReason::Replaced {
                        cache.track = None;
                        cache.status = PlayerStatus::Stopped;
                    }
                }
                NodeEvent::WebSocketClosed { .. } => {
                    cache.connected = false;
                }
                NodeEvent::TrackException { .. }
                | NodeEvent::TrackStuck { .. }
                | NodeEvent::Unknown => {}
            }
        }

        if let Some(event) = PlayerEvent::from_node_event(event) {
            self.emit(event);
        }
    }

    pub(crate) fn handle_player_update(&self, state: PlayerState) {
        self.cache.write().apply_state(state);
        self.emit(PlayerEvent::StateUpdate(state));
    }

    /// Drops the event channel; subscribers see it close.
    pub(crate) fn detach(&self) {
        self.events.lock().take();
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .field("node", &self.node_name)
            .field("status", &self.status())
            .finish()
    }
}
