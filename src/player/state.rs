use crate::{
    common::types::now_ms,
    protocol::{
        filters::Filters,
        player::{PlayerInfo, PlayerState, PlayerUpdate, VoiceState},
        tracks::Track,
    },
    voice::correlator::VoiceDescriptor,
};

pub const DEFAULT_VOLUME: u16 = 100;

/// Exclusive upper bound for player volume.
pub const MAX_VOLUME: i32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Created, no voice information yet.
    Idle,
    /// Join issued, waiting for the voice descriptor.
    Connecting,
    /// Voice descriptor applied on the node.
    Connected,
    Playing,
    Paused,
    Stopped,
}

impl PlayerStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Voice connection fields as last assigned to the player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceConnection {
    pub token: Option<String>,
    pub endpoint: Option<String>,
    pub session_id: Option<String>,
}

impl VoiceConnection {
    pub fn is_complete(&self) -> bool {
        self.token.is_some() && self.endpoint.is_some() && self.session_id.is_some()
    }

    pub fn to_voice_state(&self) -> Option<VoiceState> {
        Some(VoiceState {
            token: self.token.clone()?,
            endpoint: self.endpoint.clone()?,
            session_id: self.session_id.clone()?,
            channel_id: None,
        })
    }
}

impl From<VoiceDescriptor> for VoiceConnection {
    fn from(descriptor: VoiceDescriptor) -> Self {
        Self {
            token: Some(descriptor.token),
            endpoint: Some(descriptor.endpoint),
            session_id: Some(descriptor.session_id),
        }
    }
}

/// Last known playback state. A hint only; the node is authoritative.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerCache {
    pub status: PlayerStatus,
    pub track: Option<Track>,
    pub position: u64,
    pub paused: bool,
    pub volume: u16,
    pub filters: Filters,
    pub connected: bool,
    pub ping: i64,
    /// Node timestamp of the last state received, in milliseconds.
    pub time: u64,
}

impl Default for PlayerCache {
    fn default() -> Self {
        Self {
            status: PlayerStatus::Idle,
            track: None,
            position: 0,
            paused: false,
            volume: DEFAULT_VOLUME,
            filters: Filters::default(),
            connected: false,
            ping: -1,
            time: 0,
        }
    }
}

impl PlayerCache {
    /// Applies an outbound update before the node has confirmed it.
    pub fn apply_update(&mut self, update: &PlayerUpdate) {
        if let Some(paused) = update.paused {
            self.paused = paused;
            if self.status.is_active() {
                self.status = self.playing_status();
            }
        }
        if let Some(track) = &update.track {
            match &track.encoded {
                Some(None) => {
                    self.track = None;
                    self.position = 0;
                    self.status = PlayerStatus::Stopped;
                }
                Some(Some(_)) => {
                    self.position = update.position.unwrap_or(0);
                    self.status = self.playing_status();
                }
                None if track.identifier.is_some() => {
                    self.position = update.position.unwrap_or(0);
                    self.status = self.playing_status();
                }
                None => {}
            }
        }
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(volume) = update.volume {
            self.volume = volume;
        }
        if let Some(filters) = &update.filters {
            self.filters = filters.clone();
        }
    }

    /// Puts back the fields `update` touched, as they were in `snapshot`.
    pub fn restore(&mut self, snapshot: &PlayerCache, update: &PlayerUpdate) {
        self.status = snapshot.status;
        if update.track.is_some() {
            self.track = snapshot.track.clone();
            self.position = snapshot.position;
        }
        if update.position.is_some() {
            self.position = snapshot.position;
        }
        if update.paused.is_some() {
            self.paused = snapshot.paused;
        }
        if update.volume.is_some() {
            self.volume = snapshot.volume;
        }
        if update.filters.is_some() {
            self.filters = snapshot.filters.clone();
        }
    }

    /// Adopts the state the node reported back.
    pub fn reconcile(&mut self, info: &PlayerInfo) {
        self.track = info.track.clone();
        self.volume = info.volume;
        self.paused = info.paused;
        self.filters = info.filters.clone();
        self.apply_state(info.state);

        if self.track.is_some() {
            self.status = self.playing_status();
        } else if self.status.is_active() {
            self.status = PlayerStatus::Stopped;
        }
    }

    pub fn apply_state(&mut self, state: PlayerState) {
        self.position = state.position;
        self.connected = state.connected;
        self.ping = state.ping;
        self.time = if state.time == 0 { now_ms() } else { state.time };
    }

    fn playing_status(&self) -> PlayerStatus {
        if self.paused {
            PlayerStatus::Paused
        } else {
            PlayerStatus::Playing
        }
    }
}
