use crate::protocol::{
    events::{NodeEvent, TrackEndReason, TrackException},
    player::PlayerState,
    tracks::Track,
};

/// Events a player re-emits to its subscribers. Node-assigned reasons and
/// codes are passed through untouched.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackStart {
        track: Track,
    },
    TrackEnd {
        track: Track,
        reason: TrackEndReason,
    },
    TrackException {
        track: Track,
        exception: TrackException,
    },
    TrackStuck {
        track: Track,
        threshold_ms: u64,
    },
    WebSocketClosed {
        code: u16,
        reason: String,
        by_remote: bool,
    },
    StateUpdate(PlayerState),
}

impl PlayerEvent {
    pub fn from_node_event(event: NodeEvent) -> Option<Self> {
        let event = match event {
            NodeEvent::TrackStart { track, .. } => Self::TrackStart { track },
            NodeEvent::TrackEnd { track, reason, .. } => Self::TrackEnd { track, reason },
            NodeEvent::TrackException {
                track, exception, ..
            } => Self::TrackException { track, exception },
            NodeEvent::TrackStuck {
                track,
                threshold_ms,
                ..
            } => Self::TrackStuck {
                track,
                threshold_ms,
            },
            NodeEvent::WebSocketClosed {
                code,
                reason,
                by_remote,
                ..
            } => Self::WebSocketClosed {
                code,
                reason,
                by_remote,
            },
            NodeEvent::Unknown => return None,
        };
        Some(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TrackStart { .. } => "trackStart",
            Self::TrackEnd { .. } => "trackEnd",
            Self::TrackException { .. } => "trackException",
            Self::TrackStuck { .. } => "trackStuck",
            Self::WebSocketClosed { .. } => "webSocketClosed",
            Self::StateUpdate(_) => "stateUpdate",
        }
    }
}
