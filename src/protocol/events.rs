use serde::Deserialize;

use crate::{
    common::types::GuildId,
    protocol::tracks::{Severity, Track},
};

/// Playback lifecycle events pushed by a node inside `event` frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum NodeEvent {
    #[serde(rename = "TrackStartEvent", rename_all = "camelCase")]
    TrackStart { guild_id: GuildId, track: Track },

    #[serde(rename = "TrackEndEvent", rename_all = "camelCase")]
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },

    #[serde(rename = "TrackExceptionEvent", rename_all = "camelCase")]
    TrackException {
        guild_id: GuildId,
        track: Track,
        exception: TrackException,
    },

    /// No audio frames for `threshold_ms`.
    #[serde(rename = "TrackStuckEvent", rename_all = "camelCase")]
    TrackStuck {
        guild_id: GuildId,
        track: Track,
        threshold_ms: u64,
    },

    /// The node's own voice gateway connection was closed.
    #[serde(rename = "WebSocketClosedEvent", rename_all = "camelCase")]
    WebSocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },

    /// Plugin or future event types. Carried so one unknown event does not
    /// poison the frame stream; it is logged and dropped.
    #[serde(other)]
    Unknown,
}

impl NodeEvent {
    pub fn guild_id(&self) -> Option<&GuildId> {
        match self {
            Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::WebSocketClosed { guild_id, .. } => Some(guild_id),
            Self::Unknown => None,
        }
    }
}

/// Reason a track ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Whether the host may start the next queued track.
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

/// Exception info for a failed track.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    pub message: Option<String>,
    pub severity: Severity,
    pub cause: String,
    #[serde(default)]
    pub cause_stack_trace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_reasons_decode_camel_case() {
        let reason: TrackEndReason = serde_json::from_str("\"loadFailed\"").unwrap();
        assert_eq!(reason, TrackEndReason::LoadFailed);
        assert!(reason.may_start_next());
        assert!(!TrackEndReason::Replaced.may_start_next());
    }

    #[test]
    fn websocket_closed_event_decodes() {
        let event: NodeEvent = serde_json::from_value(serde_json::json!({
            "type": "WebSocketClosedEvent",
            "guildId": "42",
            "code": 4006,
            "reason": "Your session is no longer valid.",
            "byRemote": true
        }))
        .unwrap();
        assert_eq!(event.guild_id(), Some(&GuildId::from("42")));
        assert!(matches!(
            event,
            NodeEvent::WebSocketClosed { code: 4006, by_remote: true, .. }
        ));
    }

    #[test]
    fn unknown_event_type_is_tolerated() {
        let event: NodeEvent = serde_json::from_value(serde_json::json!({
            "type": "LyricsFoundEvent",
            "guildId": "42",
            "lyrics": {}
        }))
        .unwrap();
        assert!(matches!(event, NodeEvent::Unknown));
        assert_eq!(event.guild_id(), None);
    }
}
