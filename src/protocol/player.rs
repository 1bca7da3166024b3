use serde::{Deserialize, Serialize};

use crate::{
    common::types::GuildId,
    protocol::{filters::Filters, tracks::Track},
};

/// Full player state as returned by the player REST endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub guild_id: GuildId,
    pub track: Option<Track>,
    pub volume: u16,
    pub paused: bool,
    pub state: PlayerState,
    pub voice: VoiceState,
    #[serde(default)]
    pub filters: Filters,
}

/// Player connection state, pushed in `playerUpdate` frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Unix timestamp in milliseconds.
    pub time: u64,
    /// Playback position in milliseconds.
    #[serde(default)]
    pub position: u64,
    /// Whether the node is connected to the voice gateway.
    pub connected: bool,
    /// Voice gateway ping in milliseconds. -1 if not connected.
    pub ping: i64,
}

/// Voice connection descriptor as the node expects it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceState {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Request body for `PATCH /v4/sessions/{sessionId}/players/{guildId}`.
/// Only the fields that are `Some` are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<PlayerUpdateTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    /// `Some(None)` clears a previously set end time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Option<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceState>,
}

/// Track field in a player update request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateTrack {
    /// `Some(None)` serializes as `null`, which stops the player.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded: Option<Option<String>>,
    /// Identifier for the node to resolve. Mutually exclusive with `encoded`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<serde_json::Value>,
}

impl PlayerUpdateTrack {
    pub fn encoded(encoded: impl Into<String>) -> Self {
        Self {
            encoded: Some(Some(encoded.into())),
            ..Default::default()
        }
    }

    pub fn stop() -> Self {
        Self {
            encoded: Some(None),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_serializes_encoded_null() {
        let update = PlayerUpdate {
            track: Some(PlayerUpdateTrack::stop()),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"track": {"encoded": null}}));
    }

    #[test]
    fn unset_fields_are_omitted() {
        let update = PlayerUpdate {
            paused: Some(true),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"paused":true}"#
        );
    }

    #[test]
    fn voice_update_uses_camel_case() {
        let update = PlayerUpdate {
            voice: Some(VoiceState {
                token: "T".into(),
                endpoint: "E".into(),
                session_id: "S".into(),
                channel_id: None,
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"voice": {"token": "T", "endpoint": "E", "sessionId": "S"}})
        );
    }

    #[test]
    fn player_info_decodes_rest_response() {
        let info: PlayerInfo = serde_json::from_value(serde_json::json!({
            "guildId": "42",
            "track": null,
            "volume": 100,
            "paused": false,
            "state": {"time": 1500467109, "position": 0, "connected": true, "ping": 50},
            "voice": {"token": "T", "endpoint": "E", "sessionId": "S"},
            "filters": {}
        }))
        .unwrap();
        assert_eq!(info.guild_id, GuildId::from("42"));
        assert_eq!(info.volume, 100);
        assert!(info.state.connected);
        assert_eq!(info.voice.session_id, "S");
        assert!(info.filters.is_empty());
    }
}
