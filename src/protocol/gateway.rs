use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::types::{ChannelId, GuildId, UserId};

pub const VOICE_SERVER_UPDATE: &str = "VOICE_SERVER_UPDATE";
pub const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";

/// Voice state update opcode on the chat gateway.
pub const OP_VOICE_STATE: u8 = 4;

/// A dispatch forwarded verbatim from the host's chat gateway connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGatewayEvent {
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub d: Value,
}

impl RawGatewayEvent {
    pub fn new(t: impl Into<String>, d: Value) -> Self {
        Self {
            t: Some(t.into()),
            d,
        }
    }

    /// Decodes the dispatch if it is one of the two voice events.
    /// Anything else, including a missing type, yields `Ok(None)`.
    pub fn parse(&self) -> Result<Option<GatewayEvent>, serde_json::Error> {
        let Some(t) = self.t.as_deref() else {
            return Ok(None);
        };
        let event = match t {
            VOICE_SERVER_UPDATE => {
                GatewayEvent::VoiceServerUpdate(VoiceServerUpdate::deserialize(&self.d)?)
            }
            VOICE_STATE_UPDATE => {
                GatewayEvent::VoiceStateUpdate(VoiceStateUpdate::deserialize(&self.d)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    VoiceServerUpdate(VoiceServerUpdate),
    VoiceStateUpdate(VoiceStateUpdate),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceServerUpdate {
    pub guild_id: GuildId,
    pub token: String,
    /// Null while the voice server is being reallocated.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceStateUpdate {
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub member: Option<VoiceStateMember>,
    pub session_id: String,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
}

impl VoiceStateUpdate {
    /// The member the update is about, from `user_id` or the nested member.
    pub fn member_id(&self) -> Option<UserId> {
        self.user_id
            .or_else(|| self.member.as_ref().map(|member| member.user.id))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceStateMember {
    pub user: VoiceStateUser,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceStateUser {
    pub id: UserId,
}

/// An outbound chat gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    pub d: Value,
}

impl GatewayPayload {
    /// Op 4: join `channel_id`, or leave voice when it is `None`.
    pub fn voice_state(
        guild_id: &GuildId,
        channel_id: Option<ChannelId>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Self {
        Self {
            op: OP_VOICE_STATE,
            d: serde_json::json!({
                "guild_id": guild_id,
                "channel_id": channel_id,
                "self_mute": self_mute,
                "self_deaf": self_deaf,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_voice_server_update() {
        let raw = RawGatewayEvent::new(
            VOICE_SERVER_UPDATE,
            json!({"guild_id": "42", "token": "T", "endpoint": "E"}),
        );
        let event = raw.parse().unwrap().unwrap();
        assert_eq!(
            event,
            GatewayEvent::VoiceServerUpdate(VoiceServerUpdate {
                guild_id: GuildId::from("42"),
                token: "T".into(),
                endpoint: Some("E".into()),
            })
        );
    }

    #[test]
    fn voice_state_member_falls_back_to_nested_user() {
        let raw = RawGatewayEvent::new(
            VOICE_STATE_UPDATE,
            json!({
                "guild_id": "42",
                "member": {"user": {"id": "99"}},
                "session_id": "S",
                "channel_id": "7"
            }),
        );
        match raw.parse().unwrap() {
            Some(GatewayEvent::VoiceStateUpdate(update)) => {
                assert_eq!(update.member_id(), Some(UserId(99)));
                assert_eq!(update.channel_id, Some(ChannelId(7)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_dispatches_are_ignored() {
        let raw = RawGatewayEvent::new("MESSAGE_CREATE", json!({"content": "hi"}));
        assert_eq!(raw.parse().unwrap(), None);

        let untyped: RawGatewayEvent = serde_json::from_str(r#"{"op":11,"d":null}"#).unwrap();
        assert_eq!(untyped.parse().unwrap(), None);
    }

    #[test]
    fn malformed_voice_event_is_an_error() {
        let raw = RawGatewayEvent::new(VOICE_SERVER_UPDATE, json!({"guild_id": "42"}));
        assert!(raw.parse().is_err());
    }

    #[test]
    fn leave_payload_has_null_channel() {
        let payload = GatewayPayload::voice_state(&GuildId::from("42"), None, false, true);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "op": 4,
                "d": {"guild_id": "42", "channel_id": null, "self_mute": false, "self_deaf": true}
            })
        );
    }
}
