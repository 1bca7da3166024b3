use serde::Deserialize;

use crate::{
    common::types::{GuildId, SessionId},
    protocol::{events::NodeEvent, player::PlayerState, stats::Stats},
};

/// Frames received from a node over its socket, decoded once at the socket
/// boundary and matched exhaustively afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum IncomingMessage {
    /// Handshake completed; carries the session id used by every REST call.
    #[serde(rename_all = "camelCase")]
    Ready {
        #[serde(default)]
        resumed: bool,
        session_id: SessionId,
    },
    /// Periodic position/ping heartbeat for one player.
    #[serde(rename_all = "camelCase")]
    PlayerUpdate { guild_id: GuildId, state: PlayerState },
    /// Node load statistics.
    Stats(Stats),
    /// Player lifecycle event.
    Event(NodeEvent),
}

impl IncomingMessage {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::PlayerUpdate { .. } => "playerUpdate",
            Self::Stats(_) => "stats",
            Self::Event(_) => "event",
        }
    }
}
