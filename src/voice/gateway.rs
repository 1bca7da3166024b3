use async_trait::async_trait;

use crate::{
    common::{
        errors::{ClientError, ClientResult},
        types::GuildId,
    },
    protocol::gateway::GatewayPayload,
};

/// Outbound half of the host's chat gateway connection. The host routes the
/// payload to the shard that owns `guild_id`.
#[async_trait]
pub trait GatewaySender: Send + Sync {
    async fn send_payload(&self, guild_id: &GuildId, payload: GatewayPayload) -> ClientResult<()>;
}

#[async_trait]
impl GatewaySender for flume::Sender<(GuildId, GatewayPayload)> {
    async fn send_payload(&self, guild_id: &GuildId, payload: GatewayPayload) -> ClientResult<()> {
        self.send_async((guild_id.clone(), payload))
            .await
            .map_err(|_| ClientError::Gateway {
                guild: guild_id.clone(),
                message: "gateway channel closed".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flume_sender_forwards_payloads() {
        let (tx, rx) = flume::unbounded();
        let guild = GuildId::from("42");
        tx.send_payload(&guild, GatewayPayload::voice_state(&guild, None, false, false))
            .await
            .unwrap();

        let (got_guild, payload) = rx.recv_async().await.unwrap();
        assert_eq!(got_guild, guild);
        assert_eq!(payload.op, 4);
    }

    #[tokio::test]
    async fn closed_channel_is_a_gateway_error() {
        let (tx, rx) = flume::unbounded::<(GuildId, GatewayPayload)>();
        drop(rx);
        let guild = GuildId::from("42");
        let err = tx
            .send_payload(&guild, GatewayPayload::voice_state(&guild, None, false, false))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Gateway { .. }));
    }
}
