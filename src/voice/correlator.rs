use dashmap::{DashMap, mapref::entry::Entry};
use tracing::debug;

use crate::{
    common::types::{GuildId, UserId},
    protocol::gateway::{VoiceServerUpdate, VoiceStateUpdate},
};

/// A complete voice connection descriptor, ready to hand to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDescriptor {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

/// Partially assembled descriptor for a guild that asked to join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingVoice {
    pub token: Option<String>,
    pub endpoint: Option<String>,
    pub session_id: Option<String>,
}

impl PendingVoice {
    pub fn is_complete(&self) -> bool {
        self.token.is_some() && self.endpoint.is_some() && self.session_id.is_some()
    }

    fn take_complete(&mut self) -> Option<VoiceDescriptor> {
        if !self.is_complete() {
            return None;
        }
        Some(VoiceDescriptor {
            token: self.token.take()?,
            endpoint: self.endpoint.take()?,
            session_id: self.session_id.take()?,
        })
    }
}

/// Merges the two voice notifications of the chat gateway into one
/// descriptor per guild.
///
/// Every update runs read, merge, completeness check and removal under the
/// guild's entry lock, so two updates for the same guild never interleave.
/// A descriptor is returned at most once; the entry is gone afterwards.
#[derive(Debug, Default)]
pub struct VoiceSessionCorrelator {
    pending: DashMap<GuildId, PendingVoice>,
}

impl VoiceSessionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an empty descriptor for a guild that is about to join.
    /// An existing descriptor is left as is.
    pub fn begin(&self, guild_id: GuildId) {
        self.pending.entry(guild_id).or_default();
    }

    /// Drops whatever was assembled for the guild.
    pub fn discard(&self, guild_id: &GuildId) -> Option<PendingVoice> {
        self.pending.remove(guild_id).map(|(_, pending)| pending)
    }

    pub fn pending(&self, guild_id: &GuildId) -> Option<PendingVoice> {
        self.pending.get(guild_id).map(|pending| pending.clone())
    }

    pub fn is_pending(&self, guild_id: &GuildId) -> bool {
        self.pending.contains_key(guild_id)
    }

    pub fn on_voice_server_update(&self, update: VoiceServerUpdate) -> Option<VoiceDescriptor> {
        let Entry::Occupied(mut entry) = self.pending.entry(update.guild_id) else {
            debug!("Ignoring voice server update for a guild that is not joining");
            return None;
        };

        let pending = entry.get_mut();
        pending.token = Some(update.token);
        pending.endpoint = update.endpoint;

        let descriptor = pending.take_complete();
        if descriptor.is_some() {
            debug!("Voice descriptor complete for guild {}", entry.key());
            entry.remove();
        }
        descriptor
    }

    /// Only updates about `self_id` are considered. A null channel means the
    /// bot left and discards the pending descriptor.
    pub fn on_voice_state_update(
        &self,
        self_id: UserId,
        update: VoiceStateUpdate,
    ) -> Option<VoiceDescriptor> {
        if update.member_id() != Some(self_id) {
            return None;
        }
        let guild_id = update.guild_id?;

        if update.channel_id.is_none() {
            if self.pending.remove(&guild_id).is_some() {
                debug!("Voice channel left for guild {}, descriptor discarded", guild_id);
            }
            return None;
        }

        let Entry::Occupied(mut entry) = self.pending.entry(guild_id) else {
            debug!("Ignoring voice state update for a guild that is not joining");
            return None;
        };

        let pending = entry.get_mut();
        if pending.session_id.as_deref() == Some(update.session_id.as_str()) {
            debug!("Duplicate voice session for guild {}", entry.key());
            return None;
        }
        pending.session_id = Some(update.session_id);

        let descriptor = pending.take_complete();
        if descriptor.is_some() {
            debug!("Voice descriptor complete for guild {}", entry.key());
            entry.remove();
        }
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ChannelId;

    const BOT: UserId = UserId(1);

    fn server(guild: &str, token: &str, endpoint: Option<&str>) -> VoiceServerUpdate {
        VoiceServerUpdate {
            guild_id: GuildId::from(guild),
            token: token.into(),
            endpoint: endpoint.map(Into::into),
        }
    }

    fn state(guild: &str, user: UserId, session: &str, channel: Option<u64>) -> VoiceStateUpdate {
        VoiceStateUpdate {
            guild_id: Some(GuildId::from(guild)),
            user_id: Some(user),
            member: None,
            session_id: session.into(),
            channel_id: channel.map(ChannelId),
        }
    }

    fn expected() -> VoiceDescriptor {
        VoiceDescriptor {
            token: "T".into(),
            endpoint: "E".into(),
            session_id: "S".into(),
        }
    }

    #[test]
    fn server_then_state_completes_once() {
        let correlator = VoiceSessionCorrelator::new();
        correlator.begin(GuildId::from("42"));

        assert_eq!(
            correlator.on_voice_server_update(server("42", "T", Some("E"))),
            None
        );
        assert_eq!(
            correlator.on_voice_state_update(BOT, state("42", BOT, "S", Some(7))),
            Some(expected())
        );
        assert!(!correlator.is_pending(&GuildId::from("42")));
    }

    #[test]
    fn state_then_server_completes_once() {
        let correlator = VoiceSessionCorrelator::new();
        correlator.begin(GuildId::from("42"));

        assert_eq!(
            correlator.on_voice_state_update(BOT, state("42", BOT, "S", Some(7))),
            None
        );
        assert_eq!(
            correlator.on_voice_server_update(server("42", "T", Some("E"))),
            Some(expected())
        );
        assert_eq!(
            correlator.on_voice_server_update(server("42", "T", Some("E"))),
            None
        );
    }

    #[test]
    fn null_channel_discards_and_blocks_late_server_update() {
        let correlator = VoiceSessionCorrelator::new();
        correlator.begin(GuildId::from("42"));
        correlator.on_voice_state_update(BOT, state("42", BOT, "S", Some(7)));

        assert_eq!(
            correlator.on_voice_state_update(BOT, state("42", BOT, "S", None)),
            None
        );
        assert_eq!(
            correlator.on_voice_server_update(server("42", "T", Some("E"))),
            None
        );
    }

    #[test]
    fn duplicate_session_id_is_a_no_op() {
        let correlator = VoiceSessionCorrelator::new();
        correlator.begin(GuildId::from("42"));
        correlator.on_voice_state_update(BOT, state("42", BOT, "S", Some(7)));
        let before = correlator.pending(&GuildId::from("42"));

        assert_eq!(
            correlator.on_voice_state_update(BOT, state("42", BOT, "S", Some(7))),
            None
        );
        assert_eq!(correlator.pending(&GuildId::from("42")), before);
    }

    #[test]
    fn updates_for_other_members_are_ignored() {
        let correlator = VoiceSessionCorrelator::new();
        correlator.begin(GuildId::from("42"));
        correlator.on_voice_server_update(server("42", "T", Some("E")));

        assert_eq!(
            correlator.on_voice_state_update(BOT, state("42", UserId(2), "S", Some(7))),
            None
        );
        assert_eq!(
            correlator.pending(&GuildId::from("42")).and_then(|p| p.session_id),
            None
        );
    }

    #[test]
    fn unknown_guild_is_ignored() {
        let correlator = VoiceSessionCorrelator::new();
        assert_eq!(
            correlator.on_voice_server_update(server("42", "T", Some("E"))),
            None
        );
        assert_eq!(
            correlator.on_voice_state_update(BOT, state("42", BOT, "S", Some(7))),
            None
        );
        assert!(!correlator.is_pending(&GuildId::from("42")));
    }

    #[test]
    fn null_endpoint_keeps_descriptor_incomplete() {
        let correlator = VoiceSessionCorrelator::new();
        correlator.begin(GuildId::from("42"));
        correlator.on_voice_state_update(BOT, state("42", BOT, "S", Some(7)));

        assert_eq!(correlator.on_voice_server_update(server("42", "T", None)), None);
        assert_eq!(
            correlator.on_voice_server_update(server("42", "T", Some("E"))),
            Some(expected())
        );
    }

    #[test]
    fn guilds_are_independent() {
        let correlator = VoiceSessionCorrelator::new();
        correlator.begin(GuildId::from("1"));
        correlator.begin(GuildId::from("2"));
        correlator.on_voice_server_update(server("1", "T", Some("E")));

        assert_eq!(
            correlator.on_voice_state_update(BOT, state("2", BOT, "S", Some(7))),
            None
        );
        assert!(correlator.on_voice_state_update(BOT, state("1", BOT, "S", Some(7))).is_some());
        assert!(correlator.is_pending(&GuildId::from("2")));
    }

    #[test]
    fn concurrent_halves_complete_exactly_once() {
        let correlator = VoiceSessionCorrelator::new();
        let guild = GuildId::from("42");

        for round in 0..500 {
            correlator.begin(guild.clone());
            let session = format!("S{round}");

            let (from_server, from_state) = std::thread::scope(|scope| {
                let server_half =
                    scope.spawn(|| correlator.on_voice_server_update(server("42", "T", Some("E"))));
                let state_half = scope
                    .spawn(|| correlator.on_voice_state_update(BOT, state("42", BOT, &session, Some(7))));
                (server_half.join().unwrap(), state_half.join().unwrap())
            });

            let descriptor = match (from_server, from_state) {
                (Some(descriptor), None) | (None, Some(descriptor)) => descriptor,
                other => panic!("round {round}: expected one descriptor, got {other:?}"),
            };
            assert_eq!(descriptor.token, "T");
            assert_eq!(descriptor.endpoint, "E");
            assert_eq!(descriptor.session_id, session);
            assert!(!correlator.is_pending(&guild));
        }
    }
}
