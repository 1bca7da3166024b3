pub mod cluster;
pub mod common;
pub mod configs;
pub mod node;
pub mod player;
pub mod protocol;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_support;

pub use cluster::{Cluster, ClusterEvent, GuildRegistry};
pub use common::{ClientError, ClientResult, ErrorKind};
pub use configs::{ClientConfig, NodeConfig};
pub use node::{JoinOptions, Node, NodeState};
pub use player::{Player, PlayerEvent, PlayerStatus};
pub use voice::{GatewaySender, VoiceSessionCorrelator};
