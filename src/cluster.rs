use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    common::{
        errors::{ClientError, ClientResult},
        types::{ChannelId, GuildId, NodeKey, SessionId, UserId},
    },
    configs::{ClientConfig, NodeConfig},
    node::{JoinOptions, Node, NodeContext, NodeRest, RestClient},
    player::Player,
    protocol::gateway::{GatewayEvent, RawGatewayEvent},
    voice::{correlator::VoiceSessionCorrelator, gateway::GatewaySender},
};

const EVENT_CAPACITY: usize = 256;

/// Node lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    NodeAdded {
        node: NodeKey,
        name: String,
    },
    NodeReady {
        node: NodeKey,
        session_id: SessionId,
        resumed: bool,
    },
    /// The first node of the cluster became ready. Sent once.
    Ready,
    NodeError {
        node: NodeKey,
        message: String,
    },
    NodeClosed {
        node: NodeKey,
        code: Option<u16>,
        reason: String,
    },
}

/// Authoritative guild to node ownership.
#[derive(Debug, Default)]
pub struct GuildRegistry {
    owners: DashMap<GuildId, NodeKey>,
}

impl GuildRegistry {
    pub fn assign(&self, guild_id: GuildId, node: NodeKey) {
        self.owners.insert(guild_id, node);
    }

    pub fn owner(&self, guild_id: &GuildId) -> Option<NodeKey> {
        self.owners.get(guild_id).map(|owner| *owner)
    }

    /// Removes the guild only if `node` still owns it.
    pub fn release(&self, guild_id: &GuildId, node: NodeKey) {
        self.owners.remove_if(guild_id, |_, owner| *owner == node);
    }

    pub fn release_node(&self, node: NodeKey) {
        self.owners.retain(|_, owner| *owner != node);
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn clear(&self) {
        self.owners.clear();
    }
}

/// Owns the nodes of one bot, picks nodes for new guilds and routes voice
/// notifications from the chat gateway to the right player.
pub struct Cluster {
    config: ClientConfig,
    nodes: RwLock<Vec<Arc<Node>>>,
    next_key: AtomicU32,
    context: Arc<NodeContext>,
}

impl Cluster {
    pub fn new(config: ClientConfig, gateway: Arc<dyn GatewaySender>) -> ClientResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let context = Arc::new(NodeContext {
            user_id: config.user_id,
            client_name: config.client_name.clone(),
            gateway,
            registry: Arc::new(GuildRegistry::default()),
            correlator: Arc::new(VoiceSessionCorrelator::new()),
            events,
            first_ready: AtomicBool::new(false),
        });

        Ok(Self {
            config,
            nodes: RwLock::new(Vec::new()),
            next_key: AtomicU32::new(0),
            context,
        })
    }

    /// Adds every node listed in the configuration. Needs a tokio runtime,
    /// see [`Cluster::add_node`].
    pub fn start(&self) -> ClientResult<Vec<Arc<Node>>> {
        self.config
            .nodes
            .clone()
            .into_iter()
            .map(|node| self.add_node(node))
            .collect()
    }

    pub fn user_id(&self) -> UserId {
        self.context.user_id
    }

    pub fn registry(&self) -> &GuildRegistry {
        &self.context.registry
    }

    pub fn correlator(&self) -> &VoiceSessionCorrelator {
        &self.context.correlator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.context.events.subscribe()
    }

    /// Registers the node and starts its socket in the background. A failed
    /// connection leaves the node listed as `Closed` and emits
    /// [`ClusterEvent::NodeError`].
    ///
    /// Must be called from within a tokio runtime; otherwise nothing is
    /// registered and a configuration error is returned.
    pub fn add_node(&self, config: NodeConfig) -> ClientResult<Arc<Node>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::config("adding a node requires a running tokio runtime"))?;
        config.validate()?;
        let rest = RestClient::new(&config, &self.config.rest, &self.config.client_name)?;
        let node = self.register(config, Arc::new(rest))?;

        let connecting = Arc::clone(&node);
        runtime.spawn(async move {
            let _ = connecting.connect().await;
        });
        Ok(node)
    }

    pub(crate) fn register(
        &self,
        config: NodeConfig,
        rest: Arc<dyn NodeRest>,
    ) -> ClientResult<Arc<Node>> {
        config.validate()?;
        let mut nodes = self.nodes.write();
        if nodes
            .iter()
            .any(|n| n.config().host == config.host && n.config().port == config.port)
        {
            return Err(ClientError::config(format!(
                "node {}:{} is already registered",
                config.host, config.port
            )));
        }

        let key = NodeKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        let node = Arc::new(Node::new(key, config, Arc::clone(&self.context), rest));
        nodes.push(Arc::clone(&node));
        drop(nodes);

        info!("Node {} added as {}", node.name(), key);
        self.context.emit(ClusterEvent::NodeAdded {
            node: key,
            name: node.name().to_string(),
        });
        Ok(node)
    }

    /// Closes the node's socket and drops it with all of its players.
    pub fn remove_node(&self, key: NodeKey) -> ClientResult<Arc<Node>> {
        let node = {
            let mut nodes = self.nodes.write();
            let index = nodes
                .iter()
                .position(|n| n.key() == key)
                .ok_or(ClientError::NodeNotFound(key))?;
            nodes.remove(index)
        };

        node.destroy();
        node.forget_all();
        self.context.registry.release_node(key);
        info!("Node {} removed", node.name());
        Ok(node)
    }

    /// Drops every node reference. Sockets and remote players are left as
    /// they are; call [`Node::destroy`] first to close them.
    pub fn purge(&self) {
        let removed = std::mem::take(&mut *self.nodes.write());
        self.context.registry.clear();
        debug!("Purged {} nodes", removed.len());
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().clone()
    }

    pub fn node(&self, key: NodeKey) -> Option<Arc<Node>> {
        self.nodes.read().iter().find(|n| n.key() == key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// The ready node with the lowest system load. Ties go to the node
    /// registered first.
    pub fn select_node(&self) -> Option<Arc<Node>> {
        let nodes = self.nodes.read();
        let mut best: Option<(&Arc<Node>, f64)> = None;
        for node in nodes.iter().filter(|n| n.is_ready()) {
            let load = node.system_load();
            let better = match best {
                None => true,
                Some((_, best_load)) => load < best_load,
            };
            if better {
                best = Some((node, load));
            }
        }
        best.map(|(node, _)| Arc::clone(node))
    }

    pub fn find_player(&self, guild_id: &GuildId) -> Option<Arc<Player>> {
        let owner = self.context.registry.owner(guild_id)?;
        self.node(owner)?.player(guild_id)
    }

    /// Joins on the guild's current node, or on the least loaded one.
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> ClientResult<Arc<Player>> {
        self.join_with(JoinOptions::new(guild_id, channel_id)).await
    }

    pub async fn join_with(&self, options: JoinOptions) -> ClientResult<Arc<Player>> {
        let node = match self
            .context
            .registry
            .owner(&options.guild_id)
            .and_then(|key| self.node(key))
        {
            Some(node) => node,
            None => self.select_node().ok_or(ClientError::NoNodeAvailable)?,
        };
        node.join_voice_channel(options).await
    }

    pub async fn leave(&self, guild_id: &GuildId) -> ClientResult<()> {
        let node = self
            .context
            .registry
            .owner(guild_id)
            .and_then(|key| self.node(key))
            .ok_or_else(|| ClientError::PlayerNotFound(guild_id.clone()))?;
        node.leave_voice_channel(guild_id).await
    }

    /// Feeds a chat gateway dispatch into voice correlation. Dispatches other
    /// than the two voice events are ignored. When a guild's voice descriptor
    /// completes, its player connects before this returns.
    pub async fn dispatch_raw(&self, event: RawGatewayEvent) -> ClientResult<()> {
        let parsed = event.parse().map_err(|e| {
            warn!("Malformed voice dispatch from the chat gateway: {}", e);
            ClientError::validation(format!("malformed voice dispatch: {}", e))
        })?;
        let completed = match parsed {
            None => return Ok(()),
            Some(GatewayEvent::VoiceServerUpdate(update)) => {
                let guild_id = update.guild_id.clone();
                self.context
                    .correlator
                    .on_voice_server_update(update)
                    .map(|descriptor| (guild_id, descriptor))
            }
            Some(GatewayEvent::VoiceStateUpdate(update)) => {
                let guild_id = update.guild_id.clone();
                self.context
                    .correlator
                    .on_voice_state_update(self.context.user_id, update)
                    .zip(guild_id)
                    .map(|(descriptor, guild_id)| (guild_id, descriptor))
            }
        };

        let Some((guild_id, descriptor)) = completed else {
            return Ok(());
        };
        let Some(player) = self.find_player(&guild_id) else {
            debug!("Discarding voice descriptor for guild {} without a player", guild_id);
            return Ok(());
        };

        player.set_connection(descriptor);
        player.connect().await.map(|_| ())
    }
}
