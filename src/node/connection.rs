use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::HeaderValue,
        protocol::Message,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cluster::ClusterEvent,
    common::{
        errors::{ClientError, ClientResult},
        types::SessionId,
    },
    node::Node,
};

type NodeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Never connected.
    Disconnected,
    /// Socket opening or open, no `ready` frame yet.
    Connecting,
    /// Session id received; REST calls are valid.
    Ready,
    /// Socket closed, failed or torn down.
    Closed,
}

/// State of the current connection lifetime.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionState {
    pub state: NodeState,
    pub session_id: Option<SessionId>,
    /// Bumped by every `connect`; a reader task only closes its own lifetime.
    pub generation: u64,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            state: NodeState::Disconnected,
            session_id: None,
            generation: 0,
        }
    }
}

fn header_value(name: &str, value: &str) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::config(format!("{} header contains invalid characters", name)))
}

impl Node {
    fn handshake_request(&self) -> ClientResult<Request> {
        let mut request = self.config.ws_url().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            header_value("Authorization", &self.config.password)?,
        );
        headers.insert(
            "User-Id",
            header_value("User-Id", &self.context.user_id.to_string())?,
        );
        headers.insert(
            "Client-Name",
            header_value("Client-Name", &self.context.client_name)?,
        );
        Ok(request)
    }

    /// Opens the socket and starts the frame loop. Returns once the socket is
    /// open; the node turns `Ready` when the `ready` frame arrives.
    ///
    /// Calling this on a `Closed` node starts a new connection lifetime with
    /// no session id. Calling it while connecting or ready is a no-op.
    pub async fn connect(self: &Arc<Self>) -> ClientResult<()> {
        let (cancel, generation) = {
            let mut connection = self.connection.write();
            if matches!(connection.state, NodeState::Connecting | NodeState::Ready) {
                return Ok(());
            }
            let generation = connection.generation.wrapping_add(1);
            *connection = ConnectionState {
                state: NodeState::Connecting,
                session_id: None,
                generation,
            };
            let cancel = CancellationToken::new();
            *self.cancel.lock() = cancel.clone();
            (cancel, generation)
        };

        info!("Connecting to node {} at {}", self.name, self.config.ws_url());

        let socket = match self.open_socket().await {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Node {} connection failed: {}", self.name, e);
                if self.close_lifetime(generation) {
                    self.context.emit(ClusterEvent::NodeError {
                        node: self.key,
                        message: e.to_string(),
                    });
                }
                return Err(e);
            }
        };

        debug!("Socket open for node {}", self.name);
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let (code, reason) = node.run(socket, cancel).await;
            if !node.close_lifetime(generation) {
                debug!("Node {} superseded lifetime {} ended", node.name, generation);
                return;
            }
            info!("Node {} closed: code={:?}, reason='{}'", node.name, code, reason);
            node.context.emit(ClusterEvent::NodeClosed {
                node: node.key,
                code,
                reason,
            });
        });
        Ok(())
    }

    async fn open_socket(&self) -> ClientResult<NodeSocket> {
        let request = self.handshake_request()?;
        let (socket, _) = connect_async(request).await?;
        Ok(socket)
    }

    /// Reads frames in receipt order until the socket ends or the node is
    /// torn down. Returns the close code and reason.
    async fn run(&self, socket: NodeSocket, cancel: CancellationToken) -> (Option<u16>, String) {
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return (None, "destroyed".into());
                }
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            warn!("Node {} read error: {}", self.name, e);
                            return (None, e.to_string());
                        }
                        None => {
                            debug!("Node {} stream ended", self.name);
                            return (None, "stream ended".into());
                        }
                    };

                    match msg {
                        Message::Text(text) => self.handle_text(text.as_str()),
                        Message::Close(frame) => {
                            let (code, reason) = frame
                                .map(|cf| (cf.code.into(), cf.reason.to_string()))
                                .unwrap_or((1000u16, "No reason".into()));
                            return (Some(code), reason);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Closes the socket. Players stay addressable but their calls fail with
    /// [`ClientError::NodeClosed`].
    pub fn destroy(&self) {
        self.cancel.lock().cancel();
        self.mark_closed();
        info!("Node {} destroyed", self.name);
    }

    pub(crate) fn mark_closed(&self) {
        self.connection.write().state = NodeState::Closed;
    }

    /// Marks the node closed if `generation` is still the current lifetime.
    fn close_lifetime(&self, generation: u64) -> bool {
        let mut connection = self.connection.write();
        if connection.generation != generation {
            return false;
        }
        connection.state = NodeState::Closed;
        true
    }

    pub fn state(&self) -> NodeState {
        self.connection.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == NodeState::Ready
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.connection.read().session_id.clone()
    }

    /// The session id, or the reason no REST call can be made yet.
    pub fn require_session(&self) -> ClientResult<SessionId> {
        let connection = self.connection.read();
        match (connection.state, &connection.session_id) {
            (NodeState::Ready, Some(session_id)) => Ok(session_id.clone()),
            (NodeState::Closed, _) => Err(ClientError::NodeClosed {
                node: self.name.clone(),
            }),
            _ => Err(ClientError::NodeNotReady {
                node: self.name.clone(),
            }),
        }
    }
}
