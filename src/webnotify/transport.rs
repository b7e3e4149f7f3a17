use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};

use crate::error::{ErrorCode, Result, WebNotifyError};
use crate::tlv::message::TLVMessage;
use crate::webnotify::message::WebNotifyMessage;
use crate::webnotify::sessions::LocalSessions;
use crate::webnotify::types::NodeId;

/// Point-to-point delivery of a notification to one cluster node
pub trait MessagingTransport: Send + Sync {
    fn send_to_node(&self, node: NodeId, msg: &WebNotifyMessage) -> Result<()>;
}

/// A connection to a peer node
pub trait PeerSender: Send + Sync {
    fn send(&self, msg: &TLVMessage) -> Result<()>;

    /// Distinguishes connections to the same node
    fn connection_id(&self) -> u128;
}

/// Registry of live connections to other nodes, keyed by node id
#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<NodeId, Arc<dyn PeerSender>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Registers `sender` for `node`, replacing any older connection
    pub fn register(&self, node: NodeId, sender: Arc<dyn PeerSender>) {
        info!("Registering peer node {}", node);
        self.peers.insert(node, sender);
    }

    /// Unregisters `node` only if it is still served by `connection_id`.
    /// A reconnect may already have put a newer connection in place.
    pub fn unregister_connection(&self, node: NodeId, connection_id: u128) -> bool {
        let removed = self
            .peers
            .remove_if(&node, |_, sender| sender.connection_id() == connection_id)
            .is_some();
        if removed {
            info!("Unregistered peer node {} after its connection closed", node);
        } else {
            debug!("Peer node {} already served by another connection", node);
        }
        removed
    }

    pub fn get(&self, node: NodeId) -> Option<Arc<dyn PeerSender>> {
        self.peers.get(&node).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.peers.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Send a raw frame to a specific peer
    pub fn send_to(&self, node: NodeId, msg: &TLVMessage) -> Result<()> {
        debug!("Attempting to send {:?} to node {}", msg.event_type, node);
        // Clone the sender out so no shard lock is held while sending
        match self.get(node) {
            Some(sender) => sender.send(msg),
            None => {
                warn!("Failed to send message: no connection to node {}", node);
                Err(WebNotifyError::new(
                    ErrorCode::PeerNotFound,
                    format!("No connection to node {}", node),
                ))
            }
        }
    }
}

impl MessagingTransport for PeerRegistry {
    fn send_to_node(&self, node: NodeId, msg: &WebNotifyMessage) -> Result<()> {
        self.send_to(node, &msg.to_tlv())
    }
}

/// Transport of one node: sends addressed to the node itself go straight to
/// its own sessions, everything else goes out over the peer connections.
pub struct NodeTransport {
    node_id: NodeId,
    peers: Arc<PeerRegistry>,
    local: Arc<LocalSessions>,
}

impl NodeTransport {
    pub fn new(node_id: NodeId, peers: Arc<PeerRegistry>, local: Arc<LocalSessions>) -> Self {
        Self { node_id, peers, local }
    }
}

impl MessagingTransport for NodeTransport {
    fn send_to_node(&self, node: NodeId, msg: &WebNotifyMessage) -> Result<()> {
        if node == self.node_id {
            let delivered = self.local.deliver(msg);
            debug!("Notification for user {} pushed to {} local sessions", msg.user_uid, delivered);
            return Ok(());
        }
        self.peers.send_to_node(node, msg)
    }
}
