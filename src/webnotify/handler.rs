use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::tlv::message::TLVMessage;
use crate::tlv::types::{EventType, FieldType};
use crate::webnotify::clock::Clock;
use crate::webnotify::message::WebNotifyMessage;
use crate::webnotify::registry::{RegistryOptions, WebNotifyRegistry};
use crate::webnotify::sessions::{LocalSessions, SessionRegistry};
use crate::webnotify::store::SubscriptionStore;
use crate::webnotify::transport::{NodeTransport, PeerRegistry, PeerSender};
use crate::webnotify::types::NodeId;

/// Everything one cluster node needs: its peer connections, the shared
/// registry and the web sessions it hosts.
pub struct NodeHandler {
    pub node_id: NodeId,
    pub peers: Arc<PeerRegistry>,
    pub registry: Arc<WebNotifyRegistry>,
    pub sessions: Arc<SessionRegistry>,
    shutdown: CancellationToken,
}

impl NodeHandler {
    pub fn new(
        node_id: NodeId,
        store: Arc<dyn SubscriptionStore>,
        clock: Arc<dyn Clock>,
        options: RegistryOptions,
    ) -> Self {
        let peers = Arc::new(PeerRegistry::new());
        let local = Arc::new(LocalSessions::new());
        let transport = Arc::new(NodeTransport::new(node_id, peers.clone(), local.clone()));
        let registry = Arc::new(WebNotifyRegistry::new(store, transport, clock, options));
        let sessions = Arc::new(SessionRegistry::with_local(node_id, registry.clone(), local));

        Self {
            node_id,
            peers,
            registry,
            sessions,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token for one connection, cancelled together with the node
    pub fn connection_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Close every connection of this node
    pub fn shutdown(&self) {
        info!("Closing all connections of node {}", self.node_id);
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Our own handshake frame
    pub fn hello(&self) -> TLVMessage {
        let mut msg = TLVMessage::new(EventType::Hello);
        msg.insert_u64(FieldType::NodeId, self.node_id);
        msg
    }

    /// A peer announced itself on `connection`. Returns the announced node id.
    pub fn handle_hello(&self, msg: &TLVMessage, connection: Arc<dyn PeerSender>) -> Result<NodeId> {
        let remote = msg.require_u64(FieldType::NodeId)?;
        if remote == self.node_id {
            warn!("Peer announced our own node id {}", remote);
        }

        info!("Node {} said hello", remote);
        self.peers.register(remote, connection);
        Ok(remote)
    }

    /// A notification for sessions hosted here arrived from another node
    pub fn handle_web_notify(&self, msg: &TLVMessage) -> Result<usize> {
        let notification = WebNotifyMessage::from_tlv(msg)?;
        debug!("Incoming notification for user {}", notification.user_uid);

        let delivered = self.sessions.deliver(&notification);
        if delivered == 0 {
            debug!("User {} has no open sessions on node {}", notification.user_uid, self.node_id);
        }
        Ok(delivered)
    }
}
