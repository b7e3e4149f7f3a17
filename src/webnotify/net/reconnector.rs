use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use log::{info, error, debug};

use crate::webnotify::config::PeerConfig;
use crate::webnotify::handler::NodeHandler;
use crate::webnotify::net::connector::connect_to_peer;
use crate::webnotify::types::NodeId;

/// Pause before the first check, leaves room for the initial connections
const STARTUP_GRACE: Duration = Duration::from_secs(5);

/// Starts a background task that periodically redials peers that have no
/// live connection.
pub fn start_reconnection_task(
    peers: Vec<PeerConfig>,
    handler: Arc<NodeHandler>,
    interval: Duration,
) -> JoinHandle<()> {
    info!("Starting peer reconnection task");

    tokio::spawn(async move {
        sleep(STARTUP_GRACE).await;

        loop {
            check_and_reconnect_peers(&peers, handler.clone()).await;
            sleep(interval).await;
        }
    })
}

async fn check_and_reconnect_peers(peers: &[PeerConfig], handler: Arc<NodeHandler>) {
    debug!("Checking for disconnected peers");

    for peer in peers {
        if handler.peers.contains(peer.node_id) {
            debug!("Node {} is already connected", peer.node_id);
            continue;
        }

        if should_attempt_reconnection(handler.node_id, peer.node_id) {
            info!("Attempting to reconnect to node {} at {}", peer.node_id, peer.addr);
            if let Err(e) = connect_to_peer(peer, handler.clone()).await {
                error!("Reconnection to node {} failed: {}", peer.node_id, e);
            }
        } else {
            debug!("Waiting for node {} to reconnect to us", peer.node_id);
        }
    }
}

/// The node with the lower id redials, so two nodes never race to
/// reconnect to each other
fn should_attempt_reconnection(self_id: NodeId, peer_id: NodeId) -> bool {
    self_id < peer_id
}
