use std::sync::Arc;
use tokio::net::TcpStream;
use log::{info, error, warn, debug};

use crate::error::{ErrorCode, Result, WebNotifyError};
use crate::webnotify::config::PeerConfig;
use crate::webnotify::handler::NodeHandler;
use crate::webnotify::net::connection::Connection;
use crate::webnotify::transport::PeerSender;

/// Establishes connections to all known peers. Returns how many succeeded.
pub async fn connect_to_peers(peers: &[PeerConfig], handler: Arc<NodeHandler>) -> usize {
    info!("Connecting to {} known peers", peers.len());

    let mut connected = 0;
    for peer in peers {
        match connect_to_peer(peer, handler.clone()).await {
            Ok(_) => connected += 1,
            Err(e) => error!("Connection to node {} at {} failed: {}", peer.node_id, peer.addr, e),
        }
    }

    info!("Connected to {}/{} peers", connected, peers.len());
    connected
}

/// Dial one peer, register the connection for its node id and say hello
pub async fn connect_to_peer(peer: &PeerConfig, handler: Arc<NodeHandler>) -> Result<Arc<Connection>> {
    if handler.is_shut_down() {
        return Err(WebNotifyError::new(
            ErrorCode::SendFailed,
            format!("Node {} is shut down, not dialling node {}", handler.node_id, peer.node_id),
        ));
    }

    debug!("Attempting to connect to node {} at {}", peer.node_id, peer.addr);
    let stream = TcpStream::connect(&peer.addr).await?;

    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY for node {}: {}", peer.node_id, e);
    }
    info!("Connected to node {} at {}", peer.node_id, peer.addr);

    let connection = Connection::spawn(stream, handler.clone());
    connection.set_remote_node(peer.node_id);
    handler.peers.register(peer.node_id, connection.clone());

    connection.send(&handler.hello())?;
    info!("Hello sent to node {}", peer.node_id);

    Ok(connection)
}
