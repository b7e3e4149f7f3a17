use std::sync::Arc;
use log::{info, warn};
use tokio::net::TcpListener;

use crate::error::Result;
use crate::webnotify::handler::NodeHandler;
use crate::webnotify::net::connection::Connection;

/// Accept peer connections on an already bound listener
pub async fn serve(listener: TcpListener, handler: Arc<NodeHandler>) -> Result<()> {
    info!("Node {} listening on {}", handler.node_id, listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for connection from {}: {}", addr, e);
        }
        info!("New connection from {}", addr);

        // Registered as a peer once it says hello
        Connection::spawn(stream, handler.clone());
    }
}
