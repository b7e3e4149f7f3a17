pub mod clock;
pub mod config;
pub mod handler;
pub mod message;
pub mod net;
pub mod notify;
pub mod optimistic;
pub mod registry;
pub mod sessions;
pub mod store;
pub mod subscribe;
pub mod subscription;
pub mod transport;
pub mod types;
pub mod unsubscribe;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::Result;
use clock::SystemClock;
use config::NodeConfig;
use handler::NodeHandler;
use net::connector::connect_to_peers;
use net::reconnector::start_reconnection_task;
use net::server::serve;
use store::SubscriptionStore;

/// How often missing peer connections are redialled
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// A started node: its handler plus the background tasks serving it
pub struct RunningNode {
    pub handler: Arc<NodeHandler>,
    pub local_addr: SocketAddr,
    server: JoinHandle<()>,
    reconnector: JoinHandle<()>,
}

impl RunningNode {
    /// Stop accepting and redialling, then close every open connection
    pub fn shutdown(&self) {
        info!("Shutting down node {}", self.handler.node_id);
        self.server.abort();
        self.reconnector.abort();
        self.handler.shutdown();
    }
}

/// Bind the listener, dial the configured peers and keep serving in the
/// background. `store` is the cluster-shared subscription space.
pub async fn start(config: NodeConfig, store: Arc<dyn SubscriptionStore>) -> Result<RunningNode> {
    config.validate()?;

    let handler = Arc::new(NodeHandler::new(
        config.node_id,
        store,
        Arc::new(SystemClock),
        config.registry_options(),
    ));

    // Listen before dialling so peers dialling us back find the port open
    let listener = TcpListener::bind(&config.addr).await?;
    let local_addr = listener.local_addr()?;

    let server_handler = handler.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = serve(listener, server_handler).await {
            error!("Node server stopped: {}", e);
        }
    });

    connect_to_peers(&config.peers, handler.clone()).await;
    let reconnector = start_reconnection_task(config.peers.clone(), handler.clone(), RECONNECT_INTERVAL);

    info!("Node {} started on {}", config.node_id, local_addr);
    Ok(RunningNode {
        handler,
        local_addr,
        server,
        reconnector,
    })
}
