//! Standalone webnotify node.
//!
//! Subscriptions live in an in-process memory space, so a node started by this
//! binary only sees sessions opened on itself. Peers listed in the config are
//! still dialled, but two binaries never share subscriptions; a cluster
//! embeds the library and passes a shared `SubscriptionStore` to `start`.

use std::io::Write;
use std::sync::Arc;
use log::{error, info, warn};
use webnotify::webnotify::config::NodeConfig;
use webnotify::webnotify::start;
use webnotify::webnotify::store::MemorySpace;

fn init_logger() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}:{}] {} - {}",
                buf.timestamp_millis(),
                record.module_path().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .init();
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_logger();

    info!("webnotify node starting up");

    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = match NodeConfig::from_toml_file(&path) {
        Ok(config) => {
            info!("Configuration loaded from {}", path);
            config
        },
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };

    info!("Using in-process memory space for subscriptions");
    if !config.peers.is_empty() {
        warn!(
            "{} peers configured, but subscriptions are not shared with them; \
             only sessions on node {} are notified",
            config.peers.len(),
            config.node_id
        );
    }
    let store = Arc::new(MemorySpace::new());

    let node = match start(config, store).await {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to start node: {e}");
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };

    tokio::signal::ctrl_c().await?;
    node.shutdown();

    Ok(())
}
