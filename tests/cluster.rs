use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, timeout};

use webnotify::error::{ErrorCode, Result, WebNotifyError};
use webnotify::webnotify::config::{NodeConfig, PeerConfig};
use webnotify::webnotify::message::WebNotifyMessage;
use webnotify::webnotify::sessions::SessionSender;
use webnotify::webnotify::start;
use webnotify::webnotify::store::{MemorySpace, SubscriptionStore};
use webnotify::webnotify::RunningNode;

/// A browser tab, as far as the node is concerned
struct Tab(UnboundedSender<WebNotifyMessage>);

impl SessionSender for Tab {
    fn send(&self, msg: &WebNotifyMessage) -> Result<()> {
        self.0
            .send(msg.clone())
            .map_err(|_| WebNotifyError::new(ErrorCode::SendFailed, "tab closed"))
    }
}

fn tab() -> (Arc<Tab>, UnboundedReceiver<WebNotifyMessage>) {
    let (tx, rx) = unbounded_channel();
    (Arc::new(Tab(tx)), rx)
}

fn config(node_id: u64, peers: Vec<PeerConfig>) -> NodeConfig {
    NodeConfig {
        node_id,
        addr: "127.0.0.1:0".to_string(),
        peers,
        retries: 3,
        expiry_secs: 300,
    }
}

async fn two_nodes(store: Arc<dyn SubscriptionStore>) -> (RunningNode, RunningNode) {
    let b = start(config(2, vec![]), store.clone()).await.unwrap();
    let a = start(
        config(
            1,
            vec![PeerConfig {
                node_id: 2,
                addr: b.local_addr.to_string(),
            }],
        ),
        store,
    )
    .await
    .unwrap();
    (a, b)
}

async fn wait_for_peer_gone(node: &RunningNode, peer: u64) {
    timeout(Duration::from_secs(5), async {
        while node.handler.peers.contains(peer) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("peer still registered");
}

async fn wait_for_peer(node: &RunningNode, peer: u64) {
    timeout(Duration::from_secs(5), async {
        while !node.handler.peers.contains(peer) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("peer never said hello");
}

#[tokio::test]
async fn notification_reaches_session_on_other_node() {
    let store = Arc::new(MemorySpace::new());
    let (a, b) = two_nodes(store).await;

    let (session, mut inbox) = tab();
    b.handler.sessions.open_session("alice", session).unwrap().unwrap();

    let report = a.handler.registry.notify("alice", "restore finished").unwrap();
    assert_eq!(report.delivered, vec![2]);

    let received = timeout(Duration::from_secs(5), inbox.recv())
        .await
        .expect("notification not delivered in time")
        .expect("session channel closed");
    assert_eq!(received, WebNotifyMessage::new("alice", "restore finished"));

    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn hello_makes_dialling_node_reachable() {
    let store = Arc::new(MemorySpace::new());
    let (a, b) = two_nodes(store).await;
    wait_for_peer(&b, 1).await;

    let (session, mut inbox) = tab();
    a.handler.sessions.open_session("bob", session).unwrap().unwrap();

    b.handler.registry.notify("bob", "quota warning").unwrap();

    let received = timeout(Duration::from_secs(5), inbox.recv()).await.unwrap().unwrap();
    assert_eq!(received.notification, "quota warning");

    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn unreachable_node_does_not_block_fan_out() {
    let store = Arc::new(MemorySpace::new());
    let (a, b) = two_nodes(store.clone()).await;

    // node 3 subscribed once but a has no connection to it
    let (session, mut inbox) = tab();
    b.handler.sessions.open_session("carol", session).unwrap().unwrap();
    a.handler.registry.subscribe("carol", 3).unwrap();

    let report = a.handler.registry.notify("carol", "hi").unwrap();
    assert_eq!(report.failed, vec![3]);
    assert_eq!(report.delivered, vec![2]);

    let received = timeout(Duration::from_secs(5), inbox.recv()).await.unwrap().unwrap();
    assert_eq!(received.user_uid, "carol");

    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn closed_session_stops_notifications() {
    let store = Arc::new(MemorySpace::new());
    let (a, b) = two_nodes(store).await;

    let (session, _inbox) = tab();
    let id = b.handler.sessions.open_session("dave", session).unwrap().unwrap();
    assert!(b.handler.sessions.close_session("dave", id).unwrap());

    let report = a.handler.registry.notify("dave", "anyone?").unwrap();
    assert!(report.is_noop());

    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn single_node_delivers_to_its_own_sessions() {
    let node = start(config(1, vec![]), Arc::new(MemorySpace::new())).await.unwrap();

    let (session, mut inbox) = tab();
    node.handler.sessions.open_session("erin", session).unwrap().unwrap();

    let report = node.handler.registry.notify("erin", "export ready").unwrap();
    assert_eq!(report.delivered, vec![1]);
    assert!(report.failed.is_empty());

    let received = timeout(Duration::from_secs(5), inbox.recv()).await.unwrap().unwrap();
    assert_eq!(received, WebNotifyMessage::new("erin", "export ready"));

    node.shutdown();
}

#[tokio::test]
async fn shutdown_drops_peer_connections_on_both_sides() {
    let store = Arc::new(MemorySpace::new());
    let (a, b) = two_nodes(store).await;
    wait_for_peer(&b, 1).await;
    assert!(a.handler.peers.contains(2));

    a.shutdown();

    wait_for_peer_gone(&a, 2).await;
    wait_for_peer_gone(&b, 1).await;

    // a's session record is still live, but a can no longer be reached
    a.handler.registry.subscribe("frank", 1).unwrap();
    let report = b.handler.registry.notify("frank", "late").unwrap();
    assert_eq!(report.failed, vec![1]);
    assert!(report.delivered.is_empty());

    b.shutdown();
}
