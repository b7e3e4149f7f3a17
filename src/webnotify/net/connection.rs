use std::io::ErrorKind;
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ErrorCode, Result, WebNotifyError};
use crate::tlv::message::{TLVMessage, HEADER_LEN, MAX_MESSAGE_SIZE};
use crate::webnotify::handler::NodeHandler;
use crate::webnotify::net::events::dispatch;
use crate::webnotify::transport::PeerSender;
use crate::webnotify::types::NodeId;

/// A TCP connection to another node. Reads run on one task, writes are
/// queued on an unbounded channel and drained by a second task.
pub struct Connection {
    id: Uuid,
    write_tx: UnboundedSender<TLVMessage>,
    cancel_token: CancellationToken,
    remote_node: OnceLock<NodeId>,
}

impl Connection {
    pub fn spawn(stream: TcpStream, handler: Arc<NodeHandler>) -> Arc<Self> {
        let (reader, writer) = stream.into_split();
        let (write_tx, write_rx) = unbounded_channel::<TLVMessage>();

        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            write_tx,
            cancel_token: handler.connection_token(),
            remote_node: OnceLock::new(),
        });

        let connection_read = connection.clone();
        tokio::spawn(async move {
            if let Err(e) = Connection::read_task(connection_read.clone(), reader, handler.clone()).await {
                warn!("Read task error on connection {}: {}", connection_read.id, e);
            }
            connection_read.on_closed(&handler);
        });

        let cancel_write = connection.cancel_token.clone();
        let id = connection.id;
        tokio::spawn(async move {
            if let Err(e) = Connection::write_task(writer, write_rx, cancel_write).await {
                warn!("Write task error on connection {}: {}", id, e);
            }
        });

        connection
    }

    async fn read_task(connection: Arc<Connection>, reader: OwnedReadHalf, handler: Arc<NodeHandler>) -> Result<()> {
        tokio::select! {
            _ = connection.cancel_token.cancelled() => Ok(()),
            res = Connection::read(connection.clone(), reader, handler) => res,
        }
    }

    async fn read(connection: Arc<Connection>, mut reader: OwnedReadHalf, handler: Arc<NodeHandler>) -> Result<()> {
        debug!("Starting read loop for connection {}", connection.id);
        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    info!("Connection {} closed by remote", connection.id);
                    return Ok(());
                }
                Err(e) => {
                    error!("Failed to read message header: {}", e);
                    return Err(WebNotifyError::new(ErrorCode::ReadFailed, format!("Header read failed: {}", e)));
                }
            }

            let len = u32::from_be_bytes(len_buf) as usize;
            if !(HEADER_LEN..=MAX_MESSAGE_SIZE).contains(&len) {
                // Framing is lost, nothing sensible can follow
                error!("Invalid frame length {} on connection {}", len, connection.id);
                return Err(WebNotifyError::new(ErrorCode::MalformedTlv, format!("Invalid frame length {}", len)));
            }

            let mut full = BytesMut::with_capacity(len);
            full.extend_from_slice(&len_buf);
            full.resize(len, 0);

            if let Err(e) = reader.read_exact(&mut full[4..]).await {
                error!("Failed to read message body: {}", e);
                return Err(WebNotifyError::new(ErrorCode::ReadFailed, format!("Body read failed: {}", e)));
            }

            match TLVMessage::parse(full.freeze()) {
                Ok(msg) => {
                    debug!("Processing {:?} from connection {}", msg.event_type, connection.id);
                    dispatch(handler.clone(), connection.clone(), msg).await;
                }
                Err(e) => {
                    warn!("Dropping malformed frame on connection {}: {}", connection.id, e);
                    if let Err(send_err) = connection.send(&TLVMessage::error(&e)) {
                        error!("Failed to send error message: {}", send_err);
                    }
                }
            }
        }
    }

    async fn write_task(
        mut writer: OwnedWriteHalf,
        mut rx: UnboundedReceiver<TLVMessage>,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        debug!("Starting write task");
        loop {
            let msg = tokio::select! {
                _ = cancel_token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(msg) => msg,
                    None => break,
                },
            };

            let encoded = match msg.encode() {
                Ok(encoded) => encoded,
                Err(e) => {
                    error!("Dropping unencodable {:?} message: {}", msg.event_type, e);
                    continue;
                }
            };

            if let Err(e) = writer.write_all(&encoded).await {
                error!("Failed to write message: {}", e);
                return Err(WebNotifyError::new(ErrorCode::WriteFailed, format!("Write failed: {}", e)));
            }
            debug!("Wrote {} bytes", encoded.len());
        }

        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown after write task ended: {}", e);
        }
        info!("Write task completed");
        Ok(())
    }

    /// Remember which node is on the other end. The first call wins.
    pub fn set_remote_node(&self, node: NodeId) {
        if self.remote_node.set(node).is_err() {
            debug!("Connection {} already bound to node {:?}", self.id, self.remote_node.get());
        }
    }

    pub fn remote_node(&self) -> Option<NodeId> {
        self.remote_node.get().copied()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn on_closed(&self, handler: &NodeHandler) {
        self.cancel_token.cancel();
        if let Some(node) = self.remote_node() {
            handler.peers.unregister_connection(node, self.connection_id());
        }
        info!("Connection {} cleanup completed", self.id);
    }
}

impl PeerSender for Connection {
    fn send(&self, msg: &TLVMessage) -> Result<()> {
        debug!("Queueing {:?} on connection {}", msg.event_type, self.id);
        self.write_tx.send(msg.clone()).map_err(|_| {
            WebNotifyError::new(ErrorCode::SendFailed, format!("Connection {} is closed", self.id))
        })
    }

    fn connection_id(&self) -> u128 {
        self.id.as_u128()
    }
}
