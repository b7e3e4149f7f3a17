use std::sync::Arc;
use log::{debug, error, info, warn};

use crate::webnotify::handler::NodeHandler;
use crate::webnotify::net::connection::Connection;
use crate::webnotify::transport::PeerSender;
use crate::tlv::message::TLVMessage;
use crate::tlv::types::{EventType, FieldType};

/// Route one inbound frame to its handler
pub async fn dispatch(handler: Arc<NodeHandler>, connection: Arc<Connection>, msg: TLVMessage) {
    match msg.event_type {
        EventType::Hello => handle_hello(handler, connection, &msg).await,
        EventType::WebNotify => handle_web_notify(handler, connection, &msg).await,
        EventType::Ok => handle_ok(connection, &msg).await,
        EventType::Error => handle_error(connection, &msg).await,
    }
}

pub async fn handle_hello(handler: Arc<NodeHandler>, connection: Arc<Connection>, msg: &TLVMessage) {
    debug!("Received Hello on connection {}", connection.id());

    match handler.handle_hello(msg, connection.clone()) {
        Ok(remote) => {
            connection.set_remote_node(remote);

            // Acknowledge with our own node id
            let mut ack = TLVMessage::new(EventType::Ok);
            ack.insert_u64(FieldType::NodeId, handler.node_id);
            match connection.send(&ack) {
                Ok(()) => info!("Hello acknowledged to node {}", remote),
                Err(e) => error!("Failed to acknowledge Hello from node {}: {}", remote, e),
            }
        }
        Err(e) => {
            warn!("Invalid Hello on connection {}: {}", connection.id(), e);
            if let Err(send_err) = connection.send(&TLVMessage::error(&e)) {
                error!("Failed to send error message: {}", send_err);
            }
        }
    }
}

pub async fn handle_web_notify(handler: Arc<NodeHandler>, connection: Arc<Connection>, msg: &TLVMessage) {
    match handler.handle_web_notify(msg) {
        Ok(delivered) => debug!("Notification from node {:?} pushed to {} sessions", connection.remote_node(), delivered),
        Err(e) => {
            warn!("Invalid WebNotify on connection {}: {}", connection.id(), e);
            if let Err(send_err) = connection.send(&TLVMessage::error(&e)) {
                error!("Failed to send error message: {}", send_err);
            }
        }
    }
}

pub async fn handle_ok(connection: Arc<Connection>, msg: &TLVMessage) {
    match msg.require_u64(FieldType::NodeId) {
        Ok(remote) => {
            if connection.remote_node().is_some_and(|expected| expected != remote) {
                warn!(
                    "Node {} answered on a connection dialled for node {:?}",
                    remote,
                    connection.remote_node()
                );
            } else {
                info!("Node {} acknowledged our Hello", remote);
            }
        }
        Err(_) => debug!("Ok received on connection {}", connection.id()),
    }
}

pub async fn handle_error(connection: Arc<Connection>, msg: &TLVMessage) {
    let text = msg
        .require_str(FieldType::ErrorText)
        .unwrap_or_else(|_| "<no text>".to_string());
    warn!("Node {:?} reported an error: {}", connection.remote_node(), text);
}
