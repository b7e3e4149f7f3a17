use crate::error::{ErrorCode, Result, WebNotifyError};
use crate::tlv::message::TLVMessage;
use crate::tlv::types::{EventType, FieldType};

/// Notification addressed to every web session of one user on the receiving node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebNotifyMessage {
    pub user_uid: String,
    pub notification: String,
}

impl WebNotifyMessage {
    pub fn new(user_uid: impl Into<String>, notification: impl Into<String>) -> Self {
        Self {
            user_uid: user_uid.into(),
            notification: notification.into(),
        }
    }

    pub fn to_tlv(&self) -> TLVMessage {
        let mut msg = TLVMessage::new(EventType::WebNotify);
        msg.insert_field(FieldType::UserUid, self.user_uid.clone());
        msg.insert_field(FieldType::Notification, self.notification.clone());
        msg
    }

    pub fn from_tlv(msg: &TLVMessage) -> Result<Self> {
        if msg.event_type != EventType::WebNotify {
            return Err(WebNotifyError::new(
                ErrorCode::InvalidEventType,
                format!("Expected WebNotify frame, got {:?}", msg.event_type),
            ));
        }

        Ok(Self {
            user_uid: msg.require_str(FieldType::UserUid)?,
            notification: msg.require_str(FieldType::Notification)?,
        })
    }
}
