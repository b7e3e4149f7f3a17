use log::error;
use crate::error::{ErrorCode, WebNotifyError};

/// Event types of the node-to-node TLV protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    // Notifications
    WebNotify = 0x10,

    // Handshake
    Hello = 0x22,

    // Responses
    Error = 0xF0,
    Ok = 0xF1,
}

impl EventType {
    /// Convert a u8 to an EventType
    pub fn from_u8(value: u8) -> Result<Self, WebNotifyError> {
        match value {
            0x10 => Ok(Self::WebNotify),
            0x22 => Ok(Self::Hello),
            0xF0 => Ok(Self::Error),
            0xF1 => Ok(Self::Ok),
            _ => {
                error!("Unknown event type: 0x{:02X}", value);
                Err(WebNotifyError::new(
                    ErrorCode::InvalidEventType,
                    format!("Unknown event type: 0x{:02X}", value),
                ))
            }
        }
    }
}

/// Field types of the node-to-node TLV protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    NodeId = 0x01,
    UserUid = 0x02,
    Notification = 0x03,
    ErrorCode = 0x08,
    ErrorText = 0x09,
}

impl FieldType {
    /// Convert a u8 to a FieldType
    pub fn from_u8(value: u8) -> Result<Self, WebNotifyError> {
        match value {
            0x01 => Ok(Self::NodeId),
            0x02 => Ok(Self::UserUid),
            0x03 => Ok(Self::Notification),
            0x08 => Ok(Self::ErrorCode),
            0x09 => Ok(Self::ErrorText),
            _ => Err(WebNotifyError::new(
                ErrorCode::MalformedTlv,
                format!("Unknown field type: 0x{:02X}", value),
            )),
        }
    }
}
