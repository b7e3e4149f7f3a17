use std::collections::HashMap;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;
use crate::error::{ErrorCode, WebNotifyError};
use crate::tlv::types::{EventType, FieldType};

/// Length prefix + event type
pub const HEADER_LEN: usize = 5;

/// Upper bound for a single frame, header included
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// One frame: `[u32 total length][u8 event type]{[u8 field][u32 len][data]}*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TLVMessage {
    pub event_type: EventType,
    fields: HashMap<FieldType, Bytes>,
}

impl TLVMessage {
    /// Build a message by hand
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            fields: HashMap::new(),
        }
    }

    /// Parse a complete frame, length prefix included
    pub fn parse(raw: Bytes) -> Result<Self, WebNotifyError> {
        if raw.len() < HEADER_LEN {
            return Err(WebNotifyError::new(
                ErrorCode::IncompleteMessage,
                "Message too short",
            ));
        }

        let original_raw = raw.clone();
        let mut cursor = raw;

        let length = cursor.get_u32() as usize;
        if length != original_raw.len() {
            return Err(WebNotifyError::new(
                ErrorCode::IncompleteMessage,
                format!("Length prefix {} does not match frame of {} bytes", length, original_raw.len()),
            ));
        }

        let event_type = EventType::from_u8(cursor.get_u8())?;
        let mut fields = HashMap::new();
        let mut offset = HEADER_LEN;

        while cursor.has_remaining() {
            if cursor.remaining() < 5 {
                return Err(WebNotifyError::new(
                    ErrorCode::MalformedTlv,
                    "Truncated TLV field header",
                ));
            }

            let field_type = FieldType::from_u8(cursor.get_u8())?;
            let field_len = cursor.get_u32() as usize;
            offset += 5;

            if cursor.remaining() < field_len {
                return Err(WebNotifyError::new(
                    ErrorCode::MalformedTlv,
                    "Incomplete TLV field",
                ));
            }

            // Slice the original buffer, no copy
            fields.insert(field_type, original_raw.slice(offset..offset + field_len));
            cursor.advance(field_len);
            offset += field_len;
        }

        debug!("Parsed {:?} frame with {} fields", event_type, fields.len());
        Ok(Self { event_type, fields })
    }

    /// Serialize into a frame
    pub fn encode(&self) -> Result<Bytes, WebNotifyError> {
        let total_size = HEADER_LEN
            + self
                .fields
                .values()
                .map(|value| 1 + 4 + value.len())
                .sum::<usize>();

        if total_size > MAX_MESSAGE_SIZE {
            debug!("Message too large: {} bytes (maximum: {} bytes)", total_size, MAX_MESSAGE_SIZE);
            return Err(WebNotifyError::new(
                ErrorCode::MalformedTlv,
                format!("Message of {} bytes exceeds maximum of {}", total_size, MAX_MESSAGE_SIZE),
            ));
        }

        let mut msg = BytesMut::with_capacity(total_size);
        msg.put_u32(total_size as u32);
        msg.put_u8(self.event_type as u8);

        for (field_type, value) in &self.fields {
            msg.put_u8(*field_type as u8);
            msg.put_u32(value.len() as u32);
            msg.extend_from_slice(value);
        }

        debug!("Encoded {:?} frame of {} bytes", self.event_type, msg.len());
        Ok(msg.freeze())
    }

    /// Read a field
    pub fn get_field(&self, field: FieldType) -> Option<&Bytes> {
        self.fields.get(&field)
    }

    /// Read a field that has to be present
    pub fn require_field(&self, field: FieldType) -> Result<&Bytes, WebNotifyError> {
        self.fields.get(&field).ok_or_else(|| {
            WebNotifyError::new(
                ErrorCode::MissingField,
                format!("{:?} frame without {:?} field", self.event_type, field),
            )
        })
    }

    /// Read a UTF-8 field that has to be present
    pub fn require_str(&self, field: FieldType) -> Result<String, WebNotifyError> {
        let raw = self.require_field(field)?;
        String::from_utf8(raw.to_vec()).map_err(|_| {
            WebNotifyError::new(ErrorCode::MalformedTlv, format!("{:?} field is not valid UTF-8", field))
        })
    }

    /// Read a big-endian u64 field that has to be present
    pub fn require_u64(&self, field: FieldType) -> Result<u64, WebNotifyError> {
        let raw = self.require_field(field)?;
        let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
            WebNotifyError::new(ErrorCode::MalformedTlv, format!("{:?} field is not 8 bytes", field))
        })?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Set or overwrite a field
    pub fn insert_field<V: Into<Bytes>>(&mut self, field: FieldType, value: V) {
        self.fields.insert(field, value.into());
    }

    pub fn insert_u64(&mut self, field: FieldType, value: u64) {
        self.insert_field(field, Bytes::copy_from_slice(&value.to_be_bytes()));
    }

    /// Error frame carrying a code and a text
    pub fn error(err: &WebNotifyError) -> Self {
        let (code, text) = err.to_tlv_error();
        let mut msg = Self::new(EventType::Error);
        msg.insert_field(FieldType::ErrorCode, Bytes::copy_from_slice(&code.to_be_bytes()));
        msg.insert_field(FieldType::ErrorText, text);
        msg
    }
}
