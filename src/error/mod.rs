//! Error module for webnotify
//!
//! This module defines the error type and the numeric error codes used by the
//! subscription registry, the shared store and the peer transport.

use thiserror::Error;
use std::fmt;

/// Numeric error code, grouped by category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Protocol errors (0x0001-0x0100)
    InvalidEventType = 0x0001,
    MalformedTlv = 0x0002,
    IncompleteMessage = 0x0003,
    MissingField = 0x0004,

    // Store errors (0x0101-0x0200)
    StoreUnavailable = 0x0101,
    CorruptValue = 0x0103,

    // Transport errors (0x0201-0x0300)
    PeerNotFound = 0x0201,
    SendFailed = 0x0202,
    ReadFailed = 0x0203,
    WriteFailed = 0x0204,

    // System errors (0x0301-0x0400)
    InternalServerError = 0x0301,
    ConfigInvalid = 0x0302,
}

impl ErrorCode {
    /// Get the error code as a u16
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the error code category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            0x0001..=0x0100 => ErrorCategory::Protocol,
            0x0101..=0x0200 => ErrorCategory::Store,
            0x0201..=0x0300 => ErrorCategory::Transport,
            0x0301..=0x0400 => ErrorCategory::System,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Try to convert a u16 to an ErrorCode
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::InvalidEventType),
            0x0002 => Some(Self::MalformedTlv),
            0x0003 => Some(Self::IncompleteMessage),
            0x0004 => Some(Self::MissingField),
            0x0101 => Some(Self::StoreUnavailable),
            0x0103 => Some(Self::CorruptValue),
            0x0201 => Some(Self::PeerNotFound),
            0x0202 => Some(Self::SendFailed),
            0x0203 => Some(Self::ReadFailed),
            0x0204 => Some(Self::WriteFailed),
            0x0301 => Some(Self::InternalServerError),
            0x0302 => Some(Self::ConfigInvalid),
            _ => None,
        }
    }

    /// Get a human-readable description of the error code
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidEventType => "Unknown or invalid event type",
            Self::MalformedTlv => "Malformed or inconsistent TLV field",
            Self::IncompleteMessage => "Incomplete or truncated message",
            Self::MissingField => "Required TLV field is missing",
            Self::StoreUnavailable => "Shared subscription store is unavailable",
            Self::CorruptValue => "Stored subscription could not be decoded",
            Self::PeerNotFound => "No connection to the target node",
            Self::SendFailed => "Failed to send message",
            Self::ReadFailed => "Failed to read from connection",
            Self::WriteFailed => "Failed to write to connection",
            Self::InternalServerError => "Unexpected server error",
            Self::ConfigInvalid => "Invalid configuration",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidEventType => "INVALID_EVENT_TYPE",
            Self::MalformedTlv => "MALFORMED_TLV",
            Self::IncompleteMessage => "INCOMPLETE_MESSAGE",
            Self::MissingField => "MISSING_FIELD",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::CorruptValue => "CORRUPT_VALUE",
            Self::PeerNotFound => "PEER_NOT_FOUND",
            Self::SendFailed => "SEND_FAILED",
            Self::ReadFailed => "READ_FAILED",
            Self::WriteFailed => "WRITE_FAILED",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::ConfigInvalid => "CONFIG_INVALID",
        };
        write!(f, "{} (0x{:04X})", name, self.as_u16())
    }
}

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Protocol,
    Store,
    Transport,
    System,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol => write!(f, "Protocol"),
            Self::Store => write!(f, "Store"),
            Self::Transport => write!(f, "Transport"),
            Self::System => write!(f, "System"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Main error type for webnotify
#[derive(Error, Debug)]
pub enum WebNotifyError {
    #[error("{code}: {message}")]
    Standard {
        code: ErrorCode,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WebNotifyError {
    /// Create a new standard error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Standard {
            code,
            message: message.into(),
        }
    }

    /// Get the error code if this is a standard error
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Standard { code, .. } => Some(*code),
            Self::Config(_) => Some(ErrorCode::ConfigInvalid),
            _ => None,
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::Standard { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }

    /// Convert to a TLV error representation (for protocol use)
    pub fn to_tlv_error(&self) -> (u16, String) {
        match self {
            Self::Standard { code, message } => (code.as_u16(), message.clone()),
            _ => (ErrorCode::InternalServerError.as_u16(), self.to_string()),
        }
    }
}

/// Result type alias for webnotify operations
pub type Result<T> = std::result::Result<T, WebNotifyError>;
