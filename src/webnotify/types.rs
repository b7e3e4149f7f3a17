use std::fmt;

use uuid::Uuid;

/// User identifier = opaque user uid string
pub type UserUid = String;

/// Cluster node identifier (node guid)
pub type NodeId = u64;

/// Local web/poll session identifier
pub type SessionId = Uuid;

/// Logical regions of the shared store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Per-user web notification subscriptions
    WebNotify,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebNotify => "web_notify",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
