use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::webnotify::message::WebNotifyMessage;
use crate::webnotify::registry::WebNotifyRegistry;
use crate::webnotify::types::{NodeId, SessionId, UserUid};

/// Pushes a notification into one open web/poll session
pub trait SessionSender: Send + Sync {
    fn send(&self, msg: &WebNotifyMessage) -> Result<()>;
}

/// Sessions hosted on this node, grouped by user
#[derive(Default)]
pub struct LocalSessions {
    sessions: DashMap<UserUid, HashMap<SessionId, Arc<dyn SessionSender>>>,
}

impl LocalSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_uid: &str, id: SessionId, sender: Arc<dyn SessionSender>) {
        self.sessions
            .entry(user_uid.to_string())
            .or_default()
            .insert(id, sender);
    }

    pub fn remove(&self, user_uid: &str, id: SessionId) -> Option<Arc<dyn SessionSender>> {
        let removed = self
            .sessions
            .get_mut(user_uid)
            .and_then(|mut user_sessions| user_sessions.remove(&id));

        // Drop the user's entry once its last session is gone
        self.sessions.remove_if(user_uid, |_, user_sessions| user_sessions.is_empty());
        removed
    }

    /// Hand a notification to every session of its user.
    /// Returns how many sessions took it.
    pub fn deliver(&self, msg: &WebNotifyMessage) -> usize {
        // Clone the senders out so no shard lock is held while sending
        let senders: Vec<(SessionId, Arc<dyn SessionSender>)> = match self.sessions.get(&msg.user_uid) {
            Some(user_sessions) => user_sessions
                .iter()
                .map(|(id, sender)| (*id, sender.clone()))
                .collect(),
            None => {
                debug!("No local sessions for user {}", msg.user_uid);
                return 0;
            }
        };

        let mut sent_count = 0;
        for (id, sender) in &senders {
            match sender.send(msg) {
                Ok(()) => sent_count += 1,
                Err(e) => warn!("Failed to push notification into session {}: {}", id, e),
            }
        }

        debug!("Notification for user {} pushed to {}/{} sessions", msg.user_uid, sent_count, senders.len());
        sent_count
    }

    pub fn count(&self, user_uid: &str) -> usize {
        self.sessions.get(user_uid).map(|s| s.len()).unwrap_or(0)
    }
}

/// Web/poll sessions open on this node, kept in step with the shared registry.
///
/// Opening the first and every further session of a user bumps this node's
/// presence in the shared registry; closing one releases it again.
pub struct SessionRegistry {
    node: NodeId,
    registry: Arc<WebNotifyRegistry>,
    local: Arc<LocalSessions>,
}

impl SessionRegistry {
    pub fn new(node: NodeId, registry: Arc<WebNotifyRegistry>) -> Self {
        Self::with_local(node, registry, Arc::new(LocalSessions::new()))
    }

    /// Track sessions in `local`, which the node's transport also delivers to
    pub fn with_local(node: NodeId, registry: Arc<WebNotifyRegistry>, local: Arc<LocalSessions>) -> Self {
        Self { node, registry, local }
    }

    /// Returns `None` when the registry could not record the session after
    /// all retries; the session is then not tracked and may be retried.
    pub fn open_session(&self, user_uid: &str, sender: Arc<dyn SessionSender>) -> Result<Option<SessionId>> {
        if !self.registry.subscribe(user_uid, self.node)? {
            warn!("Could not subscribe user {} on node {}, session not opened", user_uid, self.node);
            return Ok(None);
        }

        let id = Uuid::new_v4();
        self.local.insert(user_uid, id, sender);

        info!("Opened session {} for user {} on node {}", id, user_uid, self.node);
        Ok(Some(id))
    }

    /// Closing an unknown session succeeds and leaves the registry alone.
    /// When the unsubscribe fails or runs out of retries the session stays
    /// open, so the close can be retried.
    pub fn close_session(&self, user_uid: &str, id: SessionId) -> Result<bool> {
        // Taken out first so two concurrent closes cannot both release it
        let sender = match self.local.remove(user_uid, id) {
            Some(sender) => sender,
            None => {
                debug!("Session {} for user {} not found", id, user_uid);
                return Ok(true);
            }
        };

        match self.registry.unsubscribe(user_uid, self.node) {
            Ok(true) => {
                info!("Closed session {} for user {} on node {}", id, user_uid, self.node);
                Ok(true)
            }
            Ok(false) => {
                warn!("Could not unsubscribe user {} on node {}, session {} kept open", user_uid, self.node, id);
                self.local.insert(user_uid, id, sender);
                Ok(false)
            }
            Err(e) => {
                warn!("Unsubscribe of user {} on node {} failed, session {} kept open: {}", user_uid, self.node, id, e);
                self.local.insert(user_uid, id, sender);
                Err(e)
            }
        }
    }

    /// Hand an inbound notification to every local session of its user
    pub fn deliver(&self, msg: &WebNotifyMessage) -> usize {
        self.local.deliver(msg)
    }

    pub fn session_count(&self, user_uid: &str) -> usize {
        self.local.count(user_uid)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use super::*;
    use crate::error::{ErrorCode, WebNotifyError};
    use crate::webnotify::clock::ManualClock;
    use crate::webnotify::registry::RegistryOptions;
    use crate::webnotify::store::testing::ScriptedSpace;
    use crate::webnotify::store::{MemorySpace, SubscriptionStore};
    use crate::webnotify::transport::testing::RecordingTransport;

    #[derive(Default)]
    struct Inbox {
        received: Mutex<Vec<WebNotifyMessage>>,
        broken: bool,
    }

    impl SessionSender for Inbox {
        fn send(&self, msg: &WebNotifyMessage) -> Result<()> {
            if self.broken {
                return Err(WebNotifyError::new(ErrorCode::SendFailed, "socket gone"));
            }
            self.received.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    fn sessions(node: NodeId) -> (SessionRegistry, Arc<WebNotifyRegistry>) {
        let registry = Arc::new(WebNotifyRegistry::new(
            Arc::new(MemorySpace::new()),
            Arc::new(RecordingTransport::default()),
            Arc::new(ManualClock::new(10_000)),
            RegistryOptions::default(),
        ));
        (SessionRegistry::new(node, registry.clone()), registry)
    }

    #[test]
    fn sessions_are_reference_counted_in_registry() {
        let (sessions, registry) = sessions(4);

        let first = sessions.open_session("alice", Arc::new(Inbox::default())).unwrap().unwrap();
        let second = sessions.open_session("alice", Arc::new(Inbox::default())).unwrap().unwrap();
        assert_eq!(registry.subscription("alice").unwrap().unwrap().record_for(4).unwrap().count, 2);

        assert!(sessions.close_session("alice", first).unwrap());
        assert_eq!(registry.subscription("alice").unwrap().unwrap().record_for(4).unwrap().count, 1);

        assert!(sessions.close_session("alice", second).unwrap());
        assert!(registry.subscription("alice").unwrap().unwrap().is_empty());
        assert_eq!(sessions.session_count("alice"), 0);
    }

    #[test]
    fn closing_twice_does_not_over_release() {
        let (sessions, registry) = sessions(4);
        let a = sessions.open_session("alice", Arc::new(Inbox::default())).unwrap().unwrap();
        sessions.open_session("alice", Arc::new(Inbox::default())).unwrap().unwrap();

        assert!(sessions.close_session("alice", a).unwrap());
        assert!(sessions.close_session("alice", a).unwrap());
        assert_eq!(registry.subscription("alice").unwrap().unwrap().record_for(4).unwrap().count, 1);
    }

    #[test]
    fn deliver_reaches_only_the_target_user() {
        let (sessions, _) = sessions(4);
        let alice = Arc::new(Inbox::default());
        let bob = Arc::new(Inbox::default());
        sessions.open_session("alice", alice.clone()).unwrap();
        sessions.open_session("bob", bob.clone()).unwrap();

        let delivered = sessions.deliver(&WebNotifyMessage::new("alice", "hi"));

        assert_eq!(delivered, 1);
        assert_eq!(alice.received.lock().unwrap().len(), 1);
        assert!(bob.received.lock().unwrap().is_empty());
    }

    #[test]
    fn broken_session_does_not_block_others() {
        let (sessions, _) = sessions(4);
        let broken = Arc::new(Inbox {
            broken: true,
            ..Default::default()
        });
        let healthy = Arc::new(Inbox::default());
        sessions.open_session("alice", broken).unwrap();
        sessions.open_session("alice", healthy.clone()).unwrap();

        assert_eq!(sessions.deliver(&WebNotifyMessage::new("alice", "hi")), 1);
        assert_eq!(healthy.received.lock().unwrap().len(), 1);
    }

    fn sessions_over<S: SubscriptionStore + 'static>(node: NodeId, store: Arc<S>) -> (SessionRegistry, Arc<WebNotifyRegistry>) {
        let registry = Arc::new(WebNotifyRegistry::new(
            store,
            Arc::new(RecordingTransport::default()),
            Arc::new(ManualClock::new(10_000)),
            RegistryOptions::default(),
        ));
        (SessionRegistry::new(node, registry.clone()), registry)
    }

    #[test]
    fn exhausted_close_keeps_session_for_retry() {
        let space = Arc::new(ScriptedSpace::new());
        let (sessions, registry) = sessions_over(4, space.clone());
        let a = sessions.open_session("alice", Arc::new(Inbox::default())).unwrap().unwrap();
        sessions.open_session("alice", Arc::new(Inbox::default())).unwrap().unwrap();

        space.fail_commits.store(true, Ordering::SeqCst);
        assert!(!sessions.close_session("alice", a).unwrap());
        assert_eq!(sessions.session_count("alice"), 2);

        space.fail_commits.store(false, Ordering::SeqCst);
        assert!(sessions.close_session("alice", a).unwrap());
        assert_eq!(sessions.session_count("alice"), 1);
        assert_eq!(registry.subscription("alice").unwrap().unwrap().record_for(4).unwrap().count, 1);
    }

    #[test]
    fn failed_close_keeps_session_for_retry() {
        let space = Arc::new(MemorySpace::new());
        let (sessions, registry) = sessions_over(4, space.clone());
        let a = sessions.open_session("alice", Arc::new(Inbox::default())).unwrap().unwrap();

        space.set_available(false);
        let err = sessions.close_session("alice", a).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::StoreUnavailable));
        assert_eq!(sessions.session_count("alice"), 1);

        space.set_available(true);
        assert!(sessions.close_session("alice", a).unwrap());
        assert!(registry.subscription("alice").unwrap().unwrap().is_empty());
        assert_eq!(sessions.session_count("alice"), 0);
    }
}
