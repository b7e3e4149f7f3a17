use std::sync::Arc;

use log::{debug, info};

use crate::error::Result;
use crate::webnotify::clock::Clock;
use crate::webnotify::optimistic::{optimistic_update, CasOutcome, DEFAULT_RETRIES};
use crate::webnotify::store::SubscriptionStore;
use crate::webnotify::subscription::Subscription;
use crate::webnotify::types::{Namespace, NodeId};

/// Registers one more web/poll session of a user on a node
pub struct Subscriber {
    store: Arc<dyn SubscriptionStore>,
    clock: Arc<dyn Clock>,
    retries: usize,
}

impl Subscriber {
    pub fn new(store: Arc<dyn SubscriptionStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_retries(store, clock, DEFAULT_RETRIES)
    }

    pub fn with_retries(store: Arc<dyn SubscriptionStore>, clock: Arc<dyn Clock>, retries: usize) -> Self {
        Self { store, clock, retries }
    }

    /// The subscription after one more session on `node`. A missing
    /// subscription counts as an empty one.
    pub fn build_new(&self, old: Option<&Subscription>, node: NodeId) -> Subscription {
        old.cloned()
            .unwrap_or_default()
            .with_subscribed(node, self.clock.now_millis())
    }

    /// Returns `Ok(false)` when the retry budget ran out; the session was not
    /// counted and the caller may try again.
    pub fn subscribe(&self, user_uid: &str, node: NodeId) -> Result<bool> {
        debug!("Subscribing user {} on node {}", user_uid, node);

        let outcome = optimistic_update(self.store.as_ref(), Namespace::WebNotify, user_uid, self.retries, |old| {
            Some(self.build_new(old, node))
        })?;

        match outcome {
            CasOutcome::Exhausted => {
                info!("Too many retries subscribing user {} on node {}, returning false", user_uid, node);
                Ok(false)
            }
            _ => {
                debug!("User {} subscribed on node {}", user_uid, node);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::webnotify::clock::ManualClock;
    use crate::webnotify::store::testing::ScriptedSpace;
    use crate::webnotify::store::MemorySpace;
    use crate::webnotify::subscription::SubscriptionRecord;

    fn subscriber(space: &Arc<ScriptedSpace>, clock: &Arc<ManualClock>, retries: usize) -> Subscriber {
        Subscriber::with_retries(space.clone(), clock.clone(), retries)
    }

    #[test]
    fn first_subscribe_creates_record() {
        let space = Arc::new(ScriptedSpace::new());
        let clock = Arc::new(ManualClock::new(1_000));

        assert!(subscriber(&space, &clock, 3).subscribe("alice", 7).unwrap());

        let stored = space.stored("alice").unwrap();
        assert_eq!(stored.records(), &[SubscriptionRecord::new(7, 1, 1_000)]);
    }

    #[test]
    fn repeated_subscribe_increments_and_refreshes() {
        let space = Arc::new(ScriptedSpace::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let sub = subscriber(&space, &clock, 3);

        assert!(sub.subscribe("alice", 7).unwrap());
        clock.advance(250);
        assert!(sub.subscribe("alice", 7).unwrap());

        let stored = space.stored("alice").unwrap();
        assert_eq!(stored.record_for(7), Some(&SubscriptionRecord::new(7, 2, 1_250)));
    }

    #[test]
    fn other_nodes_keep_their_timestamps() {
        let space = Arc::new(ScriptedSpace::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let sub = subscriber(&space, &clock, 3);

        sub.subscribe("alice", 1).unwrap();
        clock.advance(60_000);
        sub.subscribe("alice", 2).unwrap();

        let stored = space.stored("alice").unwrap();
        assert_eq!(stored.record_for(1), Some(&SubscriptionRecord::new(1, 1, 1_000)));
        assert_eq!(stored.record_for(2), Some(&SubscriptionRecord::new(2, 1, 61_000)));
    }

    #[test]
    fn empty_subscription_behaves_like_absent() {
        let space = Arc::new(ScriptedSpace::new());
        space.seed("alice", &Subscription::new());
        let clock = Arc::new(ManualClock::new(5));

        assert!(subscriber(&space, &clock, 3).subscribe("alice", 3).unwrap());
        assert_eq!(space.stored("alice").unwrap().records(), &[SubscriptionRecord::new(3, 1, 5)]);
    }

    #[test]
    fn losing_a_race_reapplies_on_latest_value() {
        let space = Arc::new(ScriptedSpace::new());
        let clock = Arc::new(ManualClock::new(100));
        space.seed("alice", &Subscription::new().with_subscribed(4, 50));

        space.before_next_commit(|inner: &MemorySpace| {
            let current = inner.get(Namespace::WebNotify, "alice").unwrap().unwrap();
            let bumped = current.with_subscribed(4, 60);
            assert!(inner.replace(Namespace::WebNotify, "alice", &current, &bumped).unwrap());
        });

        assert!(subscriber(&space, &clock, 3).subscribe("alice", 4).unwrap());

        assert_eq!(space.replaces.load(Ordering::SeqCst), 2);
        assert_eq!(space.stored("alice").unwrap().record_for(4).unwrap().count, 3);
    }

    #[test]
    fn forced_contention_stops_at_budget() {
        let space = Arc::new(ScriptedSpace::failing_commits());
        space.seed("alice", &Subscription::new().with_subscribed(4, 50));
        let clock = Arc::new(ManualClock::new(100));

        assert!(!subscriber(&space, &clock, 3).subscribe("alice", 4).unwrap());
        assert_eq!(space.replaces.load(Ordering::SeqCst), 3);

        space.replaces.store(0, Ordering::SeqCst);
        assert!(!subscriber(&space, &clock, 5).subscribe("alice", 4).unwrap());
        assert_eq!(space.replaces.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn store_failure_is_an_error() {
        let space = Arc::new(ScriptedSpace::new());
        space.inner.set_available(false);
        let clock = Arc::new(ManualClock::new(100));

        assert!(subscriber(&space, &clock, 3).subscribe("alice", 4).is_err());
    }
}
