use log::{debug, info};

use crate::error::Result;
use crate::webnotify::store::SubscriptionStore;
use crate::webnotify::subscription::Subscription;
use crate::webnotify::types::Namespace;

/// Attempts per operation unless configured otherwise
pub const DEFAULT_RETRIES: usize = 3;

/// Result of a bounded read-compute-commit loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The computed value was written
    Committed(Subscription),
    /// The computed value equals what was read, nothing was written
    Unchanged(Option<Subscription>),
    /// Every attempt lost its race
    Exhausted,
}

impl CasOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, Self::Exhausted)
    }
}

/// Read the value under `key`, derive a new one with `compute` and commit it
/// atomically, starting over whenever another writer got there first.
///
/// `compute` must be a pure function of the value it is given; returning
/// `None` leaves the key alone. An absent key is committed with
/// `put_if_absent`, a present one with `replace`. When `put_if_absent`
/// reports a competing insert, that value becomes the input of the next
/// attempt. Store errors end the loop immediately.
pub fn optimistic_update<S, F>(
    store: &S,
    namespace: Namespace,
    key: &str,
    retries: usize,
    mut compute: F,
) -> Result<CasOutcome>
where
    S: SubscriptionStore + ?Sized,
    F: FnMut(Option<&Subscription>) -> Option<Subscription>,
{
    let mut handed_back: Option<Subscription> = None;

    for attempt in 1..=retries {
        let old = match handed_back.take() {
            Some(current) => Some(current),
            None => store.get(namespace, key)?,
        };

        let new = match compute(old.as_ref()) {
            Some(new) => new,
            None => return Ok(CasOutcome::Unchanged(old)),
        };

        if old.as_ref() == Some(&new) {
            return Ok(CasOutcome::Unchanged(old));
        }

        match old {
            None => match store.put_if_absent(namespace, key, &new)? {
                None => return Ok(CasOutcome::Committed(new)),
                Some(current) => {
                    debug!("Attempt {} for {}/{}: concurrent insert", attempt, namespace, key);
                    handed_back = Some(current);
                }
            },
            Some(old) => {
                if store.replace(namespace, key, &old, &new)? {
                    return Ok(CasOutcome::Committed(new));
                }
                debug!("Attempt {} for {}/{}: value changed underneath", attempt, namespace, key);
            }
        }
    }

    info!("Too many retries ({}) updating {}/{}, giving up", retries, namespace, key);
    Ok(CasOutcome::Exhausted)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::error::ErrorCode;
    use crate::webnotify::store::testing::ScriptedSpace;
    use crate::webnotify::store::MemorySpace;
    use crate::webnotify::subscription::SubscriptionRecord;

    fn one(node: u64, count: u32) -> Subscription {
        Subscription::from_records(vec![SubscriptionRecord::new(node, count, 10)])
    }

    #[test]
    fn inserts_when_absent() {
        let space = ScriptedSpace::new();
        let outcome = optimistic_update(&space, Namespace::WebNotify, "u", 3, |_| Some(one(1, 1))).unwrap();

        assert_eq!(outcome, CasOutcome::Committed(one(1, 1)));
        assert_eq!(space.puts.load(Ordering::SeqCst), 1);
        assert_eq!(space.replaces.load(Ordering::SeqCst), 0);
        assert_eq!(space.stored("u"), Some(one(1, 1)));
    }

    #[test]
    fn replaces_when_present() {
        let space = ScriptedSpace::new();
        space.seed("u", &one(1, 1));

        let outcome = optimistic_update(&space, Namespace::WebNotify, "u", 3, |old| {
            old.map(|o| o.with_subscribed(2, 20))
        })
        .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(space.replaces.load(Ordering::SeqCst), 1);
        assert_eq!(space.stored("u").unwrap().nodes(), vec![1, 2]);
    }

    #[test]
    fn equal_value_skips_commit() {
        let space = ScriptedSpace::new();
        space.seed("u", &one(1, 1));

        let outcome = optimistic_update(&space, Namespace::WebNotify, "u", 3, |old| old.cloned()).unwrap();

        assert_eq!(outcome, CasOutcome::Unchanged(Some(one(1, 1))));
        assert_eq!(space.writes(), 0);
    }

    #[test]
    fn none_from_compute_leaves_key_alone() {
        let space = ScriptedSpace::new();
        let outcome = optimistic_update(&space, Namespace::WebNotify, "u", 3, |_| None).unwrap();

        assert_eq!(outcome, CasOutcome::Unchanged(None));
        assert_eq!(space.writes(), 0);
        assert_eq!(space.stored("u"), None);
    }

    #[test]
    fn lost_insert_retries_from_returned_value() {
        let space = ScriptedSpace::new();
        space.before_next_commit(|inner: &MemorySpace| {
            inner.put_if_absent(Namespace::WebNotify, "u", &one(9, 1)).unwrap();
        });

        let outcome = optimistic_update(&space, Namespace::WebNotify, "u", 3, |old| {
            Some(old.cloned().unwrap_or_default().with_subscribed(1, 20))
        })
        .unwrap();

        assert!(outcome.succeeded());
        // the competing value came back from put_if_absent, no second read
        assert_eq!(space.gets.load(Ordering::SeqCst), 1);
        assert_eq!(space.stored("u").unwrap().nodes(), vec![1, 9]);
    }

    #[test]
    fn gives_up_after_budget() {
        let space = ScriptedSpace::failing_commits();
        space.seed("u", &one(1, 1));

        let outcome = optimistic_update(&space, Namespace::WebNotify, "u", 3, |old| {
            old.map(|o| o.with_subscribed(1, 99))
        })
        .unwrap();

        assert_eq!(outcome, CasOutcome::Exhausted);
        assert!(!outcome.succeeded());
        assert_eq!(space.gets.load(Ordering::SeqCst), 3);
        assert_eq!(space.replaces.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn store_errors_propagate() {
        let space = ScriptedSpace::new();
        space.inner.set_available(false);

        let err = optimistic_update(&space, Namespace::WebNotify, "u", 3, |_| Some(one(1, 1))).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::StoreUnavailable));
        assert_eq!(space.gets.load(Ordering::SeqCst), 1);
    }
}
