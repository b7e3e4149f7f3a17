use std::sync::Arc;

use log::{debug, info};

use crate::error::Result;
use crate::webnotify::optimistic::{optimistic_update, CasOutcome, DEFAULT_RETRIES};
use crate::webnotify::store::SubscriptionStore;
use crate::webnotify::subscription::Subscription;
use crate::webnotify::types::{Namespace, NodeId};

/// Releases one web/poll session of a user on a node
pub struct Unsubscriber {
    store: Arc<dyn SubscriptionStore>,
    retries: usize,
}

impl Unsubscriber {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self::with_retries(store, DEFAULT_RETRIES)
    }

    pub fn with_retries(store: Arc<dyn SubscriptionStore>, retries: usize) -> Self {
        Self { store, retries }
    }

    /// `None` when there is no subscription at all. Without a record for
    /// `node` the old value comes back unchanged.
    pub fn build_new(&self, old: Option<&Subscription>, node: NodeId) -> Option<Subscription> {
        old.map(|sub| sub.with_unsubscribed(node))
    }

    /// Unsubscribing a node that holds no record succeeds without writing.
    /// Returns `Ok(false)` when the retry budget ran out.
    pub fn unsubscribe(&self, user_uid: &str, node: NodeId) -> Result<bool> {
        debug!("Unsubscribing user {} from node {}", user_uid, node);

        let outcome = optimistic_update(self.store.as_ref(), Namespace::WebNotify, user_uid, self.retries, |old| {
            self.build_new(old, node)
        })?;

        match outcome {
            CasOutcome::Committed(_) => {
                debug!("User {} unsubscribed from node {}", user_uid, node);
                Ok(true)
            }
            CasOutcome::Unchanged(_) => {
                debug!("No record for user {} on node {}, nothing to do", user_uid, node);
                Ok(true)
            }
            CasOutcome::Exhausted => {
                info!("Too many retries unsubscribing user {} from node {}, returning false", user_uid, node);
                Ok(false)
            }
        }
    }
}
