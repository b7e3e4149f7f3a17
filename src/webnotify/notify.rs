use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::Result;
use crate::webnotify::clock::Clock;
use crate::webnotify::message::WebNotifyMessage;
use crate::webnotify::optimistic::{optimistic_update, CasOutcome, DEFAULT_RETRIES};
use crate::webnotify::store::SubscriptionStore;
use crate::webnotify::subscription::Subscription;
use crate::webnotify::transport::MessagingTransport;
use crate::webnotify::types::{Namespace, NodeId};

/// Records older than this are treated as left behind by a dead node
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// What a single notify call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Nodes the payload was handed to
    pub delivered: Vec<NodeId>,
    /// Nodes whose send failed
    pub failed: Vec<NodeId>,
    /// Expired records dropped from the subscription
    pub pruned: usize,
    /// Whether the pruned subscription made it back into the store
    pub persisted: bool,
}

impl NotifyReport {
    pub fn is_noop(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty() && self.pruned == 0
    }
}

/// Fans a payload out to every node with a live session of the user.
///
/// Expiry is passive: stale records are dropped while reading, and the
/// pruned value is written back on a best-effort basis.
pub struct Notifier {
    store: Arc<dyn SubscriptionStore>,
    transport: Arc<dyn MessagingTransport>,
    clock: Arc<dyn Clock>,
    retries: usize,
    expiry: Duration,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn MessagingTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            retries: DEFAULT_RETRIES,
            expiry: DEFAULT_EXPIRY,
        }
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn notify(&self, user_uid: &str, payload: &str) -> Result<NotifyReport> {
        let mut report = NotifyReport::default();

        let live = match self.live_subscription(user_uid, &mut report)? {
            Some(live) => live,
            None => {
                debug!("No subscription for user {}, nothing to notify", user_uid);
                return Ok(report);
            }
        };

        let message = WebNotifyMessage::new(user_uid, payload);
        for record in live.records() {
            match self.transport.send_to_node(record.node, &message) {
                Ok(()) => {
                    debug!("Notification for user {} sent to node {}", user_uid, record.node);
                    report.delivered.push(record.node);
                }
                Err(e) => {
                    warn!("Failed to notify node {} for user {}: {}", record.node, user_uid, e);
                    report.failed.push(record.node);
                }
            }
        }

        debug!(
            "Notification for user {} delivered to {}/{} nodes",
            user_uid,
            report.delivered.len(),
            live.len()
        );
        Ok(report)
    }

    /// The user's subscription without expired records, `None` when nothing
    /// is left to notify. Writes the pruned value back when something expired.
    fn live_subscription(&self, user_uid: &str, report: &mut NotifyReport) -> Result<Option<Subscription>> {
        let expiry_millis = i64::try_from(self.expiry.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.clock.now_millis().saturating_sub(expiry_millis);

        // Last value read and its filtered form, kept for when every commit loses
        let mut last_read_len = 0;
        let mut last_filtered: Option<Subscription> = None;

        let outcome = optimistic_update(self.store.as_ref(), Namespace::WebNotify, user_uid, self.retries, |old| {
            let old = old?;
            let filtered = old.without_expired(cutoff);
            last_read_len = old.len();
            last_filtered = Some(filtered.clone());
            Some(filtered)
        })?;

        let live = match outcome {
            CasOutcome::Unchanged(current) => current,
            CasOutcome::Committed(pruned) => {
                report.pruned = last_read_len - pruned.len();
                report.persisted = true;
                debug!("Pruned {} expired records for user {}", report.pruned, user_uid);
                Some(pruned)
            }
            CasOutcome::Exhausted => {
                // Fan out from the in-memory view, a later notify prunes again
                info!("Too many retries pruning subscription of user {}, using unsaved view", user_uid);
                if let Some(filtered) = &last_filtered {
                    report.pruned = last_read_len - filtered.len();
                }
                last_filtered
            }
        };

        Ok(live.filter(|sub| !sub.is_empty()))
    }
}
