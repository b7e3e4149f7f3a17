use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::webnotify::types::NodeId;

/// Presence of one user on one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub node: NodeId,
    /// Number of open sessions for the user on this node, never zero
    pub count: u32,
    /// Millis of the last subscribe/unsubscribe that touched this record
    pub last_modified: i64,
}

impl SubscriptionRecord {
    pub fn new(node: NodeId, count: u32, last_modified: i64) -> Self {
        Self {
            node,
            count,
            last_modified,
        }
    }
}

/// All presence records of a single user.
///
/// Values are immutable: every mutation builds a new `Subscription`, which is
/// what the store compares against in `replace`. Records are kept ordered by
/// node so two subscriptions holding the same records are always equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    records: Vec<SubscriptionRecord>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a subscription from arbitrary records. Later records win on a
    /// duplicate node and zero-count records are dropped.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = SubscriptionRecord>,
    {
        let by_node: BTreeMap<NodeId, SubscriptionRecord> = records
            .into_iter()
            .filter(|r| r.count > 0)
            .map(|r| (r.node, r))
            .collect();

        Self {
            records: by_node.into_values().collect(),
        }
    }

    pub fn records(&self) -> &[SubscriptionRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn record_for(&self, node: NodeId) -> Option<&SubscriptionRecord> {
        self.records
            .binary_search_by_key(&node, |r| r.node)
            .ok()
            .map(|idx| &self.records[idx])
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.records.iter().map(|r| r.node).collect()
    }

    /// One more session on `node`. The touched record gets `now` as its
    /// timestamp, every other record is carried over untouched.
    pub fn with_subscribed(&self, node: NodeId, now: i64) -> Self {
        let mut records = self.records.clone();
        match records.binary_search_by_key(&node, |r| r.node) {
            Ok(idx) => {
                let old = records[idx];
                records[idx] = SubscriptionRecord::new(node, old.count.saturating_add(1), now);
            }
            Err(idx) => records.insert(idx, SubscriptionRecord::new(node, 1, now)),
        }
        Self { records }
    }

    /// One session fewer on `node`. A count of one removes the record, a
    /// larger count is decremented and keeps its original timestamp. Without
    /// a record for `node` the result equals `self`.
    pub fn with_unsubscribed(&self, node: NodeId) -> Self {
        let mut records = self.records.clone();
        if let Ok(idx) = records.binary_search_by_key(&node, |r| r.node) {
            let old = records[idx];
            if old.count > 1 {
                records[idx] = SubscriptionRecord::new(node, old.count - 1, old.last_modified);
            } else {
                records.remove(idx);
            }
        }
        Self { records }
    }

    /// Only the records modified strictly after `cutoff`, whatever their count
    pub fn without_expired(&self, cutoff: i64) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| r.last_modified > cutoff)
                .copied()
                .collect(),
        }
    }
}
