//! Cluster-wide registry of web notification subscriptions.
//!
//! Every user has one [`Subscription`](webnotify::subscription::Subscription)
//! in a shared store listing the nodes that host a web/poll session for
//! them. Nodes update it with lock-free read-compute-commit loops and
//! notifications are fanned out only to nodes whose presence has not expired.

pub mod error;
pub mod tlv;
pub mod webnotify;
