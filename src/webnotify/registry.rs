use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::error::Result;
use crate::webnotify::clock::Clock;
use crate::webnotify::notify::{Notifier, NotifyReport, DEFAULT_EXPIRY};
use crate::webnotify::optimistic::DEFAULT_RETRIES;
use crate::webnotify::store::SubscriptionStore;
use crate::webnotify::subscribe::Subscriber;
use crate::webnotify::subscription::Subscription;
use crate::webnotify::transport::MessagingTransport;
use crate::webnotify::types::{Namespace, NodeId};
use crate::webnotify::unsubscribe::Unsubscriber;

/// Tuning shared by all registry operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Attempts per read-compute-commit loop
    pub retries: usize,
    /// Age after which a presence record no longer receives notifications
    pub expiry: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            expiry: DEFAULT_EXPIRY,
        }
    }
}

/// Entry point to the web notification registry: who is subscribed where,
/// and pushing payloads to those nodes.
pub struct WebNotifyRegistry {
    store: Arc<dyn SubscriptionStore>,
    subscriber: Subscriber,
    unsubscriber: Unsubscriber,
    notifier: Notifier,
}

impl WebNotifyRegistry {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn MessagingTransport>,
        clock: Arc<dyn Clock>,
        options: RegistryOptions,
    ) -> Self {
        info!(
            "Web notify registry using {} retries and {}s expiry",
            options.retries,
            options.expiry.as_secs()
        );

        Self {
            subscriber: Subscriber::with_retries(store.clone(), clock.clone(), options.retries),
            unsubscriber: Unsubscriber::with_retries(store.clone(), options.retries),
            notifier: Notifier::new(store.clone(), transport, clock)
                .with_retries(options.retries)
                .with_expiry(options.expiry),
            store,
        }
    }

    /// A web/poll session for `user_uid` opened on `node`
    pub fn subscribe(&self, user_uid: &str, node: NodeId) -> Result<bool> {
        self.subscriber.subscribe(user_uid, node)
    }

    /// A web/poll session for `user_uid` closed on `node`
    pub fn unsubscribe(&self, user_uid: &str, node: NodeId) -> Result<bool> {
        self.unsubscriber.unsubscribe(user_uid, node)
    }

    /// Push `payload` to every node with a live session of `user_uid`
    pub fn notify(&self, user_uid: &str, payload: &str) -> Result<NotifyReport> {
        self.notifier.notify(user_uid, payload)
    }

    /// Current stored subscription, expired records included
    pub fn subscription(&self, user_uid: &str) -> Result<Option<Subscription>> {
        self.store.get(Namespace::WebNotify, user_uid)
    }
}
