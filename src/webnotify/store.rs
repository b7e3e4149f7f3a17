use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, warn};

use crate::error::{ErrorCode, Result, WebNotifyError};
use crate::webnotify::subscription::Subscription;
use crate::webnotify::types::Namespace;

/// Cluster-shared key/value space holding one `Subscription` per user.
///
/// Every mutation of the registry goes through `put_if_absent` or `replace`;
/// implementations must make both atomic per key.
pub trait SubscriptionStore: Send + Sync {
    /// Typed read of the value stored under `key`
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Subscription>>;

    /// Insert `value` unless the key is present. Returns the value that was
    /// already there, `None` means the insert happened.
    fn put_if_absent(&self, namespace: Namespace, key: &str, value: &Subscription) -> Result<Option<Subscription>>;

    /// Swap `old` for `new` only if the stored value still equals `old`
    fn replace(&self, namespace: Namespace, key: &str, old: &Subscription, new: &Subscription) -> Result<bool>;
}

/// In-process space backed by a `DashMap`.
///
/// Values are kept serialized, so `get` decodes a fresh copy and `replace`
/// compares against exactly what was written.
pub struct MemorySpace {
    inner: DashMap<(Namespace, String), Bytes>,
    available: AtomicBool,
}

impl Default for MemorySpace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySpace {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Take the space offline (or back online). While offline every
    /// operation fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        debug!("Memory space availability set to {}", available);
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of keys across all namespaces
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(WebNotifyError::new(ErrorCode::StoreUnavailable, "Memory space is offline"))
        }
    }

    fn encode(value: &Subscription) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode(key: &str, raw: &Bytes) -> Result<Subscription> {
        serde_json::from_slice(raw).map_err(|e| {
            warn!("Stored subscription for {} could not be decoded: {}", key, e);
            WebNotifyError::new(ErrorCode::CorruptValue, format!("Undecodable value for {}: {}", key, e))
        })
    }
}

impl SubscriptionStore for MemorySpace {
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Subscription>> {
        self.ensure_available()?;

        match self.inner.get(&(namespace, key.to_string())) {
            Some(entry) => Self::decode(key, entry.value()).map(Some),
            None => Ok(None),
        }
    }

    fn put_if_absent(&self, namespace: Namespace, key: &str, value: &Subscription) -> Result<Option<Subscription>> {
        self.ensure_available()?;
        let encoded = Self::encode(value)?;

        match self.inner.entry((namespace, key.to_string())) {
            Entry::Occupied(existing) => {
                debug!("put_if_absent lost for {}/{}", namespace, key);
                Self::decode(key, existing.get()).map(Some)
            }
            Entry::Vacant(slot) => {
                slot.insert(encoded);
                Ok(None)
            }
        }
    }

    fn replace(&self, namespace: Namespace, key: &str, old: &Subscription, new: &Subscription) -> Result<bool> {
        self.ensure_available()?;
        let expected = Self::encode(old)?;
        let encoded = Self::encode(new)?;

        match self.inner.get_mut(&(namespace, key.to_string())) {
            Some(mut entry) => {
                if *entry.value() == expected {
                    *entry.value_mut() = encoded;
                    Ok(true)
                } else {
                    debug!("replace lost for {}/{}", namespace, key);
                    Ok(false)
                }
            }
            None => Ok(false),
        }
    }
}
