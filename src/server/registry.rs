//! Process-wide table of live subscriptions.
//!
//! The registry owns every [`Subscription`], indexed by [`SubscriberId`] for
//! O(1) lookup and by resource path for O(k) fan-out. Both indexes live
//! behind one mutex, so subscribe, supersede, remove and advertise are
//! serialized against each other.
//!
//! # Lock Ordering
//!
//! The registry lock may be held while taking a subscription's queue lock
//! (fan-out), never the reverse: subscriptions run their close callback, which
//! re-enters the registry, only after releasing their own lock, and the
//! registry closes superseded or overflowing subscriptions only after
//! releasing its own.

use super::subscription::{Offer, Subscription};
use crate::error::{BraidError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Identity of one subscriber on one resource.
///
/// The peer token is the client's `Peer` header or a server-issued token;
/// pairing it with the resource lets one peer watch several resources while
/// holding at most one subscription per resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId {
    peer: String,
    resource: String,
}

impl SubscriberId {
    /// Build an id from a peer token and a resource path.
    pub fn new(peer: impl Into<String>, resource: impl Into<String>) -> Self {
        SubscriberId {
            peer: peer.into(),
            resource: resource.into(),
        }
    }

    /// The peer token.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The resource path.
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.peer, self.resource)
    }
}

#[derive(Default)]
struct Table {
    by_id: HashMap<SubscriberId, Subscription>,
    by_resource: HashMap<String, HashSet<SubscriberId>>,
}

impl Table {
    fn attach(&mut self, subscription: Subscription) {
        let id = subscription.id().clone();
        self.by_resource
            .entry(subscription.resource().to_string())
            .or_default()
            .insert(id.clone());
        self.by_id.insert(id, subscription);
    }

    /// Remove `id` from both indexes, optionally only if it is still `serial`.
    fn detach(&mut self, id: &SubscriberId, serial: Option<u64>) -> Option<Subscription> {
        if let Some(serial) = serial {
            if self.by_id.get(id).map(Subscription::serial) != Some(serial) {
                return None;
            }
        }

        let subscription = self.by_id.remove(id)?;
        if let Some(ids) = self.by_resource.get_mut(subscription.resource()) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_resource.remove(subscription.resource());
            }
        }
        Some(subscription)
    }
}

#[derive(Default)]
struct Shared {
    table: Mutex<Table>,
    next_serial: AtomicU64,
    queue_limit: usize,
}

/// Registry of live subscriptions.
///
/// Construct one per server and share it by cloning; clones are handles to
/// the same table.
///
/// # Examples
///
/// ```
/// use braid_axum_server::server::{SubscriberId, SubscriptionRegistry};
///
/// let registry = SubscriptionRegistry::new();
/// let sub = registry.subscribe("/post/1", SubscriberId::new("alice", "/post/1"), || {});
///
/// assert_eq!(registry.advertise("/post/1", "Version: 1\r\n\r\n"), 1);
/// assert_eq!(sub.queued(), 1);
///
/// sub.close();
/// assert!(registry.is_empty());
/// ```
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    shared: Arc<Shared>,
}

impl SubscriptionRegistry {
    /// Create an empty registry whose subscriptions queue without bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that drops any subscriber with more than
    /// `limit` undelivered updates (0 = unbounded).
    ///
    /// A dropped subscriber is closed exactly as if it had disconnected.
    pub fn with_queue_limit(limit: usize) -> Self {
        SubscriptionRegistry {
            shared: Arc::new(Shared {
                queue_limit: limit,
                ..Shared::default()
            }),
        }
    }

    /// Per-subscriber queue limit (0 = unbounded).
    pub fn queue_limit(&self) -> usize {
        self.shared.queue_limit
    }

    /// Install a new active subscription for `id` on `resource`.
    ///
    /// An existing subscription for the same `id` is superseded: it is removed
    /// from the indexes together with the installation of the new one and
    /// closed before this call returns, firing its close callback once.
    ///
    /// `on_closed` runs exactly once, after the new subscription has been
    /// removed from the registry, when it is closed for any reason.
    pub fn subscribe(
        &self,
        resource: impl Into<String>,
        id: SubscriberId,
        on_closed: impl FnOnce() + Send + 'static,
    ) -> Subscription {
        match self.install(resource.into(), id, None, on_closed) {
            Ok(subscription) => subscription,
            Err(_) => unreachable!("unbounded install cannot fail"),
        }
    }

    /// Like [`subscribe`](Self::subscribe), but refuses to grow past `max` live subscriptions.
    ///
    /// Superseding an existing subscription never counts against the limit.
    ///
    /// # Errors
    ///
    /// Returns [`BraidError::SubscriptionLimit`] when the registry is full; no
    /// subscription is created and `on_closed` is dropped uncalled.
    pub fn try_subscribe(
        &self,
        resource: impl Into<String>,
        id: SubscriberId,
        max: usize,
        on_closed: impl FnOnce() + Send + 'static,
    ) -> Result<Subscription> {
        self.install(resource.into(), id, Some(max), on_closed)
    }

    fn install(
        &self,
        resource: String,
        id: SubscriberId,
        max: Option<usize>,
        on_closed: impl FnOnce() + Send + 'static,
    ) -> Result<Subscription> {
        let serial = self.shared.next_serial.fetch_add(1, Ordering::Relaxed);
        let registry: Weak<Shared> = Arc::downgrade(&self.shared);
        let key = id.clone();
        let callback = move || {
            if let Some(shared) = registry.upgrade() {
                if shared.table.lock().detach(&key, Some(serial)).is_some() {
                    tracing::info!(subscriber = %key, "subscription closed");
                }
            }
            on_closed();
        };

        let (subscription, superseded) = {
            let mut table = self.shared.table.lock();
            if let Some(max) = max {
                if !table.by_id.contains_key(&id) && table.by_id.len() >= max {
                    tracing::warn!(subscriber = %id, max, "subscription limit reached");
                    return Err(BraidError::SubscriptionLimit(max));
                }
            }

            let subscription = Subscription::new(
                id.clone(),
                resource,
                serial,
                self.shared.queue_limit,
                callback,
            );
            let superseded = table.detach(&id, None);
            table.attach(subscription.clone());
            (subscription, superseded)
        };

        if let Some(old) = superseded {
            tracing::info!(subscriber = %id, "superseding existing subscription");
            old.close();
        }
        tracing::info!(subscriber = %id, resource = subscription.resource(), "subscription opened");

        Ok(subscription)
    }

    /// Push an encoded version to every active subscription on `resource`.
    ///
    /// Returns the number of subscriptions that accepted it. Order across
    /// subscribers is unspecified; each subscriber sees its pushes in FIFO order.
    /// Subscribers whose queue is full are closed and not counted.
    pub fn advertise(&self, resource: &str, wire: impl Into<Bytes>) -> usize {
        let wire = wire.into();
        let mut delivered = 0;
        let mut overflowed = Vec::new();

        {
            let table = self.shared.table.lock();
            let subscriptions = table
                .by_resource
                .get(resource)
                .into_iter()
                .flatten()
                .filter_map(|id| table.by_id.get(id));
            for subscription in subscriptions {
                match subscription.offer(wire.clone()) {
                    Offer::Queued => delivered += 1,
                    Offer::Closed => {}
                    Offer::Overflow => overflowed.push(subscription.clone()),
                }
            }
        }

        for subscription in overflowed {
            subscription.close();
        }

        tracing::debug!(resource, delivered, bytes = wire.len(), "advertised version");
        delivered
    }

    /// Remove and close the subscription for `id`, if any.
    ///
    /// Idempotent; returns whether a subscription was removed.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        let removed = self.shared.table.lock().detach(id, None);
        match removed {
            Some(subscription) => {
                subscription.close();
                true
            }
            None => false,
        }
    }

    /// The live subscription for `id`.
    pub fn get(&self, id: &SubscriberId) -> Option<Subscription> {
        self.shared.table.lock().by_id.get(id).cloned()
    }

    /// Whether a subscription is registered for `id`.
    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.shared.table.lock().by_id.contains_key(id)
    }

    /// Number of subscriptions watching `resource`.
    pub fn subscriber_count(&self, resource: &str) -> usize {
        self.shared
            .table
            .lock()
            .by_resource
            .get(resource)
            .map_or(0, HashSet::len)
    }

    /// Total number of live subscriptions.
    pub fn len(&self) -> usize {
        self.shared.table.lock().by_id.len()
    }

    /// Returns `true` if no subscription is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}
