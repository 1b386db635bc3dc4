//! Per-entity fan-out of state updates to live subscribers.
//!
//! The [`Broadcaster`] keeps a registry of subscriptions keyed by
//! entity id. When the poller reports a change it calls
//! [`Broadcaster::publish`], which reads the current pair from the
//! [`StateStore`] and hands one [`Delivery`] to every open subscriber.
//!
//! # Delivery policy
//!
//! Each subscriber owns a bounded [`tokio::sync::broadcast`] channel
//! with a single receiver. Sending never blocks: when a subscriber's
//! buffer is full the oldest queued delivery is overwritten, and the
//! subscriber skips ahead to the newest retained one the next time it
//! reads. A stalled subscriber therefore costs nothing to anyone else.
//!
//! Subscriptions that were closed or dropped are removed from the
//! registry on the next publish for their entity, or immediately on
//! [`Broadcaster::unsubscribe`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use touchline_types::{Delivery, EntityId, SubscriptionId};
use tracing::debug;

use crate::config::MAX_SUBSCRIBER_BUFFER;
use crate::store::StateStore;

#[derive(Debug)]
struct Registration {
    id: SubscriptionId,
    tx: broadcast::Sender<Arc<Delivery>>,
    open: Arc<AtomicBool>,
    history_tail: usize,
}

impl Registration {
    fn is_live(&self) -> bool {
        self.open.load(Ordering::Acquire) && self.tx.receiver_count() > 0
    }
}

/// Fan-out registry from entity id to subscriber channels.
///
/// Holds a read-only handle to the store; it never writes to it.
#[derive(Debug)]
pub struct Broadcaster {
    store: Arc<StateStore>,
    registry: Mutex<BTreeMap<EntityId, Vec<Registration>>>,
    buffer: usize,
}

impl Broadcaster {
    /// Create a broadcaster reading from `store`.
    ///
    /// `buffer` is the per-subscriber queue depth, clamped to
    /// `1..=`[`MAX_SUBSCRIBER_BUFFER`].
    pub fn new(store: Arc<StateStore>, buffer: usize) -> Self {
        Self {
            store,
            registry: Mutex::new(BTreeMap::new()),
            buffer: buffer.clamp(1, MAX_SUBSCRIBER_BUFFER),
        }
    }

    /// Register for updates to `id` without history in deliveries.
    pub fn subscribe(&self, id: EntityId) -> Subscription {
        self.subscribe_with(id, 0)
    }

    /// Register for updates to `id`.
    ///
    /// Each delivery carries up to `history_tail` of the most recent
    /// artifacts. The entity does not need to exist yet; the
    /// subscription simply stays quiet until data arrives.
    pub fn subscribe_with(&self, id: EntityId, history_tail: usize) -> Subscription {
        let (tx, rx) = broadcast::channel(self.buffer);
        let open = Arc::new(AtomicBool::new(true));
        let subscription_id = SubscriptionId::new();

        self.registry()
            .entry(id.clone())
            .or_default()
            .push(Registration {
                id: subscription_id,
                tx,
                open: Arc::clone(&open),
                history_tail,
            });
        debug!(entity = %id, subscription = %subscription_id, history_tail, "subscribed");

        Subscription {
            id: subscription_id,
            entity_id: id,
            history_tail,
            rx,
            open,
        }
    }

    /// Remove `subscription` from the registry and mark it closed.
    ///
    /// Idempotent. Returns whether a registration was removed by this call.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        subscription.open.store(false, Ordering::Release);

        let mut registry = self.registry();
        let Some(registrations) = registry.get_mut(&subscription.entity_id) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != subscription.id);
        let removed = registrations.len() < before;
        if registrations.is_empty() {
            registry.remove(&subscription.entity_id);
        }
        if removed {
            debug!(
                entity = %subscription.entity_id,
                subscription = %subscription.id,
                "unsubscribed"
            );
        }
        removed
    }

    /// Deliver the current state of `id` to every open subscriber.
    ///
    /// Returns the number of subscribers the delivery was queued for.
    /// Nothing is sent if `id` has no subscribers or no data yet.
    pub fn publish(&self, id: &EntityId) -> usize {
        let targets: Vec<(SubscriptionId, broadcast::Sender<Arc<Delivery>>, usize)> = {
            let mut registry = self.registry();
            let Some(registrations) = registry.get_mut(id) else {
                return 0;
            };
            prune(id, registrations);
            if registrations.is_empty() {
                registry.remove(id);
                return 0;
            }
            registrations
                .iter()
                .map(|r| (r.id, r.tx.clone(), r.history_tail))
                .collect()
        };

        let max_tail = targets.iter().map(|(_, _, tail)| *tail).max().unwrap_or(0);
        let Some(view) = self.store.latest(id, max_tail) else {
            debug!(entity = %id, "publish skipped; no data yet");
            return 0;
        };

        let published_at = Utc::now();
        let bare = Arc::new(Delivery {
            entity_id: id.clone(),
            snapshot: view.snapshot.clone(),
            latest_artifact: view.latest_artifact.clone(),
            history: Vec::new(),
            published_at,
        });

        let mut delivered: usize = 0;
        let mut failed = false;
        for (subscription, tx, tail) in targets {
            let delivery = if tail == 0 {
                Arc::clone(&bare)
            } else {
                let skip = view.history_tail.len().saturating_sub(tail);
                Arc::new(Delivery {
                    history: view.history_tail.iter().skip(skip).cloned().collect(),
                    ..(*bare).clone()
                })
            };
            // Fails only when the receiver is gone.
            if tx.send(delivery).is_ok() {
                delivered = delivered.saturating_add(1);
            } else {
                debug!(entity = %id, %subscription, "delivery failed; subscriber gone");
                failed = true;
            }
        }

        if failed {
            let mut registry = self.registry();
            if let Some(registrations) = registry.get_mut(id) {
                prune(id, registrations);
                if registrations.is_empty() {
                    registry.remove(id);
                }
            }
        }

        delivered
    }

    /// The delivery a subscriber of `id` would receive right now.
    ///
    /// Used by transports to greet a new subscriber with the current
    /// state instead of waiting for the next change.
    pub fn current(&self, id: &EntityId, history_tail: usize) -> Option<Delivery> {
        self.store.latest(id, history_tail).map(|view| Delivery {
            entity_id: id.clone(),
            snapshot: view.snapshot,
            latest_artifact: view.latest_artifact,
            history: view.history_tail,
            published_at: Utc::now(),
        })
    }

    /// Number of open subscriptions for `id`.
    pub fn subscriber_count(&self, id: &EntityId) -> usize {
        self.registry()
            .get(id)
            .map_or(0, |regs| regs.iter().filter(|r| r.is_live()).count())
    }

    /// Number of open subscriptions across all entities.
    pub fn total_subscribers(&self) -> usize {
        self.registry()
            .values()
            .flatten()
            .filter(|r| r.is_live())
            .count()
    }

    fn registry(&self) -> MutexGuard<'_, BTreeMap<EntityId, Vec<Registration>>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn prune(id: &EntityId, registrations: &mut Vec<Registration>) {
    registrations.retain(|r| {
        let keep = r.is_live();
        if !keep {
            debug!(entity = %id, subscription = %r.id, "pruned closed subscription");
        }
        keep
    });
}

/// A subscriber's handle on one entity's updates.
///
/// Owned by the transport connection. Dropping it closes it; the
/// broadcaster forgets it on the next publish.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    entity_id: EntityId,
    history_tail: usize,
    rx: broadcast::Receiver<Arc<Delivery>>,
    open: Arc<AtomicBool>,
}

impl Subscription {
    /// Registration id.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The entity this subscription follows.
    pub const fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Number of history artifacts requested per delivery.
    pub const fn history_tail(&self) -> usize {
        self.history_tail
    }

    /// Whether the subscription still accepts deliveries.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Mark the subscription closed without touching the registry.
    ///
    /// The broadcaster drops the registration on its next publish.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Wait for the next delivery.
    ///
    /// Returns `None` once the subscription is closed. If deliveries
    /// were overwritten while this subscriber lagged, it resumes at the
    /// oldest one still queued.
    pub async fn recv(&mut self) -> Option<Arc<Delivery>> {
        loop {
            if !self.is_open() {
                return None;
            }
            match self.rx.recv().await {
                Ok(delivery) => return self.is_open().then_some(delivery),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(entity = %self.entity_id, skipped, "subscriber lagged, skipping ahead");
                }
                Err(RecvError::Closed) => {
                    self.close();
                    return None;
                }
            }
        }
    }

    /// Take a queued delivery without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Delivery>> {
        loop {
            if !self.is_open() {
                return None;
            }
            match self.rx.try_recv() {
                Ok(delivery) => return Some(delivery),
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(entity = %self.entity_id, skipped, "subscriber lagged, skipping ahead");
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.close();
                    return None;
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use touchline_types::{fields, Artifact, EntitySnapshot, EntityStatus};

    use super::*;

    fn setup(buffer: usize) -> (Arc<StateStore>, Broadcaster) {
        let store = Arc::new(StateStore::new(100).unwrap());
        let broadcaster = Broadcaster::new(Arc::clone(&store), buffer);
        (store, broadcaster)
    }

    fn live(id: &str, down: i64) -> EntitySnapshot {
        EntitySnapshot::new(EntityId::from(id), EntityStatus::Live)
            .with_field(fields::DOWN, down)
            .with_field(fields::DISTANCE, 10)
    }

    fn artifact(reason: &str) -> Artifact {
        Artifact::new("run", 0.6, reason, Vec::new()).unwrap()
    }

    #[test]
    fn subscribe_then_publish_delivers_current_state_once() {
        let (store, broadcaster) = setup(8);
        let id = EntityId::from("G1");
        store.apply(live("G1", 1), Some(artifact("a")));

        let mut sub = broadcaster.subscribe(id.clone());
        assert_eq!(broadcaster.publish(&id), 1);

        let delivery = sub.try_recv().unwrap();
        let view = store.get(&id).unwrap();
        assert_eq!(delivery.snapshot, view.snapshot);
        assert_eq!(delivery.latest_artifact.as_ref(), view.latest_artifact());
        assert!(delivery.history.is_empty());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn subscribing_before_data_exists_is_quiet() {
        let (store, broadcaster) = setup(8);
        let id = EntityId::from("G1");
        let mut sub = broadcaster.subscribe(id.clone());

        assert_eq!(broadcaster.publish(&id), 0);
        assert!(sub.try_recv().is_none());

        store.upsert(live("G1", 1));
        assert_eq!(broadcaster.publish(&id), 1);
        let delivery = sub.try_recv().unwrap();
        assert!(delivery.latest_artifact.is_none());
    }

    #[test]
    fn unsubscribed_handle_never_receives_again() {
        let (store, broadcaster) = setup(8);
        let id = EntityId::from("G1");
        store.upsert(live("G1", 1));

        let mut sub = broadcaster.subscribe(id.clone());
        assert!(broadcaster.unsubscribe(&sub));
        // Idempotent.
        assert!(!broadcaster.unsubscribe(&sub));

        for _ in 0..10 {
            assert_eq!(broadcaster.publish(&id), 0);
        }
        assert!(!sub.is_open());
        assert!(sub.try_recv().is_none());
        assert_eq!(broadcaster.subscriber_count(&id), 0);
    }

    #[test]
    fn two_subscribers_one_leaves() {
        let (store, broadcaster) = setup(8);
        let id = EntityId::from("G1");
        store.upsert(live("G1", 1));

        let mut stays = broadcaster.subscribe(id.clone());
        let mut leaves = broadcaster.subscribe(id.clone());
        assert_eq!(broadcaster.subscriber_count(&id), 2);

        broadcaster.unsubscribe(&leaves);
        assert_eq!(broadcaster.publish(&id), 1);
        assert!(stays.try_recv().is_some());
        assert!(leaves.try_recv().is_none());
    }

    #[test]
    fn dropped_subscription_is_pruned_on_publish() {
        let (store, broadcaster) = setup(8);
        let id = EntityId::from("G1");
        store.upsert(live("G1", 1));

        let sub = broadcaster.subscribe(id.clone());
        drop(sub);
        assert_eq!(broadcaster.publish(&id), 0);
        assert_eq!(broadcaster.total_subscribers(), 0);
    }

    #[test]
    fn stalled_subscriber_drops_oldest_and_does_not_block_others() {
        let (store, broadcaster) = setup(2);
        let id = EntityId::from("G1");
        let mut stalled = broadcaster.subscribe(id.clone());
        let mut reader = broadcaster.subscribe(id.clone());

        for down in 1..=5 {
            store.upsert(live("G1", down));
            assert_eq!(broadcaster.publish(&id), 2);
            let got = reader.try_recv().unwrap();
            assert_eq!(got.snapshot.int_field(fields::DOWN), Some(down));
        }

        // Only the two newest survive in the stalled subscriber's queue.
        let downs: Vec<Option<i64>> = std::iter::from_fn(|| stalled.try_recv())
            .map(|d| d.snapshot.int_field(fields::DOWN))
            .collect();
        assert_eq!(downs, [Some(4), Some(5)]);
    }

    #[test]
    fn oversized_buffer_is_clamped() {
        let (store, broadcaster) = setup(usize::MAX);
        let id = EntityId::from("G1");
        let mut sub = broadcaster.subscribe(id.clone());
        store.upsert(live("G1", 1));
        assert_eq!(broadcaster.publish(&id), 1);
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn history_tail_is_per_subscriber() {
        let (store, broadcaster) = setup(8);
        let id = EntityId::from("G1");
        store.upsert(live("G1", 1));
        for reason in ["a", "b", "c", "d"] {
            store.record_artifact(&id, artifact(reason));
        }

        let mut bare = broadcaster.subscribe(id.clone());
        let mut two = broadcaster.subscribe_with(id.clone(), 2);
        let mut many = broadcaster.subscribe_with(id.clone(), 10);
        assert_eq!(broadcaster.publish(&id), 3);

        let reasons = |d: &Delivery| -> Vec<String> {
            d.history.iter().map(|a| a.reasoning.clone()).collect()
        };
        assert!(bare.try_recv().unwrap().history.is_empty());
        assert_eq!(reasons(&two.try_recv().unwrap()), ["c", "d"]);
        assert_eq!(reasons(&many.try_recv().unwrap()), ["a", "b", "c", "d"]);
    }

    #[test]
    fn current_matches_what_publish_would_send() {
        let (store, broadcaster) = setup(8);
        let id = EntityId::from("G1");
        assert!(broadcaster.current(&id, 5).is_none());

        store.apply(live("G1", 2), Some(artifact("a")));
        store.record_artifact(&id, artifact("b"));
        let current = broadcaster.current(&id, 5).unwrap();
        assert_eq!(current.latest_artifact.unwrap().reasoning, "b");
        assert_eq!(current.history.len(), 2);
        // No subscription was created.
        assert_eq!(broadcaster.subscriber_count(&id), 0);
    }

    #[test]
    fn publish_is_scoped_to_the_entity() {
        let (store, broadcaster) = setup(8);
        store.upsert(live("G1", 1));
        store.upsert(live("G2", 1));
        let mut g1 = broadcaster.subscribe(EntityId::from("G1"));
        let mut g2 = broadcaster.subscribe(EntityId::from("G2"));

        broadcaster.publish(&EntityId::from("G2"));
        assert!(g1.try_recv().is_none());
        assert_eq!(g2.try_recv().unwrap().entity_id.as_str(), "G2");
    }

    #[tokio::test]
    async fn recv_wakes_on_publish_and_ends_on_unsubscribe() {
        let (store, broadcaster) = setup(8);
        let broadcaster = Arc::new(broadcaster);
        let id = EntityId::from("G1");
        store.upsert(live("G1", 3));

        let mut sub = broadcaster.subscribe(id.clone());
        let publisher = {
            let broadcaster = Arc::clone(&broadcaster);
            let id = id.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                broadcaster.publish(&id)
            })
        };

        let delivery = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.snapshot.int_field(fields::DOWN), Some(3));
        assert_eq!(publisher.await.unwrap(), 1);

        broadcaster.unsubscribe(&sub);
        let after = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap();
        assert!(after.is_none());
    }
}
