//! Authoritative in-process state for tracked entities.
//!
//! [`StateStore`] maps each [`EntityId`] to its latest snapshot and its
//! [`HistoryRing`] of artifacts. It is the single source of truth: the
//! poller is its only writer, while REST handlers and the broadcaster
//! read from it concurrently.
//!
//! # Concurrency
//!
//! One whole-store [`RwLock`] guards every entry. Writes are short and
//! never await, so readers are never held up for longer than one map
//! update. [`StateStore::apply`] performs the snapshot replacement and
//! the artifact append under a single write guard, so a reader never
//! observes a snapshot paired with an artifact from a different tick.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use touchline_types::{Artifact, EntityId, EntitySnapshot, EntityStatus};
use tracing::{debug, warn};

use crate::history::{HistoryError, HistoryRing};

/// One entity's snapshot and full history, copied out of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityView {
    /// Current snapshot.
    pub snapshot: EntitySnapshot,
    /// Every retained artifact, oldest first.
    pub history: Vec<Artifact>,
}

impl EntityView {
    /// The most recent artifact, if any.
    pub fn latest_artifact(&self) -> Option<&Artifact> {
        self.history.last()
    }
}

/// One entity's snapshot, latest artifact and a short history tail.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestView {
    /// Current snapshot.
    pub snapshot: EntitySnapshot,
    /// Most recent artifact, if any.
    pub latest_artifact: Option<Artifact>,
    /// Up to the requested number of most recent artifacts, oldest first.
    pub history_tail: Vec<Artifact>,
}

/// What a call to [`StateStore::apply`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedChange {
    /// The entity was not tracked before this call.
    pub inserted: bool,
    /// Status or a tracked field differs from the prior snapshot.
    pub snapshot_changed: bool,
    /// An artifact was recorded whose prediction differs from the prior tail.
    pub artifact_changed: bool,
    /// An artifact was recorded at all.
    pub artifact_recorded: bool,
}

impl AppliedChange {
    /// Whether subscribers should hear about this change.
    pub const fn is_publishable(&self) -> bool {
        self.snapshot_changed || self.artifact_changed
    }
}

#[derive(Debug)]
struct EntityRecord {
    snapshot: EntitySnapshot,
    history: HistoryRing,
}

/// Concurrent map from entity id to `(snapshot, history)`.
#[derive(Debug)]
pub struct StateStore {
    entries: RwLock<BTreeMap<EntityId, EntityRecord>>,
    /// Cloned for every new entity so ring construction cannot fail later.
    empty_history: HistoryRing,
}

impl StateStore {
    /// Create an empty store whose rings hold `history_capacity` artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ZeroCapacity`] if `history_capacity` is 0.
    pub fn new(history_capacity: usize) -> Result<Self, HistoryError> {
        Ok(Self {
            entries: RwLock::new(BTreeMap::new()),
            empty_history: HistoryRing::new(history_capacity)?,
        })
    }

    /// Per-entity history capacity.
    pub const fn history_capacity(&self) -> usize {
        self.empty_history.capacity()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert or replace the snapshot for `snapshot.id`.
    ///
    /// Returns whether the status or any tracked field differs from the
    /// prior value. A newly inserted entity always counts as changed.
    pub fn upsert(&self, snapshot: EntitySnapshot) -> bool {
        let mut entries = self.write();
        upsert_locked(&mut entries, &self.empty_history, snapshot).1
    }

    /// Append `artifact` to the history of `id`.
    ///
    /// An unknown `id` is a caller bug: the artifact is dropped with a
    /// warning and no entity is created. Returns whether it was recorded.
    pub fn record_artifact(&self, id: &EntityId, artifact: Artifact) -> bool {
        let mut entries = self.write();
        let Some(record) = entries.get_mut(id) else {
            warn!(entity = %id, "artifact recorded for unknown entity; dropped");
            return false;
        };
        record.history.push(artifact);
        true
    }

    /// Replace the snapshot and append the artifact under one write guard.
    pub fn apply(&self, snapshot: EntitySnapshot, artifact: Option<Artifact>) -> AppliedChange {
        let mut entries = self.write();
        let id = snapshot.id.clone();
        let (inserted, snapshot_changed) =
            upsert_locked(&mut entries, &self.empty_history, snapshot);

        let mut change = AppliedChange {
            inserted,
            snapshot_changed,
            ..AppliedChange::default()
        };

        if let (Some(artifact), Some(record)) = (artifact, entries.get_mut(&id)) {
            change.artifact_changed = record
                .history
                .latest()
                .is_none_or(|prev| !prev.predicts_same_as(&artifact));
            change.artifact_recorded = true;
            if record.history.push(artifact).is_some() {
                debug!(entity = %id, "history full; oldest artifact evicted");
            }
        }

        change
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Current snapshot and full history of `id`.
    pub fn get(&self, id: &EntityId) -> Option<EntityView> {
        self.read().get(id).map(|record| EntityView {
            snapshot: record.snapshot.clone(),
            history: record.history.snapshot(),
        })
    }

    /// Current snapshot, latest artifact, and the last `tail` artifacts of `id`.
    pub fn latest(&self, id: &EntityId, tail: usize) -> Option<LatestView> {
        self.read().get(id).map(|record| LatestView {
            snapshot: record.snapshot.clone(),
            latest_artifact: record.history.latest().cloned(),
            history_tail: record.history.tail(tail),
        })
    }

    /// The last `limit` artifacts of `id` (all of them when `None`), oldest first.
    pub fn history(&self, id: &EntityId, limit: Option<usize>) -> Option<Vec<Artifact>> {
        self.read().get(id).map(|record| match limit {
            Some(n) => record.history.tail(n),
            None => record.history.snapshot(),
        })
    }

    /// Status of `id`, if tracked.
    pub fn status(&self, id: &EntityId) -> Option<EntityStatus> {
        self.read().get(id).map(|record| record.snapshot.status)
    }

    /// Whether `id` is tracked.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.read().contains_key(id)
    }

    /// Every entity currently in `live` status.
    pub fn list_active(&self) -> Vec<EntityId> {
        self.read()
            .iter()
            .filter(|(_, record)| record.snapshot.status.is_live())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every tracked entity, live or not.
    pub fn list(&self) -> Vec<EntityId> {
        self.read().keys().cloned().collect()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no entity is tracked.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the guard cannot leave a record half-written
    // (every mutation is a single insert or push), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<EntityId, EntityRecord>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<EntityId, EntityRecord>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns `(inserted, changed)`.
fn upsert_locked(
    entries: &mut BTreeMap<EntityId, EntityRecord>,
    empty_history: &HistoryRing,
    snapshot: EntitySnapshot,
) -> (bool, bool) {
    match entries.get_mut(&snapshot.id) {
        Some(record) => {
            let changed = record.snapshot.differs_from(&snapshot);
            record.snapshot = snapshot;
            (false, changed)
        }
        None => {
            entries.insert(
                snapshot.id.clone(),
                EntityRecord {
                    snapshot,
                    history: empty_history.clone(),
                },
            );
            (true, true)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use touchline_types::fields;

    use super::*;

    fn live(id: &str) -> EntitySnapshot {
        EntitySnapshot::new(EntityId::from(id), EntityStatus::Live)
            .with_field(fields::DOWN, 1)
            .with_field(fields::DISTANCE, 10)
    }

    fn artifact(category: &str, confidence: f64) -> Artifact {
        Artifact::new(category, confidence, "", Vec::new()).unwrap()
    }

    #[test]
    fn upsert_then_get_returns_written_snapshot() {
        let store = StateStore::new(100).unwrap();
        let snap = live("G1").with_field(fields::HOME_SCORE, 7);
        assert!(store.upsert(snap.clone()));

        let view = store.get(&EntityId::from("G1")).unwrap();
        assert_eq!(view.snapshot, snap);
        assert!(view.history.is_empty());
    }

    #[test]
    fn upsert_reports_only_real_changes() {
        let store = StateStore::new(10).unwrap();
        assert!(store.upsert(live("G1")));
        // Same fields, later observation time.
        assert!(!store.upsert(live("G1")));
        assert!(store.upsert(live("G1").with_field(fields::DOWN, 2)));

        let mut finished = live("G1").with_field(fields::DOWN, 2);
        finished.status = EntityStatus::Finished;
        assert!(store.upsert(finished));
    }

    #[test]
    fn record_artifact_for_unknown_entity_is_a_no_op() {
        let store = StateStore::new(10).unwrap();
        assert!(!store.record_artifact(&EntityId::from("ghost"), artifact("run", 0.5)));
        assert!(store.is_empty());
        assert!(store.get(&EntityId::from("ghost")).is_none());
    }

    #[test]
    fn g1_scenario_bounded_history() {
        let store = StateStore::new(100).unwrap();
        let id = EntityId::from("G1");
        store.upsert(live("G1"));
        assert!(store.record_artifact(&id, artifact("run", 0.6)));

        let view = store.get(&id).unwrap();
        assert_eq!(view.snapshot.status, EntityStatus::Live);
        assert_eq!(view.history.len(), 1);
        assert_eq!(view.history.first().unwrap().category, "run");

        // 101 artifacts in total.
        for n in 1..=100 {
            let a = Artifact::new("pass", 0.5, format!("#{n}"), Vec::new()).unwrap();
            store.record_artifact(&id, a);
        }
        let view = store.get(&id).unwrap();
        assert_eq!(view.history.len(), 100);
        assert_eq!(view.history.first().unwrap().reasoning, "#1");
        assert_eq!(view.latest_artifact().unwrap().reasoning, "#100");
    }

    #[test]
    fn apply_reports_artifact_changes() {
        let store = StateStore::new(5).unwrap();
        let first = store.apply(live("G1"), Some(artifact("run", 0.6)));
        assert!(first.inserted && first.snapshot_changed && first.artifact_changed);

        // Same snapshot, same prediction: recorded but nothing to publish.
        let repeat = store.apply(live("G1"), Some(artifact("run", 0.6)));
        assert!(repeat.artifact_recorded);
        assert!(!repeat.is_publishable());
        assert_eq!(store.history(&EntityId::from("G1"), None).unwrap().len(), 2);

        let flipped = store.apply(live("G1"), Some(artifact("pass", 0.6)));
        assert!(flipped.artifact_changed && !flipped.snapshot_changed);

        let no_artifact = store.apply(live("G1").with_field(fields::DOWN, 4), None);
        assert!(no_artifact.snapshot_changed && !no_artifact.artifact_recorded);
    }

    #[test]
    fn list_active_excludes_finished_entities() {
        let store = StateStore::new(5).unwrap();
        store.upsert(live("A"));
        store.upsert(live("B"));
        let mut done = live("B");
        done.status = EntityStatus::Finished;
        store.upsert(done);

        assert_eq!(store.list_active(), vec![EntityId::from("A")]);
        assert_eq!(store.list().len(), 2);
        assert_eq!(
            store.status(&EntityId::from("B")),
            Some(EntityStatus::Finished)
        );
    }

    #[test]
    fn latest_and_limited_history() {
        let store = StateStore::new(5).unwrap();
        let id = EntityId::from("G1");
        store.upsert(live("G1"));
        for n in 0..4 {
            let a = Artifact::new("run", 0.5, format!("#{n}"), Vec::new()).unwrap();
            store.record_artifact(&id, a);
        }
        let latest = store.latest(&id, 2).unwrap();
        assert_eq!(latest.latest_artifact.unwrap().reasoning, "#3");
        assert_eq!(latest.history_tail.len(), 2);
        assert_eq!(store.latest(&id, 0).unwrap().history_tail.len(), 0);
        assert_eq!(store.history(&id, Some(3)).unwrap().len(), 3);
        assert!(store.latest(&EntityId::from("nope"), 1).is_none());
    }

    #[test]
    fn readers_never_see_mismatched_pairs() {
        let store = Arc::new(StateStore::new(8).unwrap());
        let id = EntityId::from("G1");
        store.apply(
            live("G1").with_field("seq", 0),
            Some(Artifact::new("run", 0.5, "0", Vec::new()).unwrap()),
        );

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for seq in 1..500_i64 {
                    let artifact = Artifact::new("run", 0.5, seq.to_string(), Vec::new()).unwrap();
                    store.apply(live("G1").with_field("seq", seq), Some(artifact));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let view = store.latest(&id, 0).unwrap();
                        let seq = view.snapshot.int_field("seq").unwrap();
                        let tail = view.latest_artifact.unwrap().reasoning;
                        assert_eq!(tail, seq.to_string());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
