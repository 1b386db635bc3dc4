//! Fixed-capacity artifact history.
//!
//! [`HistoryRing`] keeps the most recent artifacts for one entity. It
//! has no synchronization of its own; the [`StateStore`] guards it.
//!
//! Read order is always insertion order: oldest first, newest last.
//!
//! [`StateStore`]: crate::store::StateStore

use std::collections::VecDeque;

use touchline_types::Artifact;

/// Errors raised when constructing a [`HistoryRing`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// A ring must hold at least one artifact.
    #[error("history capacity must be at least 1")]
    ZeroCapacity,
}

/// Insertion-ordered FIFO buffer that evicts its oldest artifact when full.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRing {
    items: VecDeque<Artifact>,
    capacity: usize,
}

impl HistoryRing {
    /// Create an empty ring holding at most `capacity` artifacts.
    ///
    /// Storage grows with use; nothing is reserved up front.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ZeroCapacity`] if `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self, HistoryError> {
        if capacity == 0 {
            return Err(HistoryError::ZeroCapacity);
        }
        Ok(Self {
            items: VecDeque::new(),
            capacity,
        })
    }

    /// Append at the tail, evicting exactly the oldest artifact if full.
    ///
    /// Returns the evicted artifact, if any.
    pub fn push(&mut self, artifact: Artifact) -> Option<Artifact> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(artifact);
        evicted
    }

    /// Owned copy of the whole ring, oldest first.
    pub fn snapshot(&self) -> Vec<Artifact> {
        self.items.iter().cloned().collect()
    }

    /// Owned copy of the last `n` artifacts, oldest first.
    pub fn tail(&self, n: usize) -> Vec<Artifact> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }

    /// The most recently pushed artifact.
    pub fn latest(&self) -> Option<&Artifact> {
        self.items.back()
    }

    /// Number of artifacts currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the ring holds no artifacts.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of artifacts the ring holds.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn artifact(n: usize) -> Artifact {
        Artifact::new("run", 0.5, format!("artifact {n}"), Vec::new()).unwrap()
    }

    fn reasons(items: &[Artifact]) -> Vec<String> {
        items.iter().map(|a| a.reasoning.clone()).collect()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(HistoryRing::new(0), Err(HistoryError::ZeroCapacity));
    }

    #[test]
    fn huge_capacity_does_not_reserve_storage() {
        let mut ring = HistoryRing::new(usize::MAX / 2).unwrap();
        assert!(ring.is_empty());
        assert!(ring.push(artifact(0)).is_none());
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.capacity(), usize::MAX / 2);
    }

    #[test]
    fn keeps_last_k_in_insertion_order() {
        for capacity in [1_usize, 3, 10] {
            for pushes in capacity..capacity.saturating_mul(3) {
                let mut ring = HistoryRing::new(capacity).unwrap();
                for n in 0..pushes {
                    ring.push(artifact(n));
                }
                let expected: Vec<String> = (pushes.saturating_sub(capacity)..pushes)
                    .map(|n| format!("artifact {n}"))
                    .collect();
                assert_eq!(ring.len(), capacity);
                assert_eq!(reasons(&ring.snapshot()), expected);
            }
        }
    }

    #[test]
    fn push_reports_the_evicted_artifact() {
        let mut ring = HistoryRing::new(2).unwrap();
        assert!(ring.push(artifact(0)).is_none());
        assert!(ring.push(artifact(1)).is_none());
        let evicted = ring.push(artifact(2)).unwrap();
        assert_eq!(evicted.reasoning, "artifact 0");
    }

    #[test]
    fn snapshot_is_detached_from_later_pushes() {
        let mut ring = HistoryRing::new(3).unwrap();
        ring.push(artifact(0));
        let copy = ring.snapshot();
        ring.push(artifact(1));
        assert_eq!(copy.len(), 1);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn tail_and_latest() {
        let mut ring = HistoryRing::new(5).unwrap();
        assert!(ring.latest().is_none());
        assert!(ring.tail(3).is_empty());
        for n in 0..4 {
            ring.push(artifact(n));
        }
        assert_eq!(reasons(&ring.tail(2)), ["artifact 2", "artifact 3"]);
        assert_eq!(ring.tail(10).len(), 4);
        assert!(ring.tail(0).is_empty());
        assert_eq!(ring.latest().unwrap().reasoning, "artifact 3");
    }
}
