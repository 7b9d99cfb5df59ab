//! Registration bookkeeping and wave planning
//!
//! Kept free of sockets so wave membership can be checked directly: the
//! connection type is a parameter, the coordinator uses live `TcpStream`s
//! and tests use `()`.

use std::collections::HashSet;

use crate::protocol::WorkerId;

/// Result of offering a registration to the [`Registry`]
#[derive(Debug)]
pub enum Admission<C> {
    /// Registered; counts are after admission
    Accepted {
        /// Accepted registrations so far
        registered: usize,
        /// Registrations needed before release
        capacity: usize,
    },
    /// Identity already registered; the connection is handed back
    Duplicate(C),
    /// Registry already holds `capacity` registrations
    Full(C),
}

/// Accepted identities and their connections, in arrival order
#[derive(Debug)]
pub struct Registry<C> {
    capacity: usize,
    ids: HashSet<WorkerId>,
    ready: Vec<(WorkerId, C)>,
}

impl<C> Registry<C> {
    /// Create a registry that is full after `capacity` registrations
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ids: HashSet::with_capacity(capacity),
            ready: Vec::with_capacity(capacity),
        }
    }

    /// Offer a registration
    ///
    /// The first registration of an identity wins; any later one is
    /// refused no matter how close together they arrived.
    pub fn admit(&mut self, id: WorkerId, conn: C) -> Admission<C> {
        if self.ids.contains(&id) {
            return Admission::Duplicate(conn);
        }
        if self.is_full() {
            return Admission::Full(conn);
        }

        self.ids.insert(id);
        self.ready.push((id, conn));

        Admission::Accepted {
            registered: self.ready.len(),
            capacity: self.capacity,
        }
    }

    /// Whether `id` was accepted
    pub fn contains(&self, id: WorkerId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of accepted registrations
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    /// Whether nothing was accepted yet
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// Whether the release threshold is reached
    pub fn is_full(&self) -> bool {
        self.ready.len() >= self.capacity
    }

    /// Registrations needed before release
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Accepted identities in arrival order
    pub fn ids(&self) -> Vec<WorkerId> {
        self.ready.iter().map(|(id, _)| *id).collect()
    }

    /// Consume the registry into waves of `batch_size`
    pub fn into_waves(self, batch_size: usize) -> Vec<Wave<C>> {
        plan_waves(self.ready, batch_size)
    }
}

/// One batch of workers released together
#[derive(Debug)]
pub struct Wave<C> {
    /// Zero-based wave number
    pub index: usize,

    /// Members sorted by identity
    pub members: Vec<(WorkerId, C)>,
}

impl<C> Wave<C> {
    /// Member identities
    pub fn ids(&self) -> Vec<WorkerId> {
        self.members.iter().map(|(id, _)| *id).collect()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the wave has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Sort registrations by identity and slice them into waves
///
/// Membership depends only on the set of identities, never on arrival
/// order. The last wave is short when the count is not a multiple of
/// `batch_size`.
pub fn plan_waves<C>(mut entries: Vec<(WorkerId, C)>, batch_size: usize) -> Vec<Wave<C>> {
    let batch_size = batch_size.max(1);
    entries.sort_by_key(|(id, _)| *id);

    let mut waves: Vec<Wave<C>> = Vec::with_capacity(entries.len().div_ceil(batch_size));
    for entry in entries {
        match waves.last_mut() {
            Some(wave) if wave.members.len() < batch_size => wave.members.push(entry),
            _ => waves.push(Wave {
                index: waves.len(),
                members: vec![entry],
            }),
        }
    }
    waves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<WorkerId> {
        raw.iter().copied().map(WorkerId).collect()
    }

    #[test]
    fn test_duplicate_is_refused() {
        let mut registry = Registry::new(4);
        assert!(matches!(
            registry.admit(WorkerId(1), "first"),
            Admission::Accepted { registered: 1, capacity: 4 }
        ));
        match registry.admit(WorkerId(1), "second") {
            Admission::Duplicate(conn) => assert_eq!(conn, "second"),
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let mut registry = Registry::new(2);
        registry.admit(WorkerId(1), ());
        registry.admit(WorkerId(2), ());
        assert!(registry.is_full());
        assert!(matches!(registry.admit(WorkerId(3), ()), Admission::Full(())));
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(WorkerId(3)));
    }

    #[test]
    fn test_waves_sorted_by_identity() {
        let mut registry = Registry::new(usize::MAX);
        for id in [3, 1, 4, 1, 5, 9, 2, 6] {
            registry.admit(WorkerId(id), ());
        }
        assert_eq!(registry.ids(), ids(&[3, 1, 4, 5, 9, 2, 6]));

        let waves = registry.into_waves(3);
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0].ids(), ids(&[1, 2, 3]));
        assert_eq!(waves[1].ids(), ids(&[4, 5, 6]));
        assert_eq!(waves[2].ids(), ids(&[9]));
        assert_eq!(
            waves.iter().map(|w| w.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_waves_independent_of_arrival_order() {
        let forward: Vec<_> = (0..10).map(|i| (WorkerId(i), ())).collect();
        let backward: Vec<_> = (0..10).rev().map(|i| (WorkerId(i), ())).collect();

        let a: Vec<_> = plan_waves(forward, 4).iter().map(Wave::ids).collect();
        let b: Vec<_> = plan_waves(backward, 4).iter().map(Wave::ids).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_plan_waves_empty() {
        let waves = plan_waves::<()>(Vec::new(), 3);
        assert!(waves.is_empty());
    }
}
