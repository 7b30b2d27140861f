//! The set of objects currently believed alive.

use crate::domain::{AllocInfo, ObjId, TrackError};
use indexmap::IndexMap;

/// Objects that have been allocated and not yet reported dead.
///
/// Backed by an insertion-ordered map so that [`LiveSet::ids`] iterates in
/// allocation order. That order is what makes death-candidate iteration (and
/// therefore death-record order within an analysis batch) reproducible across
/// runs and identical between online and offline modes.
#[derive(Debug, Default)]
pub struct LiveSet {
    objects: IndexMap<ObjId, AllocInfo>,
}

impl LiveSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an allocation.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::DuplicateAlloc`] if `id` is already live. The new
    /// `info` still replaces the old one (the producer's latest claim wins)
    /// and the id keeps its original position in allocation order, so a
    /// duplicate does not perturb candidate order.
    pub fn insert(&mut self, id: ObjId, info: AllocInfo) -> Result<(), TrackError> {
        match self.objects.insert(id, info) {
            Some(_) => Err(TrackError::DuplicateAlloc { id }),
            None => Ok(()),
        }
    }

    /// Remove a dead object, yielding its allocation info.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::UnknownObj`] if `id` is not live.
    pub fn remove(&mut self, id: ObjId) -> Result<AllocInfo, TrackError> {
        // shift_remove keeps the remaining ids in allocation order
        self.objects.shift_remove(&id).ok_or(TrackError::UnknownObj { id })
    }

    #[must_use]
    pub fn contains(&self, id: ObjId) -> bool {
        self.objects.contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: ObjId) -> Option<&AllocInfo> {
        self.objects.get(&id)
    }

    /// Live ids in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.objects.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LogicalTime, ThreadId};

    fn obj(raw: u64) -> ObjId {
        ObjId::from_raw(raw).expect("nonzero id")
    }

    fn info(size: u64) -> AllocInfo {
        AllocInfo {
            size,
            type_id: 1,
            site: 1,
            length: 0,
            thread: ThreadId(1),
            time: LogicalTime(1),
        }
    }

    #[test]
    fn test_insert_and_remove() {
        let mut live = LiveSet::new();
        live.insert(obj(100), info(8)).expect("fresh id");
        assert!(live.contains(obj(100)));
        let removed = live.remove(obj(100)).expect("live id");
        assert_eq!(removed.size, 8);
        assert!(live.is_empty());
    }

    #[test]
    fn test_duplicate_insert_reports_and_overwrites() {
        let mut live = LiveSet::new();
        live.insert(obj(100), info(8)).expect("fresh id");
        let err = live.insert(obj(100), info(16)).expect_err("duplicate");
        assert_eq!(err, TrackError::DuplicateAlloc { id: obj(100) });
        assert_eq!(live.get(obj(100)).map(|i| i.size), Some(16));
        assert_eq!(live.len(), 1);
    }

    #[test]
    fn test_remove_unknown_fails() {
        let mut live = LiveSet::new();
        let err = live.remove(obj(42)).expect_err("never allocated");
        assert_eq!(err, TrackError::UnknownObj { id: obj(42) });
    }

    #[test]
    fn test_ids_iterate_in_allocation_order_across_removal() {
        let mut live = LiveSet::new();
        for raw in [30, 10, 20, 40] {
            live.insert(obj(raw), info(8)).expect("fresh id");
        }
        live.remove(obj(10)).expect("live id");
        let order: Vec<u64> = live.ids().map(ObjId::raw).collect();
        assert_eq!(order, vec![30, 20, 40]);
    }
}
