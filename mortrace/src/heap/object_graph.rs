//! The mutable object-reference graph.

use crate::domain::{FieldSlot, ObjId};
use std::collections::HashMap;

/// Directed graph of strong references between objects, keyed by source object
/// and field slot, plus the static (class-level) roots.
///
/// Storing edges by slot rather than as a multiset of targets is what gives
/// field stores overwrite semantics: a stale slot would pin its old target
/// forever. Static roots are slot-keyed for the same reason - the producer
/// retains the static field id, so a later store to the same static field
/// replaces the earlier root.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    edges: HashMap<ObjId, HashMap<FieldSlot, ObjId>>,
    statics: HashMap<FieldSlot, ObjId>,
}

impl ObjectGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` into field `slot` of `target`, replacing whatever the
    /// slot held. `None` clears the slot (the producer stored a null).
    pub fn write_field(&mut self, target: ObjId, slot: FieldSlot, value: Option<ObjId>) {
        match value {
            Some(id) => {
                self.edges.entry(target).or_default().insert(slot, id);
            }
            None => {
                if let Some(slots) = self.edges.get_mut(&target) {
                    slots.remove(&slot);
                    if slots.is_empty() {
                        self.edges.remove(&target);
                    }
                }
            }
        }
    }

    /// Store `value` into the static field `slot`, replacing the prior root
    /// at that slot. `None` clears it.
    pub fn write_static(&mut self, slot: FieldSlot, value: Option<ObjId>) {
        match value {
            Some(id) => {
                self.statics.insert(slot, id);
            }
            None => {
                self.statics.remove(&slot);
            }
        }
    }

    /// Current targets of all of `src`'s slots.
    pub fn neighbors(&self, src: ObjId) -> impl Iterator<Item = ObjId> + '_ {
        self.edges.get(&src).into_iter().flat_map(|slots| slots.values().copied())
    }

    /// Objects currently pinned by a static field.
    pub fn static_roots(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.statics.values().copied()
    }

    /// Drop `id` as an edge source. Edges pointing at `id` from objects dying
    /// in the same batch disappear with their sources; any other edge into a
    /// dead id is inert, since candidates only ever come from the live set.
    pub fn forget(&mut self, id: ObjId) {
        self.edges.remove(&id);
    }

    /// Release every static root (the final-drain analysis runs with none).
    pub fn clear_static_roots(&mut self) {
        self.statics.clear();
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashMap::len).sum()
    }
}
