//! Per-thread stacks of stack-rooted objects.

use crate::domain::{ObjId, ThreadId};
use std::collections::HashMap;

/// One stack of object ids per producer thread: the method receivers pushed
/// on entry and popped on exit. Everything on any stack is a GC root.
///
/// Receivers are the only locals the producer reports, so this
/// under-approximates the true root set; offline mode's witness guard
/// compensates, online mode accepts the approximation.
#[derive(Debug, Default)]
pub struct RootStacks {
    stacks: HashMap<ThreadId, Vec<ObjId>>,
}

impl RootStacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a method receiver. Static methods have no receiver (`None`) and
    /// push nothing; their matching exit may then pop a frame pushed by an
    /// enclosing method. That skew is part of the accepted receiver-only
    /// approximation.
    pub fn push(&mut self, thread: ThreadId, receiver: Option<ObjId>) {
        if let Some(id) = receiver {
            self.stacks.entry(thread).or_default().push(id);
        }
    }

    /// Pop one frame. Underflow is tolerated silently: exception exits can
    /// decouple entry/exit counts, and a receiverless entry pushed nothing.
    pub fn pop(&mut self, thread: ThreadId) {
        if let Some(stack) = self.stacks.get_mut(&thread) {
            stack.pop();
            if stack.is_empty() {
                self.stacks.remove(&thread);
            }
        }
    }

    /// Every object currently on any thread's stack.
    pub fn roots(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.stacks.values().flatten().copied()
    }

    /// Net frames currently held for `thread`.
    #[must_use]
    pub fn depth(&self, thread: ThreadId) -> usize {
        self.stacks.get(&thread).map_or(0, Vec::len)
    }

    /// Drop every stack (the final-drain analysis runs with no stack roots).
    pub fn clear(&mut self) {
        self.stacks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(raw: u64) -> ObjId {
        ObjId::from_raw(raw).expect("nonzero id")
    }

    #[test]
    fn test_push_and_pop_track_depth() {
        let mut roots = RootStacks::new();
        roots.push(ThreadId(1), Some(obj(100)));
        roots.push(ThreadId(1), Some(obj(101)));
        assert_eq!(roots.depth(ThreadId(1)), 2);
        roots.pop(ThreadId(1));
        assert_eq!(roots.depth(ThreadId(1)), 1);
    }

    #[test]
    fn test_receiverless_entry_pushes_nothing() {
        let mut roots = RootStacks::new();
        roots.push(ThreadId(1), None);
        assert_eq!(roots.depth(ThreadId(1)), 0);
        assert_eq!(roots.roots().count(), 0);
    }

    #[test]
    fn test_pop_tolerates_underflow() {
        let mut roots = RootStacks::new();
        roots.pop(ThreadId(1));
        roots.push(ThreadId(1), Some(obj(100)));
        roots.pop(ThreadId(1));
        roots.pop(ThreadId(1));
        assert_eq!(roots.depth(ThreadId(1)), 0);
    }

    #[test]
    fn test_roots_span_threads() {
        let mut roots = RootStacks::new();
        roots.push(ThreadId(1), Some(obj(100)));
        roots.push(ThreadId(2), Some(obj(200)));
        let mut ids: Vec<u64> = roots.roots().map(ObjId::raw).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![100, 200]);
    }
}
