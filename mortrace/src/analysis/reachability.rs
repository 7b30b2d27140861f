//! BFS reachability over the object graph and death-event emission.

use crate::domain::{DeathEvent, LogicalTime, ObjId};
use crate::heap::{LiveSet, ObjectGraph, RootStacks};
use std::collections::{HashMap, HashSet, VecDeque};

/// Last logical time each object was seen in a last-use witness record.
/// Built by the offline tracker's first pass; absent in online mode.
pub type WitnessMap = HashMap<ObjId, LogicalTime>;

/// Compute which live objects are unreachable and retire them.
///
/// Seeds a breadth-first walk with the stack roots and static roots, collects
/// the reachable set, then iterates the live set in allocation order and
/// retires every object the walk missed: the object leaves the live set, its
/// outgoing edges leave the graph, and a death event stamped `now` is
/// returned. The returned batch preserves allocation order.
///
/// When `witness` is present, an unreachable object whose last witnessed use
/// lies in the future is skipped - the trace still uses it, and reporting the
/// death now would put a use after a death. It stays a candidate for the next
/// analysis.
///
/// Edges into ids that are not live keep nothing alive beyond the missing id;
/// malformed graph state is a non-event here.
#[must_use]
pub fn run_analysis(
    live: &mut LiveSet,
    graph: &mut ObjectGraph,
    roots: &RootStacks,
    now: LogicalTime,
    witness: Option<&WitnessMap>,
) -> Vec<DeathEvent> {
    let mut reachable: HashSet<ObjId> = HashSet::new();
    let mut frontier: VecDeque<ObjId> = VecDeque::new();

    for id in roots.roots().chain(graph.static_roots()) {
        if reachable.insert(id) {
            frontier.push_back(id);
        }
    }

    while let Some(id) = frontier.pop_front() {
        // An id missing from the live set ends the walk: its own edges keep
        // nothing alive beyond it.
        if !live.contains(id) {
            continue;
        }
        for next in graph.neighbors(id) {
            if reachable.insert(next) {
                frontier.push_back(next);
            }
        }
    }

    let candidates: Vec<ObjId> = live.ids().filter(|id| !reachable.contains(id)).collect();

    let mut deaths = Vec::with_capacity(candidates.len());
    for id in candidates {
        if let Some(map) = witness {
            if map.get(&id).is_some_and(|&last_use| last_use > now) {
                continue;
            }
        }
        // Candidates come straight from the live set, so removal cannot miss.
        let Ok(info) = live.remove(id) else { continue };
        graph.forget(id);
        deaths.push(DeathEvent { id, thread: info.thread, time: now });
    }
    deaths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AllocInfo, FieldSlot, ThreadId};

    fn obj(raw: u64) -> ObjId {
        ObjId::from_raw(raw).expect("nonzero id")
    }

    fn alloc(live: &mut LiveSet, raw: u64) {
        live.insert(
            obj(raw),
            AllocInfo {
                size: 8,
                type_id: 1,
                site: 1,
                length: 0,
                thread: ThreadId(1),
                time: LogicalTime(1),
            },
        )
        .expect("fresh id");
    }

    #[test]
    fn test_unrooted_objects_die_in_allocation_order() {
        let mut live = LiveSet::new();
        let mut graph = ObjectGraph::new();
        let roots = RootStacks::new();
        alloc(&mut live, 102);
        alloc(&mut live, 100);
        alloc(&mut live, 101);

        let deaths = run_analysis(&mut live, &mut graph, &roots, LogicalTime(4), None);
        let ids: Vec<u64> = deaths.iter().map(|d| d.id.raw()).collect();
        assert_eq!(ids, vec![102, 100, 101]);
        assert!(deaths.iter().all(|d| d.time == LogicalTime(4)));
        assert!(live.is_empty());
    }

    #[test]
    fn test_chain_from_stack_root_survives() {
        let mut live = LiveSet::new();
        let mut graph = ObjectGraph::new();
        let mut roots = RootStacks::new();
        for raw in [100, 101, 102] {
            alloc(&mut live, raw);
        }
        graph.write_field(obj(100), FieldSlot(0), Some(obj(101)));
        graph.write_field(obj(101), FieldSlot(0), Some(obj(102)));
        roots.push(ThreadId(1), Some(obj(100)));

        let deaths = run_analysis(&mut live, &mut graph, &roots, LogicalTime(3), None);
        assert!(deaths.is_empty());
        assert_eq!(live.len(), 3);
    }

    #[test]
    fn test_unreachable_cycle_is_collected() {
        let mut live = LiveSet::new();
        let mut graph = ObjectGraph::new();
        let roots = RootStacks::new();
        alloc(&mut live, 100);
        alloc(&mut live, 101);
        graph.write_field(obj(100), FieldSlot(0), Some(obj(101)));
        graph.write_field(obj(101), FieldSlot(0), Some(obj(100)));

        let deaths = run_analysis(&mut live, &mut graph, &roots, LogicalTime(2), None);
        assert_eq!(deaths.len(), 2);
        assert!(live.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_static_root_pins_transitively() {
        let mut live = LiveSet::new();
        let mut graph = ObjectGraph::new();
        let roots = RootStacks::new();
        for raw in [100, 101, 102] {
            alloc(&mut live, raw);
        }
        graph.write_field(obj(100), FieldSlot(0), Some(obj(101)));
        graph.write_field(obj(101), FieldSlot(0), Some(obj(102)));
        graph.write_static(FieldSlot(5), Some(obj(100)));

        let deaths = run_analysis(&mut live, &mut graph, &roots, LogicalTime(3), None);
        assert!(deaths.is_empty());

        graph.write_static(FieldSlot(5), None);
        let deaths = run_analysis(&mut live, &mut graph, &roots, LogicalTime(4), None);
        assert_eq!(deaths.len(), 3);
    }

    #[test]
    fn test_future_witness_defers_death() {
        let mut live = LiveSet::new();
        let mut graph = ObjectGraph::new();
        let roots = RootStacks::new();
        alloc(&mut live, 100);
        let witness: WitnessMap = [(obj(100), LogicalTime(5))].into_iter().collect();

        let deaths =
            run_analysis(&mut live, &mut graph, &roots, LogicalTime(3), Some(&witness));
        assert!(deaths.is_empty());
        assert!(live.contains(obj(100)));

        let deaths =
            run_analysis(&mut live, &mut graph, &roots, LogicalTime(5), Some(&witness));
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].time, LogicalTime(5));
    }

    #[test]
    fn test_walk_stops_at_id_missing_from_live_set() {
        let mut live = LiveSet::new();
        let mut graph = ObjectGraph::new();
        let mut roots = RootStacks::new();
        alloc(&mut live, 100);
        // 999 was never allocated; the walk marks it but goes no further,
        // so its edge pins nothing.
        roots.push(ThreadId(1), Some(obj(999)));
        graph.write_field(obj(999), FieldSlot(0), Some(obj(100)));

        let deaths = run_analysis(&mut live, &mut graph, &roots, LogicalTime(2), None);
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].id, obj(100));
    }
}
