//! In-process tracking: the callback surface the instrumenter drives.
//!
//! Callbacks arrive from arbitrary producer threads. One coarse mutex guards
//! the whole tracker state (clock, live set, graph, root stacks, scheduling
//! counter, sink): every callback locks, applies its transition, emits its
//! record, and unlocks. A scheduled analysis runs under the same exclusive
//! hold, so it sees a consistent snapshot and its death batch lands in the
//! trace directly after the exit record that triggered it, before any later
//! callback's record.

use crate::analysis::run_analysis;
use crate::domain::{AllocInfo, DeathEvent, FieldSlot, LogicalTime, ObjId, ThreadId};
use crate::heap::{LiveSet, LogicalClock, ObjectGraph, RootStacks};
use crate::tracking::{RecordSink, TrackStats, TrackerConfig};
use log::{error, warn};
use mortrace_common::{AllocRecord, TraceRecord};
use parking_lot::Mutex;

/// Object-death tracker for online mode.
///
/// Owns the trace: every callback appends its own record to the sink, and
/// death records (`D id thread`, time implicit from position) are appended
/// right after the method exit whose analysis produced them.
pub struct OnlineTracker<S: RecordSink> {
    state: Mutex<State<S>>,
}

struct State<S> {
    clock: LogicalClock,
    live: LiveSet,
    graph: ObjectGraph,
    roots: RootStacks,
    sink: S,
    events_since_analysis: u64,
    analysis_interval: u64,
    final_drain: bool,
    stats: TrackStats,
}

impl<S: RecordSink> OnlineTracker<S> {
    #[must_use]
    pub fn new(config: &TrackerConfig, sink: S) -> Self {
        Self {
            state: Mutex::new(State {
                clock: LogicalClock::new(),
                live: LiveSet::new(),
                graph: ObjectGraph::new(),
                roots: RootStacks::new(),
                sink,
                events_since_analysis: 0,
                analysis_interval: config.analysis_interval,
                final_drain: config.final_drain,
                stats: TrackStats::default(),
            }),
        }
    }

    /// Object allocation. `length > 0` marks an array allocation.
    pub fn on_alloc(&self, id: u64, size: u64, type_id: u32, site: u32, length: u32, thread: u32) {
        let mut state = self.state.lock();
        state.count_event();
        state.stats.allocs += 1;
        if let Some(obj) = ObjId::from_raw(id) {
            let info = AllocInfo {
                size,
                type_id,
                site,
                length,
                thread: ThreadId(thread),
                time: state.clock.now(),
            };
            if let Err(e) = state.live.insert(obj, info) {
                warn!("{e}; keeping the newer allocation");
            }
        } else {
            warn!("allocation callback for reserved id 0; ignored");
            return;
        }
        state.emit(&TraceRecord::Alloc(AllocRecord {
            id,
            size,
            type_id,
            site,
            length,
            thread,
            array: length > 0,
        }));
    }

    /// Method entry: ticks the clock and pushes the receiver (if any).
    pub fn on_method_entry(&self, method: u64, receiver: u64, thread: u32) {
        let mut state = self.state.lock();
        state.count_event();
        state.clock.on_method_boundary();
        let tid = ThreadId(thread);
        state.roots.push(tid, ObjId::from_raw(receiver));
        state.emit(&TraceRecord::MethodEntry { method, receiver, thread });
    }

    /// Method exit: ticks the clock, pops one frame, and runs a reachability
    /// analysis if the scheduling interval has elapsed.
    pub fn on_method_exit(&self, method: u64, thread: u32) {
        let mut state = self.state.lock();
        state.exit_boundary(thread);
        state.emit(&TraceRecord::MethodExit { method, thread });
        state.maybe_analyze();
    }

    /// Exception exit: same clock/stack/scheduling behavior as a method exit.
    /// Pops at most one frame; producers unwinding several frames emit one
    /// `X` per frame.
    pub fn on_exception_exit(&self, method: u64, thread: u32) {
        let mut state = self.state.lock();
        state.exit_boundary(thread);
        state.emit(&TraceRecord::ExceptionExit { method, thread });
        state.maybe_analyze();
    }

    /// Field store: `target == 0` writes a static field; `value == 0` clears
    /// the slot.
    pub fn on_put_field(&self, target: u64, value: u64, field: u32, thread: u32) {
        let mut state = self.state.lock();
        state.count_event();
        let slot = FieldSlot(field);
        let stored = ObjId::from_raw(value);
        match ObjId::from_raw(target) {
            Some(obj) => state.graph.write_field(obj, slot, stored),
            None => state.graph.write_static(slot, stored),
        }
        state.emit(&TraceRecord::FieldStore { target, value, field, thread });
    }

    /// Final analysis and sink flush. With `final_drain` on, the root stacks
    /// and static roots are released first, so every remaining live object is
    /// reported dead at the current logical time.
    pub fn on_shutdown(&self) -> TrackStats {
        let mut state = self.state.lock();
        if state.final_drain {
            state.roots.clear();
            state.graph.clear_static_roots();
            state.analyze();
        }
        if let Err(e) = state.sink.flush() {
            error!("failed to flush trace output: {e}");
        }
        state.stats
    }

    /// Current logical time.
    #[must_use]
    pub fn now(&self) -> LogicalTime {
        self.state.lock().clock.now()
    }

    /// Objects currently believed alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }
}

impl<S: RecordSink> State<S> {
    fn count_event(&mut self) {
        self.events_since_analysis += 1;
        self.stats.events += 1;
    }

    fn exit_boundary(&mut self, thread: u32) {
        self.count_event();
        self.clock.on_method_boundary();
        self.roots.pop(ThreadId(thread));
    }

    fn maybe_analyze(&mut self) {
        if self.events_since_analysis >= self.analysis_interval {
            self.analyze();
        }
    }

    fn analyze(&mut self) {
        let now = self.clock.now();
        let deaths = run_analysis(&mut self.live, &mut self.graph, &self.roots, now, None);
        self.stats.analyses += 1;
        self.events_since_analysis = 0;
        for DeathEvent { id, thread, .. } in deaths {
            self.stats.deaths += 1;
            // Online death records omit the time; it is implicit from the
            // record's position in the trace.
            self.emit(&TraceRecord::Death { id: id.raw(), thread: thread.0, time: None });
        }
    }

    fn emit(&mut self, record: &TraceRecord) {
        if let Err(e) = self.sink.emit(record) {
            error!("failed to write trace record `{record}`: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::MemorySink;
    use std::sync::Arc;

    fn tracker(interval: u64) -> OnlineTracker<MemorySink> {
        let config =
            TrackerConfig { analysis_interval: interval, ..TrackerConfig::default() };
        OnlineTracker::new(&config, MemorySink::new())
    }

    fn lines(tracker: &OnlineTracker<MemorySink>) -> Vec<String> {
        tracker.state.lock().sink.records.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_unrooted_alloc_dies_at_method_exit() {
        let t = tracker(1);
        t.on_method_entry(10, 0, 1);
        t.on_alloc(100, 8, 1, 1, 0, 1);
        t.on_method_exit(10, 1);
        t.on_shutdown();

        assert_eq!(lines(&t), vec!["M 10 0 1", "N 100 8 1 1 0 1", "E 10 1", "D 100 1"]);
    }

    #[test]
    fn test_receiver_keeps_object_alive_until_frame_pops() {
        let t = tracker(1);
        t.on_alloc(100, 8, 1, 1, 0, 1);
        t.on_method_entry(10, 100, 1);
        t.on_method_entry(11, 100, 1);
        t.on_method_exit(11, 1);
        // 100 is still the receiver of the outer frame.
        assert_eq!(t.live_count(), 1);
        t.on_method_exit(10, 1);
        assert_eq!(t.live_count(), 0);
        assert_eq!(t.now(), LogicalTime(4));
    }

    #[test]
    fn test_interval_defers_analysis() {
        let t = tracker(100);
        t.on_method_entry(10, 0, 1);
        t.on_alloc(100, 8, 1, 1, 0, 1);
        t.on_method_exit(10, 1);
        // Interval not yet reached: no analysis, object still live.
        assert_eq!(t.live_count(), 1);
        let stats = t.on_shutdown();
        assert_eq!(stats.analyses, 1);
        assert_eq!(stats.deaths, 1);
    }

    #[test]
    fn test_final_drain_disabled_keeps_live_objects() {
        let config = TrackerConfig {
            analysis_interval: 100,
            final_drain: false,
            ..TrackerConfig::default()
        };
        let t = OnlineTracker::new(&config, MemorySink::new());
        t.on_alloc(100, 8, 1, 1, 0, 1);
        let stats = t.on_shutdown();
        assert_eq!(stats.deaths, 0);
        assert_eq!(t.live_count(), 1);
    }

    #[test]
    fn test_concurrent_callbacks_balance_allocs_and_deaths() {
        let t = Arc::new(tracker(10));
        let threads: Vec<_> = (0..4u32)
            .map(|worker| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    for i in 0..50u64 {
                        let id = u64::from(worker + 1) * 1_000 + i;
                        t.on_method_entry(10, 0, worker);
                        t.on_alloc(id, 8, 1, 1, 0, worker);
                        t.on_method_exit(10, worker);
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().expect("worker thread");
        }
        let stats = t.on_shutdown();
        assert_eq!(stats.allocs, 200);
        assert_eq!(stats.deaths, 200);

        // Every death appears after its object's allocation record.
        let records = lines(&t);
        for (i, line) in records.iter().enumerate() {
            if let Some(rest) = line.strip_prefix("D ") {
                let id = rest.split_whitespace().next().expect("death id");
                let alloc_pos = records
                    .iter()
                    .position(|l| l.starts_with(&format!("N {id} ")))
                    .expect("allocation record");
                assert!(alloc_pos < i);
            }
        }
    }
}
