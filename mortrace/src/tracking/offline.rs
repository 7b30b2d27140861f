//! Offline tracking: two passes over a finished trace.
//!
//! Pass 1 walks the trace with only the logical clock and records the last
//! time each object appears in a `W` witness record. Pass 2 replays the trace
//! through the same state transitions the online tracker applies, emitting
//! every input record unchanged plus `D id thread time` records at the
//! analyses that retire objects - but never before an object's last witnessed
//! use. The emitted deaths are clustered at their analysis points; the
//! reorder pass merges them to their chronological positions.

use crate::analysis::{run_analysis, WitnessMap};
use crate::domain::{AllocInfo, FieldSlot, ObjId, ThreadId};
use crate::heap::{LiveSet, LogicalClock, ObjectGraph, RootStacks};
use crate::tracking::{RecordSink, TrackStats, TrackerConfig};
use log::warn;
use mortrace_common::{ParseRecordError, TraceRecord};
use std::io::{self, BufRead};

/// Read a trace file into memory, skipping blank lines and logging malformed
/// ones. Returns the records and the count of skipped lines.
///
/// # Errors
///
/// Fails only on I/O errors; malformed records are recovered locally.
pub fn load_records<R: BufRead>(reader: R) -> io::Result<(Vec<TraceRecord>, u64)> {
    let mut records = Vec::new();
    let mut malformed = 0u64;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        match TraceRecord::parse(&line) {
            Ok(record) => records.push(record),
            Err(ParseRecordError::Empty) => {}
            Err(e) => {
                warn!("skipping line {}: {e}", lineno + 1);
                malformed += 1;
            }
        }
    }
    Ok((records, malformed))
}

/// Two-pass offline death tracker.
pub struct OfflineTracker {
    config: TrackerConfig,
}

impl OfflineTracker {
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    /// Pass 1: map each object to the logical time of its last witnessed use.
    #[must_use]
    pub fn collect_witnesses(records: &[TraceRecord]) -> WitnessMap {
        let mut clock = LogicalClock::new();
        let mut witnesses = WitnessMap::new();
        for record in records {
            if record.is_method_boundary() {
                clock.on_method_boundary();
            }
            if let TraceRecord::Witness { id, .. } = record {
                match ObjId::from_raw(*id) {
                    // Later records overwrite: the map keeps the last use.
                    Some(obj) => {
                        witnesses.insert(obj, clock.now());
                    }
                    None => warn!("witness record for reserved id 0; ignored"),
                }
            }
        }
        witnesses
    }

    /// Pass 2 (with pass 1 first when witness-aware): replay the trace and
    /// emit it with death records inserted at their analysis points.
    ///
    /// # Errors
    ///
    /// Fails when the sink does.
    pub fn run<S: RecordSink>(
        &self,
        records: &[TraceRecord],
        sink: &mut S,
    ) -> io::Result<TrackStats> {
        let witnesses =
            self.config.witness_aware.then(|| Self::collect_witnesses(records));

        let mut replay = Replay {
            clock: LogicalClock::new(),
            live: LiveSet::new(),
            graph: ObjectGraph::new(),
            roots: RootStacks::new(),
            events_since_analysis: 0,
            stats: TrackStats::default(),
        };

        for record in records {
            replay.apply(record, witnesses.as_ref(), &self.config, sink)?;
        }

        if self.config.final_drain {
            replay.roots.clear();
            replay.graph.clear_static_roots();
            replay.analyze(witnesses.as_ref(), sink)?;
        }
        sink.flush()?;
        Ok(replay.stats)
    }
}

struct Replay {
    clock: LogicalClock,
    live: LiveSet,
    graph: ObjectGraph,
    roots: RootStacks,
    events_since_analysis: u64,
    stats: TrackStats,
}

impl Replay {
    fn apply<S: RecordSink>(
        &mut self,
        record: &TraceRecord,
        witnesses: Option<&WitnessMap>,
        config: &TrackerConfig,
        sink: &mut S,
    ) -> io::Result<()> {
        if let TraceRecord::Death { id, .. } = record {
            // The input trace is producer output; deaths in it would collide
            // with the ones this pass computes.
            warn!("input trace already contains a death record for {id}; dropped");
            return Ok(());
        }

        self.events_since_analysis += 1;
        self.stats.events += 1;

        match record {
            TraceRecord::Alloc(a) => {
                self.stats.allocs += 1;
                match ObjId::from_raw(a.id) {
                    Some(obj) => {
                        let info = AllocInfo {
                            size: a.size,
                            type_id: a.type_id,
                            site: a.site,
                            length: a.length,
                            thread: ThreadId(a.thread),
                            time: self.clock.now(),
                        };
                        if let Err(e) = self.live.insert(obj, info) {
                            warn!("{e}; keeping the newer allocation");
                        }
                    }
                    None => warn!("allocation record for reserved id 0; state unchanged"),
                }
            }
            TraceRecord::MethodEntry { receiver, thread, .. } => {
                self.clock.on_method_boundary();
                self.roots.push(ThreadId(*thread), ObjId::from_raw(*receiver));
            }
            TraceRecord::MethodExit { thread, .. } | TraceRecord::ExceptionExit { thread, .. } => {
                self.clock.on_method_boundary();
                self.roots.pop(ThreadId(*thread));
            }
            TraceRecord::FieldStore { target, value, field, .. } => {
                let slot = FieldSlot(*field);
                let stored = ObjId::from_raw(*value);
                match ObjId::from_raw(*target) {
                    Some(obj) => self.graph.write_field(obj, slot, stored),
                    None => self.graph.write_static(slot, stored),
                }
            }
            TraceRecord::Witness { .. } | TraceRecord::Death { .. } => {}
        }

        sink.emit(record)?;

        if record.is_method_exit() && self.events_since_analysis >= config.analysis_interval {
            self.analyze(witnesses, sink)?;
        }
        Ok(())
    }

    fn analyze<S: RecordSink>(
        &mut self,
        witnesses: Option<&WitnessMap>,
        sink: &mut S,
    ) -> io::Result<()> {
        let now = self.clock.now();
        let deaths = run_analysis(&mut self.live, &mut self.graph, &self.roots, now, witnesses);
        self.stats.analyses += 1;
        self.events_since_analysis = 0;
        for death in deaths {
            self.stats.deaths += 1;
            sink.emit(&TraceRecord::Death {
                id: death.id.raw(),
                thread: death.thread.0,
                time: Some(death.time.0),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::MemorySink;

    fn parse_trace(text: &str) -> Vec<TraceRecord> {
        let (records, malformed) =
            load_records(io::Cursor::new(text)).expect("in-memory read");
        assert_eq!(malformed, 0, "test trace must be well-formed");
        records
    }

    fn run_with(interval: u64, text: &str) -> Vec<String> {
        let config = TrackerConfig {
            analysis_interval: interval,
            ..TrackerConfig::default()
        };
        let mut sink = MemorySink::new();
        OfflineTracker::new(config)
            .run(&parse_trace(text), &mut sink)
            .expect("memory sink");
        sink.records.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_single_alloc_dies_at_method_exit() {
        let out = run_with(1, "M 10 0 1\nN 100 8 1 1 0 1\nE 10 1\n");
        assert_eq!(out, vec!["M 10 0 1", "N 100 8 1 1 0 1", "E 10 1", "D 100 1 2"]);
    }

    #[test]
    fn test_static_root_holds_chain_until_cleared() {
        let held = "M 10 0 1\n\
                    N 100 8 1 1 0 1\n\
                    N 101 8 1 2 0 1\n\
                    N 102 8 1 3 0 1\n\
                    U 100 101 0 1\n\
                    U 101 102 0 1\n\
                    U 0 100 5 1\n\
                    E 10 1\n";
        let out = run_with(1, held);
        // Final drain still reports the chain dead at end of trace, but the
        // scheduled analysis at the exit must not.
        let death_at_exit = out.iter().position(|l| l.starts_with("D "));
        assert_eq!(death_at_exit, Some(8), "no deaths before the final drain");

        let released = format!("{held}M 11 0 1\nU 0 0 5 1\nE 11 1\n");
        let out = run_with(1, &released);
        let exit_pos = out.iter().position(|l| l == "E 11 1").expect("second exit");
        assert_eq!(
            &out[exit_pos + 1..],
            &["D 100 1 4".to_string(), "D 101 1 4".to_string(), "D 102 1 4".to_string()]
        );
    }

    #[test]
    fn test_static_overwrite_releases_prior_root() {
        let out = run_with(
            1,
            "M 10 0 1\n\
             N 100 8 1 1 0 1\n\
             N 101 8 1 2 0 1\n\
             U 0 100 0 1\n\
             U 0 101 0 1\n\
             E 10 1\n\
             M 11 0 1\n\
             E 11 1\n",
        );
        let first_exit = out.iter().position(|l| l == "E 10 1").expect("first exit");
        assert_eq!(out[first_exit + 1], "D 100 1 2");
        // 101 stays pinned by the static slot through both analyses; only the
        // final drain reports it.
        assert_eq!(out.last().map(String::as_str), Some("D 101 1 4"));
    }

    #[test]
    fn test_witness_defers_death_past_last_use() {
        // 100 is unreachable from t=2 on, but a witness at t=5 pins its death
        // to the analysis at t=6.
        let out = run_with(
            1,
            "M 10 0 1\n\
             N 100 8 1 1 0 1\n\
             E 10 1\n\
             M 11 0 1\n\
             E 11 1\n\
             M 12 0 1\n\
             W 100 1\n\
             E 12 1\n",
        );
        let death = out.iter().find(|l| l.starts_with("D 100")).expect("death emitted");
        assert_eq!(death, "D 100 1 6");
        // The analyses at t=2 and t=4 ran but did not report it.
        assert!(!out.contains(&"D 100 1 2".to_string()));
        assert!(!out.contains(&"D 100 1 4".to_string()));
    }

    #[test]
    fn test_witness_pass_keeps_last_use() {
        let records = parse_trace(
            "M 10 0 1\nW 100 1\nE 10 1\nW 100 1\nM 11 0 1\nE 11 1\n",
        );
        let witnesses = OfflineTracker::collect_witnesses(&records);
        let obj = ObjId::from_raw(100).expect("nonzero id");
        assert_eq!(witnesses.get(&obj).map(|t| t.0), Some(2));
    }

    #[test]
    fn test_cycle_collected_at_final_drain() {
        let out = run_with(
            500,
            "M 10 0 1\n\
             N 100 8 1 1 0 1\n\
             N 101 8 1 2 0 1\n\
             U 100 101 0 1\n\
             U 101 100 0 1\n\
             E 10 1\n",
        );
        assert!(out.contains(&"D 100 1 2".to_string()));
        assert!(out.contains(&"D 101 1 2".to_string()));
    }

    #[test]
    fn test_input_death_records_are_dropped() {
        let out = run_with(500, "M 10 0 1\nD 42 1 1\nE 10 1\n");
        assert!(!out.iter().any(|l| l.starts_with("D 42")));
    }

    #[test]
    fn test_mass_balance_on_clean_trace() {
        let text = "M 10 0 1\n\
                    N 100 8 1 1 0 1\n\
                    A 101 32 2 2 4 1\n\
                    N 102 8 1 3 0 2\n\
                    U 100 101 0 1\n\
                    E 10 1\n";
        let config = TrackerConfig { analysis_interval: 2, ..TrackerConfig::default() };
        let mut sink = MemorySink::new();
        let stats = OfflineTracker::new(config)
            .run(&parse_trace(text), &mut sink)
            .expect("memory sink");
        assert_eq!(stats.allocs, 3);
        assert_eq!(stats.deaths, 3);
    }
}
