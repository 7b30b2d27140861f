//! Chronological merge of death records.
//!
//! The offline tracker leaves `D id thread time` records clustered at the
//! analysis points that produced them. This pass partitions the trace into
//! the non-death stream and a time-keyed multiset of deaths, then sweeps the
//! stream with a fresh logical clock, flushing each death immediately after
//! the `M`/`E`/`X` record that brings the clock to its timestamp. Deaths
//! sharing a timestamp keep their input order (stable merge); deaths dated
//! past the last boundary are appended at the end.
//!
//! Two invariants are validated fatally here: a death may not precede its
//! object's allocation, and a death may not precede the object's last
//! witnessed use.

use crate::domain::{LogicalTime, ObjId, ReorderError, ThreadId};
use crate::heap::LogicalClock;
use log::warn;
use mortrace_common::TraceRecord;
use std::collections::{BTreeMap, HashMap};

use crate::tracking::RecordSink;

/// Counters accumulated over one reorder run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReorderStats {
    /// Non-death records passed through.
    pub records: u64,
    /// Death records placed at their logical-time position.
    pub deaths: u64,
    /// Deaths dated past the last method boundary, appended at the end.
    pub trailing: u64,
}

struct PendingDeath {
    id: u64,
    thread: u32,
    time: u64,
}

/// Merge the death records of `records` into chronological order, writing the
/// result to `sink`.
///
/// # Errors
///
/// Fails on a death record without a logical time, on a death dated before
/// its object's allocation or last witnessed use, or when the sink does.
pub fn reorder<S: RecordSink>(
    records: &[TraceRecord],
    sink: &mut S,
) -> Result<ReorderStats, ReorderError> {
    let mut clock = LogicalClock::new();
    let mut alloc_time: HashMap<u64, LogicalTime> = HashMap::new();
    let mut last_witness: HashMap<u64, LogicalTime> = HashMap::new();
    let mut stream: Vec<&TraceRecord> = Vec::with_capacity(records.len());
    let mut deaths: BTreeMap<u64, Vec<PendingDeath>> = BTreeMap::new();

    for record in records {
        if let TraceRecord::Death { id, thread, time } = record {
            let Some(obj) = ObjId::from_raw(*id) else {
                warn!("death record for reserved id 0; dropped");
                continue;
            };
            let Some(t) = *time else {
                return Err(ReorderError::MissingDeathTime { id: obj });
            };
            deaths.entry(t).or_default().push(PendingDeath { id: *id, thread: *thread, time: t });
        } else {
            if record.is_method_boundary() {
                clock.on_method_boundary();
            }
            match record {
                TraceRecord::Alloc(a) => {
                    // First allocation wins: a tolerated duplicate must not
                    // move the validation floor forward.
                    alloc_time.entry(a.id).or_insert_with(|| clock.now());
                }
                TraceRecord::Witness { id, .. } => {
                    last_witness.insert(*id, clock.now());
                }
                _ => {}
            }
            stream.push(record);
        }
    }

    validate(&deaths, &alloc_time, &last_witness)?;

    let mut stats = ReorderStats::default();
    let mut clock = LogicalClock::new();
    flush_due(&mut deaths, clock.now(), sink, &mut stats.deaths)?;
    for record in &stream {
        sink.emit(record)?;
        stats.records += 1;
        if record.is_method_boundary() {
            clock.on_method_boundary();
            flush_due(&mut deaths, clock.now(), sink, &mut stats.deaths)?;
        }
    }

    // Whatever is left is dated past the last boundary.
    for batch in deaths.into_values() {
        for death in batch {
            emit_death(&death, sink)?;
            stats.deaths += 1;
            stats.trailing += 1;
        }
    }
    sink.flush()?;
    Ok(stats)
}

fn validate(
    deaths: &BTreeMap<u64, Vec<PendingDeath>>,
    alloc_time: &HashMap<u64, LogicalTime>,
    last_witness: &HashMap<u64, LogicalTime>,
) -> Result<(), ReorderError> {
    for death in deaths.values().flatten() {
        let Some(id) = ObjId::from_raw(death.id) else { continue };
        let death_time = LogicalTime(death.time);
        match alloc_time.get(&death.id) {
            Some(&alloc) if death_time < alloc => {
                return Err(ReorderError::DeathBeforeAlloc {
                    id,
                    thread: ThreadId(death.thread),
                    death_time,
                    alloc_time: alloc,
                });
            }
            Some(_) => {}
            None => warn!("death record for {id} with no observed allocation"),
        }
        if let Some(&witness) = last_witness.get(&death.id) {
            if death_time < witness {
                return Err(ReorderError::WitnessViolation {
                    id,
                    thread: ThreadId(death.thread),
                    death_time,
                    witness_time: witness,
                });
            }
        }
    }
    Ok(())
}

fn flush_due<S: RecordSink>(
    deaths: &mut BTreeMap<u64, Vec<PendingDeath>>,
    now: LogicalTime,
    sink: &mut S,
    emitted: &mut u64,
) -> Result<(), ReorderError> {
    while let Some(entry) = deaths.first_entry() {
        if *entry.key() > now.0 {
            break;
        }
        for death in entry.remove() {
            emit_death(&death, sink)?;
            *emitted += 1;
        }
    }
    Ok(())
}

fn emit_death<S: RecordSink>(death: &PendingDeath, sink: &mut S) -> Result<(), ReorderError> {
    sink.emit(&TraceRecord::Death {
        id: death.id,
        thread: death.thread,
        time: Some(death.time),
    })?;
    Ok(())
}
