//! The lifetime oracle: one CSV row per object, allocation zipped with death.

// Row counts fit in u64 on every supported platform
#![allow(clippy::cast_possible_truncation)]

use crate::heap::LogicalClock;
use log::warn;
use mortrace_common::TraceRecord;
use std::collections::HashMap;
use std::io::{self, Write};

/// One object's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleRow {
    pub id: u64,
    pub alloc_time: u64,
    pub death_time: u64,
    pub size: u64,
    pub site: u32,
    pub thread: u32,
}

/// Lifetime oracle built by sweeping a trace that already carries timed death
/// records - output of the offline tracker or of the reorderer; death
/// positions do not matter because the records carry explicit times.
#[derive(Debug, Default)]
pub struct LifetimeOracle {
    rows: Vec<OracleRow>,
    /// Deaths whose id had no observed allocation, skipped with a warning.
    pub unmatched_deaths: u64,
    /// Allocations that never died (final drain off, or a truncated trace).
    pub undying: u64,
}

struct PendingAlloc {
    alloc_time: u64,
    size: u64,
    site: u32,
}

impl LifetimeOracle {
    /// Zip `N`/`A` records with `D` records by object id, in death order.
    #[must_use]
    pub fn from_records(records: &[TraceRecord]) -> Self {
        let mut clock = LogicalClock::new();
        let mut pending: HashMap<u64, PendingAlloc> = HashMap::new();
        let mut oracle = LifetimeOracle::default();

        for record in records {
            if record.is_method_boundary() {
                clock.on_method_boundary();
            }
            match record {
                TraceRecord::Alloc(a) => {
                    pending.insert(
                        a.id,
                        PendingAlloc { alloc_time: clock.now().0, size: a.size, site: a.site },
                    );
                }
                TraceRecord::Death { id, thread, time } => {
                    let Some(t) = *time else {
                        warn!("death record for {id} carries no logical time; skipped");
                        oracle.unmatched_deaths += 1;
                        continue;
                    };
                    match pending.remove(id) {
                        Some(alloc) => oracle.rows.push(OracleRow {
                            id: *id,
                            alloc_time: alloc.alloc_time,
                            death_time: t,
                            size: alloc.size,
                            site: alloc.site,
                            thread: *thread,
                        }),
                        None => {
                            warn!("death record for {id} with no observed allocation; skipped");
                            oracle.unmatched_deaths += 1;
                        }
                    }
                }
                _ => {}
            }
        }

        oracle.undying = pending.len() as u64;
        if oracle.undying > 0 {
            warn!("{} object(s) never died; run the tracker with final_drain", oracle.undying);
        }
        oracle
    }

    #[must_use]
    pub fn rows(&self) -> &[OracleRow] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Write the oracle as CSV to any writer (file, stdout, buffer).
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn export<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "id,alloc_time,death_time,size,site,thread")?;
        for row in &self.rows {
            writeln!(
                writer,
                "{},{},{},{},{},{}",
                row.id, row.alloc_time, row.death_time, row.size, row.site, row.thread
            )?;
        }
        Ok(())
    }
}
