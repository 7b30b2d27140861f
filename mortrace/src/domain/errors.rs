//! Structured error types for mortrace
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::{LogicalTime, ObjId, ThreadId};
use thiserror::Error;

/// State inconsistencies surfaced by the tracking core.
///
/// These are producer bugs the tracker cannot correct: they are logged and
/// tolerated (duplicates overwrite, deaths for unknown ids are suppressed).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TrackError {
    #[error("duplicate allocation for object {id}")]
    DuplicateAlloc { id: ObjId },

    #[error("object {id} is not in the live set")]
    UnknownObj { id: ObjId },
}

/// Fatal validation failures found while merging death records back into
/// chronological order. These are correctness bugs the user must see.
#[derive(Error, Debug)]
pub enum ReorderError {
    #[error(
        "death record `D {id} {thread} {death_time}` precedes the allocation of {id} at {alloc_time}"
    )]
    DeathBeforeAlloc { id: ObjId, thread: ThreadId, death_time: LogicalTime, alloc_time: LogicalTime },

    #[error(
        "death record `D {id} {thread} {death_time}` precedes the last witnessed use of {id} at {witness_time}"
    )]
    WitnessViolation {
        id: ObjId,
        thread: ThreadId,
        death_time: LogicalTime,
        witness_time: LogicalTime,
    },

    #[error("death record for object {id} carries no logical time; reorder input must be an offline trace")]
    MissingDeathTime { id: ObjId },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
