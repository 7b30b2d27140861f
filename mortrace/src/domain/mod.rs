//! Domain model for mortrace
//!
//! Core identifier newtypes, allocation/death value types, and structured
//! errors. Wire records (`mortrace-common`) carry raw integers; these types
//! are applied at the tracker boundary.

pub mod errors;
pub mod types;

pub use types::{AllocInfo, DeathEvent, FieldSlot, LogicalTime, ObjId, ThreadId};

pub use errors::{ReorderError, TrackError};
