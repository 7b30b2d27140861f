//! Identifier newtypes and the allocation/death value types.

use std::fmt;

/// A nonzero object identifier assigned by the trace producer.
///
/// The raw value `0` is the reserved static sentinel and is not
/// representable; [`ObjId::from_raw`] filters it at the wire boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(u64);

impl ObjId {
    /// Wrap a raw wire identifier, rejecting the reserved `0`.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<ObjId> {
        (raw != mortrace_common::STATIC_SENTINEL).then_some(ObjId(raw))
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque producer thread identifier; equality and hashing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag distinguishing fields of the same source object. Writes to the same
/// slot overwrite; writes to different slots coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSlot(pub u32);

/// Monotone event time: method boundaries crossed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LogicalTime(pub u64);

impl LogicalTime {
    pub const ZERO: LogicalTime = LogicalTime(0);
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything remembered about a live object from its allocation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocInfo {
    pub size: u64,
    pub type_id: u32,
    pub site: u32,
    /// Element count for arrays, `0` for scalars.
    pub length: u32,
    pub thread: ThreadId,
    pub time: LogicalTime,
}

/// An object found unreachable by a reachability analysis.
///
/// `thread` is the allocating thread; `time` is the logical time of the
/// analysis that detected the death.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeathEvent {
    pub id: ObjId,
    pub thread: ThreadId,
    pub time: LogicalTime,
}
