//! Shared trace-record grammar.
//!
//! One record per line, whitespace-separated fields, single-letter tag first:
//!
//! | Tag | Fields                              | Meaning                        |
//! |-----|-------------------------------------|--------------------------------|
//! | `N` | `id size type_id site_id 0 thread`  | scalar allocation              |
//! | `A` | `id size type_id site_id len thread`| array allocation               |
//! | `M` | `method_id receiver_id thread`      | method entry (clock tick)      |
//! | `E` | `method_id thread`                  | method exit (clock tick)       |
//! | `X` | `method_id thread`                  | exception exit (clock tick)    |
//! | `U` | `tgt_id src_id field_id thread`     | field store, `tgt_id == 0` is a static field |
//! | `W` | `id thread`                         | last-observed use witness      |
//! | `D` | `id thread [logical_time]`          | object death (time present in offline traces) |
//!
//! This crate is shared between the in-process tracker (which formats records)
//! and the offline pipeline tools (which parse, rewrite, and re-emit them).
//! Fields are raw integers here; domain newtypes are applied on the consumer
//! side.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reserved identifier: never names a concrete object. As the target of a
/// field store it means "static (class-level) field"; as the stored value it
/// means "clear the slot".
pub const STATIC_SENTINEL: u64 = 0;

/// Allocation fields shared by the `N` and `A` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRecord {
    pub id: u64,
    pub size: u64,
    pub type_id: u32,
    pub site: u32,
    /// Element count for arrays; `0` for scalar allocations.
    pub length: u32,
    pub thread: u32,
    /// True for `A` records, false for `N`.
    pub array: bool,
}

/// A single parsed trace record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    /// `N ...` / `A ...`
    Alloc(AllocRecord),
    /// `M method_id receiver_id thread`
    MethodEntry { method: u64, receiver: u64, thread: u32 },
    /// `E method_id thread`
    MethodExit { method: u64, thread: u32 },
    /// `X method_id thread`
    ExceptionExit { method: u64, thread: u32 },
    /// `U tgt_id src_id field_id thread`: store `value` into field `field` of
    /// `target` (`target == 0` names a static field).
    FieldStore { target: u64, value: u64, field: u32, thread: u32 },
    /// `W id thread`
    Witness { id: u64, thread: u32 },
    /// `D id thread` (online traces) or `D id thread time` (offline traces).
    Death { id: u64, thread: u32, time: Option<u64> },
}

impl TraceRecord {
    /// Whether this record crosses a method boundary (`M`/`E`/`X`) and so
    /// advances the logical clock.
    #[must_use]
    pub fn is_method_boundary(&self) -> bool {
        matches!(
            self,
            TraceRecord::MethodEntry { .. }
                | TraceRecord::MethodExit { .. }
                | TraceRecord::ExceptionExit { .. }
        )
    }

    /// Whether this record is a method exit (`E`/`X`), the points at which
    /// reachability analyses may be scheduled.
    #[must_use]
    pub fn is_method_exit(&self) -> bool {
        matches!(self, TraceRecord::MethodExit { .. } | TraceRecord::ExceptionExit { .. })
    }

    /// Parse one trace line. The line must contain exactly one record.
    ///
    /// # Errors
    ///
    /// Returns [`ParseRecordError`] if the line is empty, the tag is unknown,
    /// the field count does not match the tag, or a field is not numeric.
    pub fn parse(line: &str) -> Result<TraceRecord, ParseRecordError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some((&tag, args)) = fields.split_first() else {
            return Err(ParseRecordError::Empty);
        };

        match tag {
            "N" | "A" => {
                let [id, size, type_id, site, length, thread] = expect_fields(line, args)?;
                Ok(TraceRecord::Alloc(AllocRecord {
                    id: num(line, id)?,
                    size: num(line, size)?,
                    type_id: num(line, type_id)?,
                    site: num(line, site)?,
                    length: num(line, length)?,
                    thread: num(line, thread)?,
                    array: tag == "A",
                }))
            }
            "M" => {
                let [method, receiver, thread] = expect_fields(line, args)?;
                Ok(TraceRecord::MethodEntry {
                    method: num(line, method)?,
                    receiver: num(line, receiver)?,
                    thread: num(line, thread)?,
                })
            }
            "E" => {
                let [method, thread] = expect_fields(line, args)?;
                Ok(TraceRecord::MethodExit { method: num(line, method)?, thread: num(line, thread)? })
            }
            "X" => {
                let [method, thread] = expect_fields(line, args)?;
                Ok(TraceRecord::ExceptionExit {
                    method: num(line, method)?,
                    thread: num(line, thread)?,
                })
            }
            "U" => {
                let [target, value, field, thread] = expect_fields(line, args)?;
                Ok(TraceRecord::FieldStore {
                    target: num(line, target)?,
                    value: num(line, value)?,
                    field: num(line, field)?,
                    thread: num(line, thread)?,
                })
            }
            "W" => {
                let [id, thread] = expect_fields(line, args)?;
                Ok(TraceRecord::Witness { id: num(line, id)?, thread: num(line, thread)? })
            }
            "D" => match args {
                [id, thread] => Ok(TraceRecord::Death {
                    id: num(line, id)?,
                    thread: num(line, thread)?,
                    time: None,
                }),
                [id, thread, time] => Ok(TraceRecord::Death {
                    id: num(line, id)?,
                    thread: num(line, thread)?,
                    time: Some(num(line, time)?),
                }),
                _ => Err(ParseRecordError::FieldCount {
                    line: line.trim().to_string(),
                    expected: "2 or 3",
                    found: args.len(),
                }),
            },
            _ => Err(ParseRecordError::UnknownTag {
                tag: tag.to_string(),
                line: line.trim().to_string(),
            }),
        }
    }
}

impl FromStr for TraceRecord {
    type Err = ParseRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TraceRecord::parse(s)
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceRecord::Alloc(a) => {
                let tag = if a.array { "A" } else { "N" };
                write!(
                    f,
                    "{} {} {} {} {} {} {}",
                    tag, a.id, a.size, a.type_id, a.site, a.length, a.thread
                )
            }
            TraceRecord::MethodEntry { method, receiver, thread } => {
                write!(f, "M {method} {receiver} {thread}")
            }
            TraceRecord::MethodExit { method, thread } => write!(f, "E {method} {thread}"),
            TraceRecord::ExceptionExit { method, thread } => write!(f, "X {method} {thread}"),
            TraceRecord::FieldStore { target, value, field, thread } => {
                write!(f, "U {target} {value} {field} {thread}")
            }
            TraceRecord::Witness { id, thread } => write!(f, "W {id} {thread}"),
            TraceRecord::Death { id, thread, time: None } => write!(f, "D {id} {thread}"),
            TraceRecord::Death { id, thread, time: Some(t) } => write!(f, "D {id} {thread} {t}"),
        }
    }
}

/// Failure to parse a trace line.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseRecordError {
    #[error("empty record")]
    Empty,

    #[error("unknown record tag `{tag}` in `{line}`")]
    UnknownTag { tag: String, line: String },

    #[error("record `{line}` has {found} fields after the tag, expected {expected}")]
    FieldCount { line: String, expected: &'static str, found: usize },

    #[error("non-numeric field `{field}` in `{line}`")]
    BadNumber { field: String, line: String },
}

fn expect_fields<'a, const N: usize>(
    line: &str,
    args: &[&'a str],
) -> Result<[&'a str; N], ParseRecordError> {
    <[&str; N]>::try_from(args).map_err(|_| ParseRecordError::FieldCount {
        line: line.trim().to_string(),
        expected: match N {
            2 => "2",
            3 => "3",
            4 => "4",
            _ => "6",
        },
        found: args.len(),
    })
}

fn num<T: FromStr>(line: &str, field: &str) -> Result<T, ParseRecordError> {
    field.parse().map_err(|_| ParseRecordError::BadNumber {
        field: field.to_string(),
        line: line.trim().to_string(),
    })
}
