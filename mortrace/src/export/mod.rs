//! Export functionality
//!
//! Builds the per-object lifetime oracle from a death-augmented trace.

pub mod oracle;

pub use oracle::{LifetimeOracle, OracleRow};
