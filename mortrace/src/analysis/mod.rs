//! Reachability analysis
//!
//! Periodically walks the object graph from the root set and reports
//! everything the walk did not reach as dead.

pub mod reachability;

pub use reachability::{run_analysis, WitnessMap};
