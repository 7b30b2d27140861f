//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mortrace",
    about = "Augment JVM heap traces with reachability-computed object deaths",
    after_help = "\
EXAMPLES:
    mortrace track app.trace -o app.deaths.trace       Insert death records
    mortrace track app.trace -o out.trace --interval 100 --no-witness
    mortrace reorder app.deaths.trace -o app.final.trace
    mortrace oracle app.final.trace -o lifetimes.csv   Per-object lifetime CSV"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the offline tracker: read a producer trace, write it back with
    /// death records inserted at their analysis points
    Track {
        /// Producer trace (no death records)
        trace: PathBuf,

        /// Output trace with death records
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// JSON configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Events between scheduled analyses (overrides the config file)
        #[arg(long)]
        interval: Option<u64>,

        /// Skip the witness pass and the last-use guard
        #[arg(long)]
        no_witness: bool,

        /// Do not report still-live objects dead at end of trace
        #[arg(long)]
        no_final_drain: bool,
    },

    /// Merge death records into chronological (logical-time) order
    Reorder {
        /// Trace with clustered death records
        trace: PathBuf,

        /// Output trace with deaths at their logical-time positions
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Derive the per-object lifetime CSV from a death-augmented trace
    Oracle {
        /// Trace carrying timed death records
        trace: PathBuf,

        /// Output CSV file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}
