use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use mortrace::cli::{Args, Command};
use mortrace::export::LifetimeOracle;
use mortrace::reorder;
use mortrace::tracking::{load_records, Mode, OfflineTracker, TrackerConfig, WriteSink};
use mortrace_common::TraceRecord;

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Command::Track { trace, output, config, interval, no_witness, no_final_drain } => {
            let mut config = match config {
                Some(path) => TrackerConfig::from_file(&path)?,
                None => TrackerConfig::default(),
            };
            if let Some(interval) = interval {
                config.analysis_interval = interval;
            }
            if no_witness {
                config.witness_aware = false;
            }
            if no_final_drain {
                config.final_drain = false;
            }
            if config.mode == Mode::Online {
                bail!(
                    "the track subcommand processes finished traces; \
                     online tracking runs in-process (set mode = \"offline\")"
                );
            }

            let (records, malformed) = read_trace(&trace)?;
            let out = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            let mut sink = WriteSink::new(BufWriter::new(out));
            let mut stats = OfflineTracker::new(config)
                .run(&records, &mut sink)
                .context("failed to write death-augmented trace")?;
            stats.malformed = malformed;

            if !args.quiet {
                println!("💾 Wrote {}", output.display());
                println!("   Events:   {}", stats.events);
                if stats.malformed > 0 {
                    println!("   Skipped:  {} malformed line(s)", stats.malformed);
                }
                println!("   Allocs:   {}", stats.allocs);
                println!("   Deaths:   {}", stats.deaths);
                println!("   Analyses: {}", stats.analyses);
            }
        }

        Command::Reorder { trace, output } => {
            let (records, malformed) = read_trace(&trace)?;
            let out = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            let mut sink = WriteSink::new(BufWriter::new(out));
            let stats = reorder::reorder(&records, &mut sink)?;

            if !args.quiet {
                println!("💾 Wrote {}", output.display());
                println!("   Records:  {}", stats.records);
                if malformed > 0 {
                    println!("   Skipped:  {malformed} malformed line(s)");
                }
                println!("   Deaths:   {}", stats.deaths);
                if stats.trailing > 0 {
                    println!("   Trailing: {} death(s) dated past the last boundary", stats.trailing);
                }
            }
        }

        Command::Oracle { trace, output } => {
            let (records, _) = read_trace(&trace)?;
            let oracle = LifetimeOracle::from_records(&records);
            let out = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            oracle
                .export(BufWriter::new(out))
                .context("failed to write oracle CSV")?;

            if !args.quiet {
                println!("💾 Wrote {}", output.display());
                println!("   Lifetimes: {}", oracle.row_count());
                if oracle.unmatched_deaths > 0 {
                    println!("   Unmatched: {} death(s) without an allocation", oracle.unmatched_deaths);
                }
                if oracle.undying > 0 {
                    println!("   Undying:   {} object(s) without a death", oracle.undying);
                }
            }
        }
    }

    Ok(())
}

fn read_trace(path: &Path) -> Result<(Vec<TraceRecord>, u64)> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    load_records(BufReader::new(file))
        .with_context(|| format!("failed to read {}", path.display()))
}
