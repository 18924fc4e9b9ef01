use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::{info, warn};
use memtrack::*;

/// Replays allocator and memory-access events into an address-resolved trace
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Event script to replay
    #[arg(value_parser = clap::value_parser!(PathBuf))]
    script:     PathBuf,

    /// Where the access trace goes
    #[arg(short, long, default_value = "memtrace.txt")]
    trace:      PathBuf,

    /// Where the instruction-pointer to source-line table goes
    #[arg(short, long, default_value = "sourcelines.txt")]
    lines:      PathBuf,

    /// Regions of this many bytes or fewer are not tracked
    #[arg(long, env = "MEMTRACE_THRESHOLD", default_value_t = 0)]
    threshold:  u64,

    /// Start with access recording disabled
    #[arg(long)]
    paused:     bool,

    /// Skip malformed script lines instead of stopping
    #[arg(long)]
    lenient:    bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Args::parse();
    ensure!(cli.script.is_file(), "Invalid script path {}", cli.script.display());

    let input = File::open(&cli.script)
        .with_context(|| format!("opening {}", cli.script.display()))?;
    let trace = File::create(&cli.trace)
        .with_context(|| format!("creating {}", cli.trace.display()))?;
    let lines = File::create(&cli.lines)
        .with_context(|| format!("creating {}", cli.lines.display()))?;

    let mut tracker = Tracker::new(trace, cli.threshold);
    if cli.paused {
        tracker.disable()?;
    }

    let mut replayed = 0usize;
    for evt in Script::new(BufReader::new(input)) {
        let evt = match evt {
            Ok(e)                           => e,
            Err(ScriptError::Io(e))         => {
                return Err(e).context("reading script");
            },
            Err(e) if cli.lenient           => {
                warn!("{}", e);
                continue;
            },
            Err(e)                          => {
                return Err(e.into());
            }
        };
        tracker.apply(evt).context("writing trace")?;
        replayed += 1;
    }

    let live = tracker.regions().len();
    let (trace, stats) = tracker.finish(BufWriter::new(lines))
        .context("finishing trace")?;
    trace.sync_all()?;

    info!("{} events replayed, {} regions still live", replayed, live);
    info!(
        "{} regions registered, {} released, {} unmatched, {} skipped, {} rejected",
        stats.registered, stats.released, stats.unmatched, stats.skipped, stats.rejected
    );
    info!("{} accesses: {} hits, {} misses", stats.accesses, stats.hits, stats.misses);

    Ok(())
}
