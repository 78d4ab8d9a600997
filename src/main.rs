#![allow(missing_docs)]

//! Coroner demo harness.
//!
//! Normal mode runs a toy workload under crash capture; watcher mode is
//! entered when the supervisor re-invokes this executable with the
//! `CORONER_WATCHER` marker set. The `--simulate-fault` flag emulates the
//! runtime's unrecoverable-fault path: dump to stderr, exit 2.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

/// Toy workload running under post-mortem crash capture.
#[derive(Parser)]
#[command(name = "coroner", version, about)]
struct Cli {
    /// Error-tracking DSN; enables the crash watcher when set.
    #[arg(long)]
    dsn: Option<String>,

    /// Append the watcher's error output to this file instead of
    /// inheriting stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Write this line to stderr after startup.
    #[arg(long)]
    emit: Option<String>,

    /// Keep the workload alive for this many milliseconds before exiting.
    #[arg(long)]
    linger_ms: Option<u64>,

    /// Emulate an unrecoverable runtime fault: print a thread dump to
    /// stderr and exit 2, the way the runtime would.
    #[arg(long)]
    simulate_fault: bool,
}

const SAMPLE_DUMP: &str = "panic: divide by zero\n\ngoroutine 1 [running]:\nmain.f()\n\t/a/b.go:10 +0x1\nmain.main()\n\t/a/b.go:20 +0x2\n";

fn main() -> anyhow::Result<()> {
    // Watcher mode first: the re-invoked child carries this process's
    // argv verbatim and must not re-enter normal startup.
    if let Some(endpoint) = coroner::config::watcher_endpoint() {
        std::process::exit(coroner::watcher::run_standalone(&endpoint));
    }

    let cli = Cli::parse();

    if let Some(dsn) = &cli.dsn {
        // Nothing may write to stderr ahead of the fd swap, so the
        // watcher starts before logging does.
        let handle = coroner::supervisor::start_watcher(dsn, cli.log_file.as_deref())
            .context("failed to start crash watcher")?;
        coroner::logging::init();
        info!(watcher_pid = handle.pid(), "crash capture enabled");
    } else {
        coroner::logging::init();
    }

    if let Some(line) = &cli.emit {
        eprintln!("{line}");
    }

    if let Some(ms) = cli.linger_ms {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }

    if cli.simulate_fault {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(SAMPLE_DUMP.as_bytes());
        let _ = stderr.flush();
        std::process::exit(2);
    }

    info!("workload finished");
    Ok(())
}
