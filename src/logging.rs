//! Structured logging setup using `tracing-subscriber`.
//!
//! Both process roles log human-readable output to stderr, controlled by
//! `RUST_LOG` (default: `info`). In the supervisor that stream flows into
//! the watcher's pipe once [`crate::supervisor::start_watcher`] has run;
//! in the watcher it is the mirror destination (log file or the original
//! error stream).

use tracing_subscriber::EnvFilter;

/// Initialise stderr logging.
///
/// Safe to call more than once: repeated initialisation (as happens across
/// tests sharing one process) is ignored rather than panicking.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();
}
