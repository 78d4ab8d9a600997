//! Coroner — post-mortem crash capture for processes that cannot report their own death.
//!
//! A primary process redirects its stderr into a pipe and spawns a second
//! copy of itself as a *watcher*. The watcher mirrors everything it reads
//! back to the real error destination, accumulates it, and — once the pipe
//! closes because the primary is gone — parses a thread dump out of the
//! accumulated bytes and submits a fatal report to Sentry. The watcher
//! ignores termination-class signals so a process-group shutdown cannot
//! kill it before the report is out, and it always exits 0.
//!
//! Call [`supervisor::start_watcher`] first thing in `main` (normal mode),
//! and branch into [`watcher::run_standalone`] when
//! [`config::watcher_endpoint`] is set (watcher mode). See `src/main.rs`
//! for the canonical wiring.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dump;
pub mod logging;
pub mod report;
pub mod supervisor;
pub mod tee;
pub mod transport;
pub mod watcher;
