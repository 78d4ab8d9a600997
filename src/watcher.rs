//! The watcher process: drain, mirror, parse, report, exit 0.
//!
//! The watcher is a short-lived companion spawned by the supervisor with
//! the pipe's read end as stdin. Its core logic is a single blocking read
//! loop driving a small state machine; the only other activity is a
//! listener task that receives and logs termination-class signals without
//! acting on them — systemd and friends signal the whole process group
//! when the primary dies, and the watcher must outlive that moment.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config;
use crate::dump::DumpParser;
use crate::report;
use crate::tee::TeeReader;
use crate::transport::{SentryTransport, Transport};

/// Watcher lifecycle states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Process identity and signal handling being set up.
    Starting,
    /// Blocking on the pipe, mirroring and accumulating.
    Listening,
    /// Stream ended; parsing the accumulated bytes.
    Draining,
    /// A dump was found; assembling and submitting the report.
    Reporting,
    /// Done; the process exits 0 regardless of outcome.
    Exiting,
}

fn enter(state: WatcherState) {
    info!(state = ?state, "watcher state");
}

/// What a watcher run ended with. Informational only — the process exit
/// code is 0 in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No recognizable thread dump in the stream; a normal, quiet death.
    NoDump,
    /// A fatal report was submitted and acknowledged.
    Submitted,
    /// A dump was found but submission failed or timed out.
    SubmissionFailed,
}

/// One-shot crash watcher over a byte stream.
pub struct Watcher {
    transport: Option<Arc<dyn Transport>>,
    watchee_pid: i32,
    argv: Vec<String>,
    submit_timeout: Duration,
    tags: BTreeMap<String, String>,
}

impl Watcher {
    /// Create a watcher for the process `watchee_pid` invoked as `argv`.
    ///
    /// `transport` is `None` when no working endpoint is available; the
    /// watcher then still mirrors and drains, it just cannot report.
    pub fn new(
        transport: Option<Arc<dyn Transport>>,
        watchee_pid: i32,
        argv: Vec<String>,
    ) -> Self {
        Self {
            transport,
            watchee_pid,
            argv,
            submit_timeout: config::DEFAULT_SUBMIT_TIMEOUT,
            tags: BTreeMap::new(),
        }
    }

    /// Override the submission timeout.
    #[must_use]
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Attach module/component tags to any report this watcher produces.
    #[must_use]
    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    /// Drain `input` to end-of-stream, mirroring to `mirror`, then parse
    /// and — if a dump was found — report.
    ///
    /// Read errors end the loop like end-of-stream; parse "failure" (no
    /// dump) is a normal outcome; submission failures are logged and
    /// swallowed. Nothing here aborts the watcher.
    pub async fn run<R, W>(&self, input: R, mirror: W) -> Outcome
    where
        R: AsyncRead + Unpin,
        W: Write,
    {
        enter(WatcherState::Listening);
        let mut tee = TeeReader::new(input, mirror);
        let mut chunk = vec![0u8; 8192];
        loop {
            match tee.read(&mut chunk).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "read failed, treating as end of stream");
                    break;
                }
            }
        }

        enter(WatcherState::Draining);
        let raw = tee.into_captured();
        let dump = DumpParser::new().parse(&raw);
        let Some(thread) = dump.first() else {
            info!(bytes = raw.len(), "no thread dump in stream");
            enter(WatcherState::Exiting);
            return Outcome::NoDump;
        };

        enter(WatcherState::Reporting);
        info!(
            thread_id = thread.id,
            frames = thread.frames.len(),
            threads = dump.threads.len(),
            "thread dump found, reporting first thread"
        );
        let raw_text = String::from_utf8_lossy(&raw).into_owned();
        let rpt = report::assemble(
            thread,
            &raw_text,
            &self.argv,
            self.watchee_pid,
            self.tags.clone(),
        );

        let outcome = match &self.transport {
            None => {
                warn!("no transport configured, dropping report");
                Outcome::SubmissionFailed
            }
            Some(transport) => {
                // The transport bounds itself internally; this outer bound
                // is the hard guarantee that the watcher cannot hang.
                let bound = self.submit_timeout.saturating_add(Duration::from_secs(1));
                match tokio::time::timeout(bound, transport.submit(rpt)).await {
                    Ok(Ok(())) => {
                        info!("post-mortem report submitted");
                        Outcome::Submitted
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "report submission failed");
                        Outcome::SubmissionFailed
                    }
                    Err(_) => {
                        warn!(seconds = bound.as_secs(), "report submission timed out");
                        Outcome::SubmissionFailed
                    }
                }
            }
        };

        enter(WatcherState::Exiting);
        outcome
    }
}

/// Spawn a task that receives SIGINT, SIGTERM, and SIGHUP and logs each
/// one as ignored.
///
/// Installing the handlers replaces the default terminate action for the
/// whole process. The caller aborts the returned handle once the state
/// machine reaches [`WatcherState::Exiting`].
///
/// # Errors
///
/// Returns the OS error when a signal handler cannot be installed.
pub fn spawn_signal_ignorer() -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = interrupt.recv() => info!(signal = "SIGINT", "watcher ignored signal"),
                _ = terminate.recv() => info!(signal = "SIGTERM", "watcher ignored signal"),
                _ = hangup.recv() => info!(signal = "SIGHUP", "watcher ignored signal"),
            }
        }
    }))
}

/// Full watcher-mode process body: the explicit entry point `main`
/// branches into when [`config::watcher_endpoint`] is present.
///
/// Reads stdin (the supervisor's pipe), mirrors to stderr (the log file
/// or the original error stream, whichever the supervisor wired to fd 2),
/// and reports over `endpoint`. Returns the process exit code, which is
/// 0 on every path — a non-zero exit here would look like a second,
/// spurious crash to any outer monitoring.
pub fn run_standalone(endpoint: &str) -> i32 {
    crate::logging::init();
    enter(WatcherState::Starting);

    let watchee_pid = nix::unistd::getppid().as_raw();
    set_process_title(watchee_pid);
    info!(watchee_pid, "watcher starting");

    let timeout = config::submit_timeout();
    let transport = match SentryTransport::new(endpoint, timeout) {
        Ok(t) => Some(Arc::new(t) as Arc<dyn Transport>),
        Err(e) => {
            error!(error = %e, "cannot build transport, mirroring only");
            None
        }
    };

    let watcher = Watcher::new(transport, watchee_pid, std::env::args().collect())
        .with_submit_timeout(timeout);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "cannot build runtime");
            return 0;
        }
    };

    runtime.block_on(async {
        let ignorer = match spawn_signal_ignorer() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "cannot install signal handlers");
                None
            }
        };

        let outcome = watcher.run(tokio::io::stdin(), std::io::stderr()).await;
        info!(outcome = ?outcome, "watcher finished");

        if let Some(handle) = ignorer {
            handle.abort();
        }
    });

    0
}

/// Best-effort cosmetic process title so the watcher is recognizable in
/// `ps` output.
#[cfg(target_os = "linux")]
fn set_process_title(watchee_pid: i32) {
    use std::ffi::CString;

    // The kernel truncates comm names to 15 bytes.
    let title = format!("coroner:{watchee_pid}");
    if let Ok(name) = CString::new(title) {
        if let Err(e) = nix::sys::prctl::set_name(&name) {
            tracing::debug!(error = %e, "could not set process title");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn set_process_title(_watchee_pid: i32) {}
