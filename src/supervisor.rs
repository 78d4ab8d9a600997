//! Supervisor side: wire the crash-capture path before the workload starts.
//!
//! [`start_watcher`] creates a pipe, spawns a watcher-mode copy of this
//! executable reading from it, and redirects this process's own stderr
//! into the pipe's write end. From that point on everything written to
//! stderr — including the runtime's own unhandled-fault dump — flows
//! through the watcher.
//!
//! Any failure here is returned as a [`SetupError`] and should abort
//! startup: an operator who configured a reporting endpoint must not
//! silently lose the crash-capture guarantee.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nix::fcntl::OFlag;
use nix::unistd::{dup2, pipe2};
use thiserror::Error;

use crate::config;

/// Failure to establish the crash-capture path.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The path of the running executable could not be resolved.
    #[error("failed to resolve current executable path: {0}")]
    Executable(#[source] io::Error),
    /// The stderr pipe could not be created.
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] nix::Error),
    /// The watcher log file could not be opened.
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        /// The log file path that failed to open.
        path: PathBuf,
        /// Underlying open error.
        source: io::Error,
    },
    /// The watcher process could not be spawned.
    #[error("failed to spawn watcher process: {0}")]
    Spawn(#[source] io::Error),
    /// stderr could not be redirected onto the pipe.
    #[error("failed to redirect stderr into watcher pipe: {0}")]
    Redirect(#[source] nix::Error),
}

/// Handle to a spawned watcher. The watcher is intentionally never waited
/// on — it must outlive this process.
#[derive(Debug)]
pub struct WatcherHandle {
    pid: u32,
}

impl WatcherHandle {
    /// OS pid of the watcher process.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Spawn a watcher for this process and redirect stderr into it.
///
/// The watcher is a new instance of the current executable with the same
/// command-line arguments, switched into watcher mode by
/// [`config::WATCHER_ENV`]`=endpoint`. Its fd mapping: stdin = pipe read
/// end, stdout = this process's stdout, stderr = `log_path` opened for
/// append-create (mode 0640) or this process's original stderr when no
/// path is given.
///
/// Must run before anything else in the program writes to stderr: the fd
/// swap is a global, unsynchronized mutation, and earlier writes would
/// race it and land on the old destination.
///
/// # Errors
///
/// Any step failing returns a [`SetupError`]; callers should treat it as
/// fatal at startup.
pub fn start_watcher(
    endpoint: &str,
    log_path: Option<&Path>,
) -> Result<WatcherHandle, SetupError> {
    let exe = std::env::current_exe().map_err(SetupError::Executable)?;

    // Close-on-exec on both ends: the watcher must not inherit a stray
    // copy of the write end, or the pipe would stay open after this
    // process dies and the watcher would never see end-of-stream. The
    // dups below clear the flag exactly where an fd is meant to survive:
    // `Stdio::from` dups the read end onto the child's fd 0, and `dup2`
    // clears it on our fd 2.
    let (pipe_read, pipe_write) = pipe2(OFlag::O_CLOEXEC).map_err(SetupError::Pipe)?;

    let stderr_dest = match log_path {
        Some(path) => Stdio::from(open_log(path)?),
        None => Stdio::inherit(),
    };

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    let child = Command::new(&exe)
        .args(&args)
        .env(config::WATCHER_ENV, endpoint)
        .stdin(Stdio::from(pipe_read))
        .stdout(Stdio::inherit())
        .stderr(stderr_dest)
        .spawn()
        .map_err(SetupError::Spawn)?;

    // The child holds the read end now; our copy was closed on spawn.
    // Swap our stderr onto the write end, then drop the original fd so
    // fd 2 is the only holder left in this process — the kernel closes it
    // when we exit, which is what signals end-of-stream to the watcher.
    dup2(pipe_write.as_raw_fd(), io::stderr().as_raw_fd()).map_err(SetupError::Redirect)?;
    drop(pipe_write);

    Ok(WatcherHandle { pid: child.id() })
}

fn open_log(path: &Path) -> Result<File, SetupError> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .mode(0o640)
        .open(path)
        .map_err(|source| SetupError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}
