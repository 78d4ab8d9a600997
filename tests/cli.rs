//! End-to-end process tests: watcher mode, supervisor wiring, signal immunity.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

use assert_cmd::cargo::cargo_bin;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// A syntactically valid DSN pointing nowhere reachable, so submissions
/// fail fast and nothing ever leaves the machine.
const DEAD_DSN: &str = "http://0123456789abcdef@127.0.0.1:9/42";

const SCENARIO_DUMP: &str = "panic: divide by zero\n\ngoroutine 1 [running]:\nmain.f()\n\t/a/b.go:10 +0x1\nmain.main()\n\t/a/b.go:20 +0x2\n";

fn watcher_command() -> Command {
    let mut cmd = Command::new(cargo_bin("coroner"));
    cmd.env("CORONER_WATCHER", DEAD_DSN)
        .env("CORONER_SUBMIT_TIMEOUT_SECS", "2");
    cmd
}

/// Poll until `predicate` holds for the log file's contents, or fail.
fn wait_for_log(path: &std::path::Path, predicate: impl Fn(&str) -> bool) -> String {
    for _ in 0..100 {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if predicate(&contents) {
                return contents;
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    panic!("log file {} never reached expected state", path.display());
}

#[test]
fn watcher_with_empty_stdin_exits_zero_without_reporting() {
    let output = watcher_command()
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .expect("watcher should run");

    assert!(output.status.success(), "watcher must always exit 0");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no thread dump"),
        "empty stream is a quiet death: {stderr}"
    );
}

#[test]
fn watcher_mirrors_stream_to_stderr() {
    let mut child = watcher_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("watcher should spawn");

    let mut stdin = child.stdin.take().expect("stdin handle");
    stdin
        .write_all(b"hello from the primary\n")
        .expect("write to watcher");
    drop(stdin);

    let output = child.wait_with_output().expect("watcher should exit");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hello from the primary"));
}

#[test]
fn watcher_with_dump_and_dead_endpoint_still_exits_zero() {
    let mut child = watcher_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("watcher should spawn");

    let mut stdin = child.stdin.take().expect("stdin handle");
    stdin
        .write_all(SCENARIO_DUMP.as_bytes())
        .expect("write dump");
    drop(stdin);

    let output = child.wait_with_output().expect("watcher should exit");
    assert!(
        output.status.success(),
        "submission failure must not change the exit status"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("panic: divide by zero"), "mirror intact");
}

#[test]
fn watcher_survives_termination_signals_while_draining() {
    let mut child = watcher_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("watcher should spawn");

    // Give the watcher time to install its handlers.
    std::thread::sleep(Duration::from_millis(800));

    let pid = Pid::from_raw(i32::try_from(child.id()).expect("pid fits in i32"));
    kill(pid, Signal::SIGTERM).expect("deliver SIGTERM");
    kill(pid, Signal::SIGHUP).expect("deliver SIGHUP");
    std::thread::sleep(Duration::from_millis(500));

    assert!(
        child.try_wait().expect("try_wait").is_none(),
        "watcher must outlive termination-class signals"
    );

    // Closing the write end signals end-of-stream; only then may it exit.
    drop(child.stdin.take());
    let status = child.wait().expect("watcher should exit after EOF");
    assert!(status.success());
}

#[test]
fn supervisor_routes_primary_stderr_into_log_file() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let log_path = tmp.path().join("watch.log");

    let status = Command::new(cargo_bin("coroner"))
        .args(["--dsn", DEAD_DSN, "--emit", "crash capture check"])
        .arg("--log-file")
        .arg(&log_path)
        .env("CORONER_SUBMIT_TIMEOUT_SECS", "2")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("primary should run");
    assert!(status.success(), "supervisor must not alter the exit code");

    // The primary's stderr write travels pipe -> watcher -> log file; the
    // watcher may outlive the primary briefly, so poll.
    let contents = wait_for_log(&log_path, |c| c.contains("crash capture check"));
    // The watcher's own startup line proves the marker switched the child
    // into watcher mode.
    assert!(contents.contains("watcher starting"), "got: {contents}");

    // Mirrored bytes arrive in real time, before end-of-stream — the real
    // guarantee is that the watcher observes EOF once the primary is gone
    // and runs its state machine to completion.
    let contents = wait_for_log(&log_path, |c| c.contains("watcher finished"));
    assert!(contents.contains("no thread dump"), "got: {contents}");
}

#[test]
fn simulated_fault_lands_in_log_file_and_keeps_exit_code() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let log_path = tmp.path().join("watch.log");

    let status = Command::new(cargo_bin("coroner"))
        .args(["--dsn", DEAD_DSN, "--simulate-fault"])
        .arg("--log-file")
        .arg(&log_path)
        .env("CORONER_SUBMIT_TIMEOUT_SECS", "2")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("primary should run");

    // The fault path exits 2, exactly as the runtime would.
    assert_eq!(status.code(), Some(2));

    let contents = wait_for_log(&log_path, |c| c.contains("panic: divide by zero"));
    assert!(contents.contains("main.f"), "dump mirrored verbatim: {contents}");

    // The watcher must reach EOF after the primary dies, parse the dump,
    // attempt submission (the endpoint is dead) and still finish cleanly.
    let contents = wait_for_log(&log_path, |c| c.contains("watcher finished"));
    assert!(
        contents.contains("thread dump found"),
        "dump must be parsed after EOF: {contents}"
    );
}

/// Extract the integer following `key` in the log text.
fn pid_after(contents: &str, key: &str) -> Option<i32> {
    let start = contents.find(key)?;
    let digits: String = contents[start..]
        .chars()
        .skip(key.len())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[test]
fn watcher_environment_carries_the_marker() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let log_path = tmp.path().join("watch.log");

    // Linger so the watcher is still alive while we inspect it.
    let mut child = Command::new(cargo_bin("coroner"))
        .args(["--dsn", DEAD_DSN, "--linger-ms", "8000"])
        .arg("--log-file")
        .arg(&log_path)
        .env("CORONER_SUBMIT_TIMEOUT_SECS", "2")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("primary should spawn");

    // The supervisor logs the watcher pid right after the fd swap, so the
    // line is mirrored into the log file while both processes run.
    let contents = wait_for_log(&log_path, |c| c.contains("watcher_pid="));
    let pid = pid_after(&contents, "watcher_pid=").expect("watcher pid in log");

    let environ =
        std::fs::read(format!("/proc/{pid}/environ")).expect("read watcher environ");
    let marker = format!("CORONER_WATCHER={DEAD_DSN}");
    assert!(
        environ.split(|b| *b == 0).any(|entry| entry == marker.as_bytes()),
        "watcher environment must carry the endpoint marker"
    );

    // No need to sit out the linger window.
    let _ = child.kill();
    let _ = child.wait();
}
