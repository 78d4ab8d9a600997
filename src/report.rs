//! Fatal report assembly from a parsed thread.

use std::collections::BTreeMap;

use crate::dump::{Frame, Thread};

/// Report severity understood by the tracking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Notable but non-fatal condition.
    Warning,
    /// Recoverable error.
    Error,
    /// Post-mortem crash.
    Fatal,
}

/// A structured crash report, built once and consumed by exactly one
/// submission call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Human-readable summary embedding the crashed process's argv, pid,
    /// and the full raw dump text.
    pub message: String,
    /// Always [`Severity::Fatal`] for post-mortem reports.
    pub severity: Severity,
    /// Free-form key/value tags (module, component); empty unless supplied.
    pub tags: BTreeMap<String, String>,
    /// Stack frames, outermost caller first.
    ///
    /// The tracking service aggregates identical crash sites by trace, and
    /// its trace contract is caller-before-callee — the reverse of the
    /// dump's innermost-first order.
    pub frames: Vec<Frame>,
    /// Additional free-form context.
    pub extra: BTreeMap<String, String>,
}

/// Build a fatal report from the failing thread.
///
/// `raw_text` is the complete accumulated stream, embedded verbatim in the
/// message so operators can inspect the whole dump even when frame parsing
/// was partial. `watchee_pid` is the pid of the *crashed* process, not the
/// watcher.
pub fn assemble(
    thread: &Thread,
    raw_text: &str,
    argv: &[String],
    watchee_pid: i32,
    tags: BTreeMap<String, String>,
) -> Report {
    let frames = thread.frames.iter().rev().cloned().collect();
    Report {
        message: format!("Post-mortem {argv:?}, pid={watchee_pid}: {raw_text}"),
        severity: Severity::Fatal,
        tags,
        frames,
        extra: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(function: &str, line: u64) -> Frame {
        Frame {
            function: function.to_owned(),
            module: "main".to_owned(),
            source_path: "/a/b.go".to_owned(),
            line,
        }
    }

    #[test]
    fn frames_are_reversed_to_outermost_first() {
        let thread = Thread {
            id: 1,
            status: "running".to_owned(),
            frames: vec![frame("f", 10), frame("main", 20)],
        };
        let report = assemble(
            &thread,
            "dump",
            &["prog".to_owned()],
            42,
            BTreeMap::new(),
        );

        assert_eq!(report.severity, Severity::Fatal);
        assert_eq!(report.frames.len(), 2);
        assert_eq!(report.frames[0].function, "main");
        assert_eq!(report.frames[1].function, "f");
    }

    #[test]
    fn message_embeds_argv_pid_and_raw_text() {
        let thread = Thread {
            id: 1,
            status: "running".to_owned(),
            frames: Vec::new(),
        };
        let report = assemble(
            &thread,
            "panic: boom",
            &["prog".to_owned(), "--flag".to_owned()],
            1234,
            BTreeMap::new(),
        );

        assert!(report.message.contains("pid=1234"));
        assert!(report.message.contains("--flag"));
        assert!(report.message.contains("panic: boom"));
        assert!(report.tags.is_empty());
        assert!(report.extra.is_empty());
    }
}
