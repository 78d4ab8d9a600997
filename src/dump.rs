//! Thread-dump parsing: raw crash output into threads and call frames.
//!
//! The input is whatever the crashed runtime wrote to stderr: a panic
//! message followed by a traceback of every thread, in the form
//!
//! ```text
//! goroutine 1 [running]:
//! main.f()
//!         /a/b.go:10 +0x1
//! ```
//!
//! Parsing is pure and infallible: unrecognizable input yields an empty
//! [`ThreadDump`], truncated input yields as many complete frames as the
//! text contains.

use regex::Regex;

/// One call site in a thread's stack, innermost first as printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Function or method name without the package prefix (e.g. `f`, `(*T).m`).
    pub function: String,
    /// Package path the function belongs to (e.g. `main`, `github.com/x/y`).
    pub module: String,
    /// Absolute source file path as printed by the runtime.
    pub source_path: String,
    /// Source line number; 0 when the runtime printed something unparsable.
    pub line: u64,
}

/// One execution thread's captured stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    /// Runtime-assigned thread id from the header line.
    pub id: u64,
    /// Status text from the header, e.g. `running` or `chan receive, 2 minutes`.
    pub status: String,
    /// Call stack, innermost frame first (document order).
    pub frames: Vec<Frame>,
}

/// All threads found in a dump, in document order.
///
/// The first thread is conventionally the one that triggered the fault —
/// the runtime prints the faulting thread's traceback first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadDump {
    /// Parsed threads in order of appearance.
    pub threads: Vec<Thread>,
}

impl ThreadDump {
    /// Returns `true` when no thread header was found ("no crash").
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// The first thread in document order, if any.
    pub fn first(&self) -> Option<&Thread> {
        self.threads.first()
    }
}

/// Parser with pre-compiled line patterns.
#[derive(Debug)]
pub struct DumpParser {
    header: Regex,
    location: Regex,
}

impl Default for DumpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpParser {
    /// Create a parser.
    pub fn new() -> Self {
        Self {
            header: Regex::new(r"^goroutine (\d+) \[([^\]]+)\]:\s*$")
                .expect("header pattern is a valid literal"),
            location: Regex::new(r"^\t(.+?):(\d+)(?: \+0x[0-9a-fA-F]+)?$")
                .expect("location pattern is a valid literal"),
        }
    }

    /// Parse raw crash output into a [`ThreadDump`].
    ///
    /// Leading non-dump text (the panic message) is skipped. Input with no
    /// recognizable thread header yields an empty dump, never an error.
    /// Bytes are decoded lossily; a dump cut off mid-frame keeps the
    /// frames parsed so far and drops the dangling half-frame.
    pub fn parse(&self, input: &[u8]) -> ThreadDump {
        let text = String::from_utf8_lossy(input);
        let mut threads = Vec::new();

        let mut lines = text.lines().peekable();
        while let Some(line) = lines.next() {
            let Some(caps) = self.header.captures(line) else {
                continue;
            };

            let id = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            let status = caps
                .get(2)
                .map(|m| m.as_str().to_owned())
                .unwrap_or_default();

            let mut frames = Vec::new();
            while let Some(&next) = lines.peek() {
                // A blank line or the next header ends this thread's section.
                if next.trim().is_empty() || self.header.is_match(next) {
                    break;
                }
                let Some(candidate) = lines.next() else {
                    break;
                };
                let Some(symbol) = symbol_of(candidate) else {
                    continue;
                };
                // A symbol line is only a frame if the location line follows;
                // otherwise the stream was cut off and the half-frame is dropped.
                let location = lines.peek().and_then(|l| self.location_of(l));
                if let Some((source_path, line_no)) = location {
                    lines.next();
                    let (module, function) = split_symbol(&symbol);
                    frames.push(Frame {
                        function,
                        module,
                        source_path,
                        line: line_no,
                    });
                }
            }

            threads.push(Thread { id, status, frames });
        }

        ThreadDump { threads }
    }

    fn location_of(&self, line: &str) -> Option<(String, u64)> {
        let caps = self.location.captures(line)?;
        let path = caps.get(1)?.as_str().to_owned();
        let line_no = caps.get(2)?.as_str().parse().unwrap_or(0);
        Some((path, line_no))
    }
}

/// Extract the symbol from a frame's first line, stripping the argument
/// list and the `created by ... in goroutine N` decoration.
fn symbol_of(line: &str) -> Option<String> {
    if line.starts_with('\t') {
        return None;
    }
    let mut s = line.trim_end();
    if let Some(rest) = s.strip_prefix("created by ") {
        s = rest;
    }
    if let Some((head, _)) = s.split_once(" in goroutine") {
        s = head;
    }
    if s.ends_with(')') {
        if let Some(idx) = s.rfind('(') {
            s = &s[..idx];
        }
    }
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

/// Split a qualified symbol into (package path, function name).
///
/// `main.f` → (`main`, `f`); `github.com/x/y.(*T).m` → (`github.com/x/y`,
/// `(*T).m`). The package boundary is the first dot of the last path
/// segment.
fn split_symbol(symbol: &str) -> (String, String) {
    let (dir, tail) = match symbol.rsplit_once('/') {
        Some((dir, tail)) => (Some(dir), tail),
        None => (None, symbol),
    };
    let (pkg, function) = match tail.split_once('.') {
        Some((pkg, function)) => (pkg, function),
        None => (tail, ""),
    };
    let module = match dir {
        Some(dir) => format!("{dir}/{pkg}"),
        None => pkg.to_owned(),
    };
    (module, function.to_owned())
}
