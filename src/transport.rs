//! Report submission seam and its Sentry implementation.
//!
//! The watcher never talks to a global client: it receives a [`Transport`]
//! value constructed once at startup, so tests can swap in a fake. The
//! real implementation wraps an explicit [`sentry::Client`] and bounds
//! every submission with a fixed timeout — the watcher is the last process
//! standing and nothing is left to kill it if it hangs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sentry::protocol::{Event, Level, Stacktrace, Value};
use sentry::types::Dsn;
use thiserror::Error;

use crate::report::{Report, Severity};

/// Submission failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint string is not a valid DSN.
    #[error("invalid error-tracking endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        /// The rejected endpoint string.
        endpoint: String,
        /// Underlying DSN parse error.
        source: sentry::types::ParseDsnError,
    },
    /// The service did not acknowledge within the configured bound.
    #[error("report submission did not complete within {seconds}s")]
    Timeout {
        /// The bound that was exceeded, in seconds.
        seconds: u64,
    },
    /// Any other submission failure.
    #[error("report submission failed: {0}")]
    Submit(String),
}

/// Synchronous "submit and wait for acknowledgment or timeout" contract.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit one report, consuming it. Returns once the service has
    /// acknowledged, the submission has failed, or the bound has elapsed.
    async fn submit(&self, report: Report) -> Result<(), TransportError>;
}

/// [`Transport`] backed by an explicit Sentry client.
pub struct SentryTransport {
    client: Arc<sentry::Client>,
    timeout: Duration,
}

impl SentryTransport {
    /// Build a transport for `endpoint`, validating the DSN eagerly.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidEndpoint`] when the DSN does not
    /// parse; a watcher holding a bad endpoint should know before it
    /// spends its one shot.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let dsn: Dsn = endpoint
            .parse()
            .map_err(|source| TransportError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                source,
            })?;
        let options = sentry::ClientOptions {
            dsn: Some(dsn),
            shutdown_timeout: timeout,
            ..Default::default()
        };
        Ok(Self {
            client: Arc::new(sentry::Client::from_config(options)),
            timeout,
        })
    }
}

#[async_trait]
impl Transport for SentryTransport {
    async fn submit(&self, report: Report) -> Result<(), TransportError> {
        let client = Arc::clone(&self.client);
        let timeout = self.timeout;
        let event = into_event(report);

        // capture_event queues; flush blocks until sent or the bound
        // elapses. Both run off the async thread.
        let flushed = tokio::task::spawn_blocking(move || {
            client.capture_event(event, None);
            client.flush(Some(timeout))
        })
        .await
        .map_err(|e| TransportError::Submit(e.to_string()))?;

        if flushed {
            Ok(())
        } else {
            Err(TransportError::Timeout {
                seconds: timeout.as_secs(),
            })
        }
    }
}

fn level_of(severity: Severity) -> Level {
    match severity {
        Severity::Warning => Level::Warning,
        Severity::Error => Level::Error,
        Severity::Fatal => Level::Fatal,
    }
}

fn into_event(report: Report) -> Event<'static> {
    let frames = report
        .frames
        .iter()
        .map(|f| sentry::protocol::Frame {
            function: Some(f.function.clone()),
            module: Some(f.module.clone()),
            filename: Path::new(&f.source_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            abs_path: Some(f.source_path.clone()),
            lineno: Some(f.line),
            in_app: Some(false),
            ..Default::default()
        })
        .collect();

    Event {
        message: Some(report.message),
        level: level_of(report.severity),
        stacktrace: Some(Stacktrace {
            frames,
            ..Default::default()
        }),
        tags: report.tags.into_iter().collect(),
        extra: report
            .extra
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
        ..Default::default()
    }
}
