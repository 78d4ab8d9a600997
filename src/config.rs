//! Environment contract between the supervisor and the watcher.
//!
//! A single marker variable switches a re-invoked copy of the binary into
//! watcher mode; its value is the error-tracking endpoint (Sentry DSN).
//! The submission timeout can be overridden through the environment, with
//! invalid values logged and ignored.

use std::time::Duration;

/// Marker variable set on the watcher child by the supervisor.
///
/// Presence means "run as watcher"; the value is the Sentry DSN. The
/// supervisor never sets this on itself, so a plain invocation of the
/// binary stays in normal mode.
pub const WATCHER_ENV: &str = "CORONER_WATCHER";

/// Optional override for the report submission timeout, in whole seconds.
pub const SUBMIT_TIMEOUT_ENV: &str = "CORONER_SUBMIT_TIMEOUT_SECS";

/// Default bound on the synchronous report submission.
///
/// Five seconds is enough for one HTTPS round trip to Sentry; the watcher
/// has no supervisor of its own left to kill it, so this must stay short.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns the watcher endpoint when this process was spawned in watcher
/// mode, `None` otherwise. An empty value counts as absent.
pub fn watcher_endpoint() -> Option<String> {
    std::env::var(WATCHER_ENV).ok().filter(|v| !v.is_empty())
}

/// Resolve the submission timeout from the process environment.
pub fn submit_timeout() -> Duration {
    submit_timeout_from(|key| std::env::var(key).ok())
}

/// Resolve the submission timeout using a custom env resolver (for testing).
///
/// Unparsable overrides are logged and ignored.
pub fn submit_timeout_from(env: impl Fn(&str) -> Option<String>) -> Duration {
    match env(SUBMIT_TIMEOUT_ENV) {
        Some(v) => match v.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                tracing::warn!(
                    var = SUBMIT_TIMEOUT_ENV,
                    value = %v,
                    "ignoring invalid timeout override"
                );
                DEFAULT_SUBMIT_TIMEOUT
            }
        },
        None => DEFAULT_SUBMIT_TIMEOUT,
    }
}
