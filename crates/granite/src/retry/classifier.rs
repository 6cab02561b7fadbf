use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

/// Substrings (lowercase) that mark a failure as worth retrying.
///
/// Covers connection drops, timeouts, TLS and DNS trouble, and provider
/// rate-limit or overload signals.
pub const TRANSIENT_MARKERS: &[&str] = &[
    "connection reset",
    "connection refused",
    "connection aborted",
    "connection error",
    "broken pipe",
    "timed out",
    "timeout",
    "deadline exceeded",
    "temporarily unavailable",
    "service unavailable",
    "unavailable",
    "ssl",
    "tls",
    "handshake",
    "name resolution",
    "dns",
    "getaddrinfo",
    "rate limit",
    "ratelimit",
    "quota",
    "resource_exhausted",
    "resource exhausted",
    "too many requests",
    "overloaded",
    "429",
    "503",
];

/// Added on top of a provider's own "retry in N s" hint.
pub const SUGGESTED_WAIT_MARGIN: Duration = Duration::from_secs(5);

/// Minimum wait once a per-day quota is exhausted.
pub const DAILY_QUOTA_FLOOR: Duration = Duration::from_secs(300);

const DAILY_QUOTA_MARKER: &str = "perday";

static RE_RETRY_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)retry in\s*([0-9]+(?:\.[0-9]+)?)\s*s").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Fatal,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

pub fn classify(text: &str) -> ErrorKind {
    let lower = text.to_lowercase();
    if TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ErrorKind::Transient
    } else {
        ErrorKind::Fatal
    }
}

pub fn is_transient(text: &str) -> bool {
    classify(text).is_transient()
}

/// Wait suggested by the error text itself, never shorter than `default`.
///
/// A `retry in <N> s` hint yields `N` plus [`SUGGESTED_WAIT_MARGIN`]; a
/// daily-quota marker raises the result to at least [`DAILY_QUOTA_FLOOR`].
pub fn suggested_wait(text: &str, default: Duration) -> Duration {
    let mut wait = default;

    if let Some(hint) = RE_RETRY_IN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|secs| !secs.is_nan() && *secs >= 0.0)
        .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    {
        wait = wait.max(hint.saturating_add(SUGGESTED_WAIT_MARGIN));
    }

    if text.to_lowercase().contains(DAILY_QUOTA_MARKER) {
        wait = wait.max(DAILY_QUOTA_FLOOR);
    }

    wait
}
