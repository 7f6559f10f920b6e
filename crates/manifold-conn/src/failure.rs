//! Failure records.
//!
//! When a plug fails, the failure travels as data: a [`Failure`] describes
//! what happened (kind, optional classification tag, reason, backtrace) and
//! a [`Fault`] pairs it with the connection so whoever handles the failure
//! can still produce a response on it.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use serde::Serialize;

use crate::conn::{Conn, SendFailed};

/// The kind of failure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A recoverable error: the plug returned `Err`.
    Error,
    /// A termination signal: a panic crossed the failure boundary.
    Exit,
}

/// A captured failure: what went wrong and where.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    /// Whether this was a recoverable error or a termination signal.
    pub kind: FailureKind,
    /// Classification tag consulted by the status classifier, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Human-readable description of the failure.
    pub reason: String,
    /// Captured backtrace, when backtraces are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl Failure {
    /// An untagged recoverable error.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Error,
            tag: None,
            reason: reason.into(),
            stack: capture_stack(),
        }
    }

    /// A recoverable error carrying a classification tag.
    ///
    /// The tag is what the status classifier keys on: for example
    /// `"payload_too_large"` classifies to 413 by default.
    #[must_use]
    pub fn tagged(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Error,
            tag: Some(tag.into()),
            reason: reason.into(),
            stack: capture_stack(),
        }
    }

    /// A termination signal (used by the failure boundary for panics).
    #[must_use]
    pub fn exit(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Exit,
            tag: None,
            reason: reason.into(),
            stack: capture_stack(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{:?} [{}]: {}", self.kind, tag, self.reason),
            None => write!(f, "{:?}: {}", self.kind, self.reason),
        }
    }
}

/// Capture a backtrace if the environment enables them.
fn capture_stack() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

/// A failed plug invocation: the failure plus the connection it happened on.
#[derive(Debug)]
pub struct Fault {
    /// The connection at the point of failure.
    pub conn: Conn,
    /// The failure record.
    pub failure: Failure,
}

impl Fault {
    /// Pair a connection with a failure record.
    #[must_use]
    pub fn new(conn: Conn, failure: Failure) -> Self {
        Self { conn, failure }
    }

    /// Shorthand for an untagged error fault.
    #[must_use]
    pub fn error(conn: Conn, reason: impl Into<String>) -> Self {
        Self::new(conn, Failure::error(reason))
    }

    /// Shorthand for a tagged error fault.
    #[must_use]
    pub fn tagged(conn: Conn, tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(conn, Failure::tagged(tag, reason))
    }
}

impl From<SendFailed> for Fault {
    fn from(failed: SendFailed) -> Self {
        let reason = failed.error.to_string();
        Self::error(failed.conn, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_failure_display() {
        let failure = Failure::tagged("payload_too_large", "body exceeded 8MB");
        assert_eq!(failure.kind, FailureKind::Error);
        assert_eq!(failure.tag.as_deref(), Some("payload_too_large"));
        assert_eq!(
            failure.to_string(),
            "Error [payload_too_large]: body exceeded 8MB"
        );
    }

    #[test]
    fn exit_failure_has_exit_kind() {
        let failure = Failure::exit("worker aborted");
        assert_eq!(failure.kind, FailureKind::Exit);
        assert!(failure.tag.is_none());
    }

    #[test]
    fn failure_serializes_without_empty_fields() {
        let failure = Failure {
            kind: FailureKind::Error,
            tag: None,
            reason: "boom".to_string(),
            stack: None,
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["reason"], "boom");
        assert!(json.get("tag").is_none());
        assert!(json.get("stack").is_none());
    }
}
