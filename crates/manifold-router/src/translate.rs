//! The failure boundary.
//!
//! Dispatch runs inside a boundary that turns raised failures into HTTP
//! responses without ever sending twice:
//!
//! ```text
//! running ──▶ completed
//!    │
//!    └─▶ failed ──▶ error-response-sent   (hook ran, failure re-raised)
//!            └────▶ exit-propagated      (response was already sent)
//! ```
//!
//! A failure is never swallowed: either the caller gets `Err` carrying the
//! failure record after at most one response was produced, or a panic is
//! resumed unchanged. If the response went out *before* the failure, the
//! boundary stays hands-off — no hook, no second send — and propagates the
//! original signal so the transport can observe it.

use std::collections::HashMap;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use manifold_conn::{Conn, Failure, Fault, Headers, PlugResult, StatusCode};
use tracing::error;

/// A failure together with the status it classified to, as passed to the
/// error hook.
#[derive(Debug)]
pub struct Classified<'a> {
    /// The derived HTTP status.
    pub status: StatusCode,
    /// The original failure record (kind, tag, reason, stack).
    pub failure: &'a Failure,
}

/// User-overridable error hook.
///
/// Receives the connection and the classified failure; returns the
/// connection, normally after sending a response. If the hook returns
/// without sending, the boundary sends the minimal classified response
/// itself so that exactly one response goes out.
pub type ErrorHook = Arc<dyn Fn(Conn, &Classified<'_>) -> Conn + Send + Sync>;

/// Deterministic failure-tag → status table.
///
/// Untagged failures and unknown tags classify to 500. The table is
/// extensible per router via [`StatusClassifier::set`].
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    by_tag: HashMap<String, StatusCode>,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        let mut by_tag = HashMap::new();
        by_tag.insert("bad_request".to_string(), StatusCode::BAD_REQUEST);
        by_tag.insert("request_timeout".to_string(), StatusCode::REQUEST_TIMEOUT);
        by_tag.insert("payload_too_large".to_string(), StatusCode::PAYLOAD_TOO_LARGE);
        by_tag.insert("uri_too_long".to_string(), StatusCode::URI_TOO_LONG);
        by_tag.insert(
            "unsupported_media_type".to_string(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        );
        Self { by_tag }
    }
}

impl StatusClassifier {
    /// The default table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or override the status for a failure tag.
    pub fn set(&mut self, tag: impl Into<String>, status: StatusCode) {
        self.by_tag.insert(tag.into(), status);
    }

    /// Derive the status for a failure.
    #[must_use]
    pub fn classify(&self, failure: &Failure) -> StatusCode {
        failure
            .tag
            .as_deref()
            .and_then(|tag| self.by_tag.get(tag))
            .copied()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// The failure boundary wrapping dispatch.
#[derive(Clone)]
pub(crate) struct Translator {
    classifier: StatusClassifier,
    hook: ErrorHook,
}

impl Translator {
    pub(crate) fn new(classifier: StatusClassifier, hook: Option<ErrorHook>) -> Self {
        Self {
            classifier,
            hook: hook.unwrap_or_else(|| Arc::new(default_hook)),
        }
    }

    /// Run `dispatch` on `conn` inside the boundary.
    ///
    /// # Panics
    ///
    /// A panic from the dispatched code is resumed after the double-send
    /// guard ran: a minimal 500 goes out if nothing was sent yet, and the
    /// original panic payload propagates either way.
    pub(crate) fn run<F>(&self, conn: Conn, dispatch: F) -> PlugResult
    where
        F: FnOnce(Conn) -> PlugResult,
    {
        // The connection value is lost if the handler panics; the adapter
        // handle is what lets us check the sent state afterwards.
        let watch = conn.adapter();
        match catch_unwind(AssertUnwindSafe(|| dispatch(conn))) {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(fault)) => self.translate(fault),
            Err(payload) => {
                if !watch.sent() {
                    error!("handler panicked before a response was sent");
                    let _ = watch.send_resp(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &Headers::new(),
                        StatusCode::INTERNAL_SERVER_ERROR.canonical_reason().as_bytes(),
                    );
                }
                resume_unwind(payload)
            }
        }
    }

    fn translate(&self, fault: Fault) -> PlugResult {
        let Fault { conn, failure } = fault;

        // Post-send failure: the response already went out, so the hook is
        // skipped and the failure propagates untouched.
        if conn.sent() {
            return Err(Fault::new(conn, failure));
        }

        let status = self.classifier.classify(&failure);
        error!(
            status = status.as_u16(),
            kind = ?failure.kind,
            reason = %failure.reason,
            "translating request failure"
        );

        let classified = Classified {
            status,
            failure: &failure,
        };
        let mut conn = (self.hook)(conn, &classified);

        // Exactly one response: if the hook declined to send, do it here.
        if !conn.sent() {
            conn = match conn.send(status, status.canonical_reason()) {
                Ok(conn) => conn,
                Err(failed) => failed.conn,
            };
        }
        Err(Fault::new(conn, failure))
    }
}

/// Default error hook: send a minimal status-only response if none was
/// sent yet.
fn default_hook(conn: Conn, classified: &Classified<'_>) -> Conn {
    if conn.sent() {
        return conn;
    }
    match conn.send(classified.status, classified.status.canonical_reason()) {
        Ok(conn) => conn,
        Err(failed) => failed.conn,
    }
}

#[cfg(test)]
mod tests {
    use manifold_conn::{testing, FailureKind};

    use super::*;

    #[test]
    fn classifier_defaults() {
        let classifier = StatusClassifier::default();
        assert_eq!(
            classifier.classify(&Failure::tagged("payload_too_large", "big")),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            classifier.classify(&Failure::tagged("unsupported_media_type", "xml")),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            classifier.classify(&Failure::error("anything")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            classifier.classify(&Failure::tagged("unknown_tag", "x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn classifier_is_extensible() {
        let mut classifier = StatusClassifier::default();
        classifier.set("teapot", StatusCode::from_u16(418));
        assert_eq!(
            classifier.classify(&Failure::tagged("teapot", "short and stout")),
            StatusCode::from_u16(418)
        );
    }

    #[test]
    fn translate_sends_classified_response_and_reraises() {
        let translator = Translator::new(StatusClassifier::default(), None);
        let (conn, adapter) = testing::conn("GET", "/");

        let fault = translator
            .run(conn, |conn| {
                Err(Fault::tagged(conn, "payload_too_large", "body too big"))
            })
            .unwrap_err();

        assert_eq!(fault.failure.kind, FailureKind::Error);
        assert_eq!(fault.failure.reason, "body too big");
        let sent = adapter.response().unwrap();
        assert_eq!(sent.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(fault.conn.sent());
    }

    #[test]
    fn post_send_fault_skips_hook_and_propagates() {
        let hook_calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hook: ErrorHook = {
            let hook_calls = std::sync::Arc::clone(&hook_calls);
            Arc::new(move |conn, _| {
                hook_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                conn
            })
        };
        let translator = Translator::new(StatusClassifier::default(), Some(hook));
        let (conn, adapter) = testing::conn("GET", "/");

        let fault = translator
            .run(conn, |conn| {
                let conn = conn.send(StatusCode::OK, "done").unwrap();
                Err(Fault::error(conn, "failed after send"))
            })
            .unwrap_err();

        assert_eq!(hook_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(adapter.response().unwrap().status, StatusCode::OK);
        assert_eq!(fault.failure.reason, "failed after send");
    }

    #[test]
    fn unsending_hook_still_yields_one_response() {
        let hook: ErrorHook = Arc::new(|conn, _| conn);
        let translator = Translator::new(StatusClassifier::default(), Some(hook));
        let (conn, adapter) = testing::conn("GET", "/");

        let _ = translator
            .run(conn, |conn| Err(Fault::error(conn, "boom")))
            .unwrap_err();

        let sent = adapter.response().unwrap();
        assert_eq!(sent.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn panic_before_send_produces_minimal_500_and_resumes() {
        let translator = Translator::new(StatusClassifier::default(), None);
        let (conn, adapter) = testing::conn("GET", "/");

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            translator.run(conn, |_conn| panic!("handler exploded"))
        }));

        assert!(result.is_err());
        let sent = adapter.response().unwrap();
        assert_eq!(sent.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn panic_after_send_propagates_without_second_send() {
        let translator = Translator::new(StatusClassifier::default(), None);
        let (conn, adapter) = testing::conn("GET", "/");

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            translator.run(conn, |conn| {
                let _conn = conn.send(StatusCode::OK, "sent first").unwrap();
                panic!("abrupt termination");
            })
        }));

        assert!(result.is_err());
        let sent = adapter.response().unwrap();
        assert_eq!(sent.status, StatusCode::OK);
        assert_eq!(sent.text(), "sent first");
    }
}
