//! Transport adapter seam.
//!
//! A [`Conn`](crate::Conn) does not talk to a socket directly; it sends its
//! response through an [`Adapter`]. The adapter enforces the send-once
//! discipline at the transport boundary and remains reachable even when the
//! connection value itself is lost to a panic, which is what lets the
//! failure boundary check "was a response already sent?" after the fact.

use std::fmt;
use std::sync::Mutex;

use thiserror::Error;

use crate::headers::Headers;
use crate::status::StatusCode;

/// Error sending a response on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// A response was already sent on this connection.
    #[error("a response was already sent on this connection")]
    AlreadySent,
    /// No response (status) has been set on the connection.
    #[error("no response has been set on this connection")]
    NoResponse,
}

/// Transport-side view of a connection.
///
/// Implementations must be safe to share across threads; the router keeps a
/// handle to the adapter across the handler call so it can query the sent
/// state even after a panic.
pub trait Adapter: Send + Sync + fmt::Debug {
    /// Send a response. Fails with [`SendError::AlreadySent`] if a response
    /// already went out on this connection.
    fn send_resp(&self, status: StatusCode, headers: &Headers, body: &[u8])
        -> Result<(), SendError>;

    /// Whether a response has already been sent.
    fn sent(&self) -> bool;
}

/// A response recorded by [`TestAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: Headers,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl SentResponse {
    /// Body interpreted as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// In-process adapter for tests.
///
/// Records at most one response; a second send attempt fails with
/// [`SendError::AlreadySent`]. No network involved.
#[derive(Debug, Default)]
pub struct TestAdapter {
    slot: Mutex<Option<SentResponse>>,
}

impl TestAdapter {
    /// Create a fresh adapter with no recorded response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded response, if one was sent.
    #[must_use]
    pub fn response(&self) -> Option<SentResponse> {
        self.slot.lock().expect("test adapter lock poisoned").clone()
    }
}

impl Adapter for TestAdapter {
    fn send_resp(
        &self,
        status: StatusCode,
        headers: &Headers,
        body: &[u8],
    ) -> Result<(), SendError> {
        let mut slot = self.slot.lock().expect("test adapter lock poisoned");
        if slot.is_some() {
            return Err(SendError::AlreadySent);
        }
        *slot = Some(SentResponse {
            status,
            headers: headers.clone(),
            body: body.to_vec(),
        });
        Ok(())
    }

    fn sent(&self) -> bool {
        self.slot.lock().expect("test adapter lock poisoned").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_first_send() {
        let adapter = TestAdapter::new();
        assert!(!adapter.sent());

        adapter
            .send_resp(StatusCode::OK, &Headers::new(), b"hello")
            .unwrap();
        assert!(adapter.sent());

        let resp = adapter.response().unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.text(), "hello");
    }

    #[test]
    fn second_send_fails() {
        let adapter = TestAdapter::new();
        adapter
            .send_resp(StatusCode::OK, &Headers::new(), b"one")
            .unwrap();

        let err = adapter
            .send_resp(StatusCode::OK, &Headers::new(), b"two")
            .unwrap_err();
        assert_eq!(err, SendError::AlreadySent);
        // First response is untouched.
        assert_eq!(adapter.response().unwrap().text(), "one");
    }
}
