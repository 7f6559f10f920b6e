//! The connection value.
//!
//! A [`Conn`] is the request/response record threaded through every plug.
//! It is a value type: operations consume the connection and return the
//! updated one, so a handler reads as a pipeline of transformations.
//!
//! # Response lifecycle
//!
//! ```text
//! Unset ──resp()──▶ Set ──send_resp()──▶ Sent
//! ```
//!
//! Sending is a one-way door: once the state reaches `Sent`, any further
//! send attempt fails with [`SendError::AlreadySent`]. The sent state is an
//! explicit field checked by direct read, and the adapter keeps its own
//! record so the state survives even when the connection value is lost.

use std::sync::Arc;

use crate::adapter::{Adapter, SendError};
use crate::headers::Headers;
use crate::method::Method;
use crate::params::Params;
use crate::status::StatusCode;

/// Response lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No response has been set.
    Unset,
    /// A response is set but not yet sent.
    Set,
    /// The response has been sent; the connection is terminal.
    Sent,
}

/// A failed send, carrying the connection back to the caller.
///
/// Sending consumes the connection, so the error path must return it;
/// otherwise an error response could never be produced afterwards.
#[derive(Debug)]
pub struct SendFailed {
    /// The connection, unchanged.
    pub conn: Conn,
    /// What went wrong.
    pub error: SendError,
}

/// Immutable-style request/response record.
#[derive(Debug, Clone)]
pub struct Conn {
    adapter: Arc<dyn Adapter>,
    method: Method,
    host: String,
    request_path: String,
    query_string: Option<String>,
    req_headers: Headers,
    script_name: Vec<String>,
    path_info: Vec<String>,
    params: Params,
    status: Option<StatusCode>,
    resp_headers: Headers,
    resp_body: Vec<u8>,
    state: ConnState,
    halted: bool,
}

impl Conn {
    /// Create a connection for an incoming request.
    ///
    /// `target` is the request target: a path, optionally followed by
    /// `?query`. The path is split into segments; empty segments (from
    /// duplicate or trailing slashes) are dropped.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn Adapter>,
        method: Method,
        host: impl Into<String>,
        target: &str,
    ) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (target, None),
        };
        let path_info: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            adapter,
            method,
            host: host.into(),
            request_path: path.to_string(),
            query_string: query,
            req_headers: Headers::new(),
            script_name: Vec::new(),
            path_info,
            params: Params::new(),
            status: None,
            resp_headers: Headers::new(),
            resp_body: Vec::new(),
            state: ConnState::Unset,
            halted: false,
        }
    }

    // ------------------------------------------------------------------
    // Request side
    // ------------------------------------------------------------------

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The original request path, as received.
    #[must_use]
    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    /// The raw query string, if any.
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Request headers.
    #[must_use]
    pub fn req_headers(&self) -> &Headers {
        &self.req_headers
    }

    /// Set a request header (useful when building test requests).
    #[must_use]
    pub fn put_req_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.req_headers.insert(name, value);
        self
    }

    // ------------------------------------------------------------------
    // Path bookkeeping
    // ------------------------------------------------------------------

    /// The mount prefix consumed by forwarding so far.
    #[must_use]
    pub fn script_name(&self) -> &[String] {
        &self.script_name
    }

    /// The remaining, unmatched path segments.
    #[must_use]
    pub fn path_info(&self) -> &[String] {
        &self.path_info
    }

    /// Move `consumed` onto the mount prefix and replace the remaining path.
    ///
    /// Invariant: `script_name ++ path_info` always reconstructs the
    /// original request path, so `consumed` must be the leading slice of
    /// the current `path_info` and `remaining` the rest of it.
    #[must_use]
    pub fn rewrite_path(mut self, consumed: Vec<String>, remaining: Vec<String>) -> Self {
        self.script_name.extend(consumed);
        self.path_info = remaining;
        self
    }

    /// `script_name ++ path_info`, joined back into a path.
    #[must_use]
    pub fn full_path(&self) -> String {
        let mut path = String::new();
        for segment in self.script_name.iter().chain(self.path_info.iter()) {
            path.push('/');
            path.push_str(segment);
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// All parameters bound so far.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Merge path captures into the parameter set.
    ///
    /// Incoming bindings win over previously fetched ones with the same
    /// name. Values stay strings (or sequences of strings) verbatim.
    #[must_use]
    pub fn merge_params(mut self, captures: Params) -> Self {
        self.params.merge(captures);
        self
    }

    // ------------------------------------------------------------------
    // Response side
    // ------------------------------------------------------------------

    /// Response status, if set.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Response lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Whether the response has been sent.
    #[must_use]
    pub fn sent(&self) -> bool {
        self.state == ConnState::Sent
    }

    /// Response headers set so far.
    #[must_use]
    pub fn resp_headers(&self) -> &Headers {
        &self.resp_headers
    }

    /// Response body set so far.
    #[must_use]
    pub fn resp_body(&self) -> &[u8] {
        &self.resp_body
    }

    /// Set a response header.
    #[must_use]
    pub fn put_resp_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.resp_headers.insert(name, value);
        self
    }

    /// Get a response header by name.
    #[must_use]
    pub fn get_resp_header(&self, name: &str) -> Option<&str> {
        self.resp_headers.get(name)
    }

    /// Set the response status without touching the body.
    #[must_use]
    pub fn put_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        if self.state == ConnState::Unset {
            self.state = ConnState::Set;
        }
        self
    }

    /// Set the response status and body without sending.
    #[must_use]
    pub fn resp(mut self, status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        self.status = Some(status);
        self.resp_body = body.into();
        if self.state == ConnState::Unset {
            self.state = ConnState::Set;
        }
        self
    }

    /// Send the previously set response through the adapter.
    ///
    /// # Errors
    ///
    /// [`SendError::NoResponse`] if no response was set, and
    /// [`SendError::AlreadySent`] if one already went out. The connection
    /// is returned inside the error either way.
    pub fn send_resp(mut self) -> Result<Self, SendFailed> {
        if self.state == ConnState::Sent {
            return Err(SendFailed {
                conn: self,
                error: SendError::AlreadySent,
            });
        }
        let Some(status) = self.status else {
            return Err(SendFailed {
                conn: self,
                error: SendError::NoResponse,
            });
        };
        if let Err(error) = self
            .adapter
            .send_resp(status, &self.resp_headers, &self.resp_body)
        {
            return Err(SendFailed { conn: self, error });
        }
        self.state = ConnState::Sent;
        Ok(self)
    }

    /// Set and send a response in one step.
    ///
    /// # Errors
    ///
    /// [`SendError::AlreadySent`] if a response already went out.
    pub fn send(self, status: StatusCode, body: impl Into<Vec<u8>>) -> Result<Self, SendFailed> {
        if self.state == ConnState::Sent {
            return Err(SendFailed {
                conn: self,
                error: SendError::AlreadySent,
            });
        }
        self.resp(status, body).send_resp()
    }

    // ------------------------------------------------------------------
    // Pipeline control
    // ------------------------------------------------------------------

    /// Halt the pipeline: no further plugs will be invoked.
    #[must_use]
    pub fn halt(mut self) -> Self {
        self.halted = true;
        self
    }

    /// Whether the pipeline has been halted.
    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// A handle on the transport adapter.
    ///
    /// The failure boundary holds one of these across the handler call so
    /// it can still query the sent state after a panic consumed the
    /// connection value.
    #[must_use]
    pub fn adapter(&self) -> Arc<dyn Adapter> {
        Arc::clone(&self.adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TestAdapter;

    fn test_conn(target: &str) -> (Conn, Arc<TestAdapter>) {
        let adapter = Arc::new(TestAdapter::new());
        let conn = Conn::new(
            Arc::clone(&adapter) as Arc<dyn Adapter>,
            Method::Get,
            "www.example.com",
            target,
        );
        (conn, adapter)
    }

    #[test]
    fn splits_path_into_segments() {
        let (conn, _) = test_conn("/users/42/posts");
        assert_eq!(conn.path_info(), ["users", "42", "posts"]);
        assert_eq!(conn.request_path(), "/users/42/posts");
        assert!(conn.script_name().is_empty());
    }

    #[test]
    fn drops_empty_segments() {
        let (conn, _) = test_conn("//users///42/");
        assert_eq!(conn.path_info(), ["users", "42"]);
    }

    #[test]
    fn separates_query_string() {
        let (conn, _) = test_conn("/search?q=hello");
        assert_eq!(conn.request_path(), "/search");
        assert_eq!(conn.query_string(), Some("q=hello"));
        assert_eq!(conn.path_info(), ["search"]);
    }

    #[test]
    fn state_machine_unset_to_sent() {
        let (conn, adapter) = test_conn("/");
        assert_eq!(conn.state(), ConnState::Unset);

        let conn = conn.resp(StatusCode::OK, "hello");
        assert_eq!(conn.state(), ConnState::Set);
        assert!(!adapter.sent());

        let conn = conn.send_resp().unwrap();
        assert_eq!(conn.state(), ConnState::Sent);
        assert!(conn.sent());
        assert_eq!(adapter.response().unwrap().text(), "hello");
    }

    #[test]
    fn put_status_alone_is_sendable() {
        let (conn, adapter) = test_conn("/");
        let conn = conn.put_status(StatusCode::NO_CONTENT);
        assert_eq!(conn.state(), ConnState::Set);
        let conn = conn.send_resp().unwrap();
        assert!(conn.sent());
        assert_eq!(adapter.response().unwrap().status, StatusCode::NO_CONTENT);
        assert!(adapter.response().unwrap().body.is_empty());
    }

    #[test]
    fn send_without_resp_fails() {
        let (conn, _) = test_conn("/");
        let failed = conn.send_resp().unwrap_err();
        assert_eq!(failed.error, SendError::NoResponse);
        assert_eq!(failed.conn.state(), ConnState::Unset);
    }

    #[test]
    fn double_send_fails_and_returns_conn() {
        let (conn, adapter) = test_conn("/");
        let conn = conn.send(StatusCode::OK, "first").unwrap();

        let failed = conn.send(StatusCode::OK, "second").unwrap_err();
        assert_eq!(failed.error, SendError::AlreadySent);
        assert!(failed.conn.sent());
        assert_eq!(adapter.response().unwrap().text(), "first");
    }

    #[test]
    fn rewrite_path_preserves_full_path() {
        let (conn, _) = test_conn("/nested/forward/leaf");
        let original = conn.full_path();

        let mut info = conn.path_info().to_vec();
        let leftover = info.split_off(1);
        let conn = conn.rewrite_path(info, leftover);

        assert_eq!(conn.script_name(), ["nested"]);
        assert_eq!(conn.path_info(), ["forward", "leaf"]);
        assert_eq!(conn.full_path(), original);
    }

    #[test]
    fn full_path_of_root_is_slash() {
        let (conn, _) = test_conn("/");
        assert_eq!(conn.full_path(), "/");
    }

    #[test]
    fn merge_params_prefers_captures() {
        let (conn, _) = test_conn("/");
        let mut fetched = Params::new();
        fetched.insert("id", "query");
        let conn = conn.merge_params(fetched);

        let mut captures = Params::new();
        captures.insert("id", "path");
        let conn = conn.merge_params(captures);

        assert_eq!(conn.params().get_str("id"), Some("path"));
    }

    #[test]
    fn halt_sets_flag() {
        let (conn, _) = test_conn("/");
        assert!(!conn.halted());
        assert!(conn.halt().halted());
    }

    #[test]
    fn resp_headers_round_trip() {
        let (conn, adapter) = test_conn("/");
        let conn = conn
            .put_resp_header("content-type", "text/plain")
            .send(StatusCode::OK, "x")
            .unwrap();
        assert_eq!(conn.get_resp_header("Content-Type"), Some("text/plain"));
        let sent = adapter.response().unwrap();
        assert_eq!(sent.headers.get("content-type"), Some("text/plain"));
    }
}
