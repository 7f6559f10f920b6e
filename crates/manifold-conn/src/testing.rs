//! Test helpers for building connections in-process.
//!
//! No network is involved: the returned [`TestAdapter`] records the single
//! response a connection sends, so assertions run against plain values.
//!
//! # Example
//!
//! ```
//! use manifold_conn::testing;
//! use manifold_conn::StatusCode;
//!
//! let (conn, adapter) = testing::conn("GET", "/hello");
//! let _conn = conn.send(StatusCode::OK, "hi").unwrap();
//!
//! let sent = adapter.response().unwrap();
//! assert_eq!(sent.status, StatusCode::OK);
//! assert_eq!(sent.text(), "hi");
//! ```

use std::sync::Arc;

use crate::adapter::{Adapter, TestAdapter};
use crate::conn::Conn;
use crate::method::Method;

/// Default host used by [`conn`].
pub const DEFAULT_HOST: &str = "www.example.com";

/// Build a test connection with the default host.
///
/// Returns the connection and the adapter handle for asserting on the sent
/// response.
#[must_use]
pub fn conn(method: &str, target: &str) -> (Conn, Arc<TestAdapter>) {
    conn_with_host(method, DEFAULT_HOST, target)
}

/// Build a test connection with an explicit host.
#[must_use]
pub fn conn_with_host(method: &str, host: &str, target: &str) -> (Conn, Arc<TestAdapter>) {
    let adapter = Arc::new(TestAdapter::new());
    let conn = Conn::new(
        Arc::clone(&adapter) as Arc<dyn Adapter>,
        Method::parse(method),
        host,
        target,
    );
    (conn, adapter)
}
