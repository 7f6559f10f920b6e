//! The plug contract and pipelines.
//!
//! A [`Plug`] is anything exposing `call(conn, opts) -> Result<Conn, Fault>`.
//! Routers, leaf handlers, and middleware all share this one signature,
//! which is what makes them interchangeable dispatch targets: a router can
//! forward to another router or to a plain handler without knowing which it
//! has.
//!
//! # Halting
//!
//! A [`Pipeline`] invokes its plugs in registration order. A plug that
//! calls [`Conn::halt`] stops the pipeline: remaining plugs are skipped and
//! the connection is returned as-is.

use std::sync::Arc;

use crate::conn::Conn;
use crate::failure::Fault;

/// Static options attached to a plug at declaration time.
///
/// Options are arbitrary JSON-shaped data, attached once when routes are
/// declared and passed by reference on every call.
pub type Opts = serde_json::Value;

/// Result of a plug invocation.
pub type PlugResult = Result<Conn, Fault>;

/// A unit of request processing: `call(conn, opts) -> conn'`.
pub trait Plug: Send + Sync {
    /// Process a connection, returning the transformed connection or a
    /// fault carrying it.
    fn call(&self, conn: Conn, opts: &Opts) -> PlugResult;
}

impl Plug for Arc<dyn Plug> {
    fn call(&self, conn: Conn, opts: &Opts) -> PlugResult {
        (**self).call(conn, opts)
    }
}

/// Adapter turning a plain function or closure into a [`Plug`].
///
/// ```
/// use manifold_conn::{Conn, Opts, Plug, PlugFn, PlugResult, StatusCode};
///
/// let hello = PlugFn(|conn: Conn, _opts: &Opts| -> PlugResult {
///     Ok(conn.send(StatusCode::OK, "hello")?)
/// });
/// ```
pub struct PlugFn<F>(pub F);

impl<F> Plug for PlugFn<F>
where
    F: Fn(Conn, &Opts) -> PlugResult + Send + Sync,
{
    fn call(&self, conn: Conn, opts: &Opts) -> PlugResult {
        (self.0)(conn, opts)
    }
}

/// An ordered chain of plugs honoring the halt flag.
#[derive(Default)]
pub struct Pipeline {
    plugs: Vec<(Arc<dyn Plug>, Opts)>,
}

impl Pipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plug with no options.
    #[must_use]
    pub fn plug(self, plug: impl Plug + 'static) -> Self {
        self.plug_with(plug, Opts::Null)
    }

    /// Append a plug with static options.
    #[must_use]
    pub fn plug_with(mut self, plug: impl Plug + 'static, opts: Opts) -> Self {
        self.plugs.push((Arc::new(plug), opts));
        self
    }

    /// Number of plugs in the pipeline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugs.len()
    }

    /// Check if the pipeline is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugs.is_empty()
    }

    /// Run the pipeline over a connection.
    ///
    /// Each plug runs in registration order until one halts the connection
    /// or fails.
    ///
    /// # Errors
    ///
    /// Propagates the first [`Fault`] returned by a plug.
    pub fn run(&self, mut conn: Conn) -> PlugResult {
        for (plug, opts) in &self.plugs {
            if conn.halted() {
                break;
            }
            conn = plug.call(conn, opts)?;
        }
        Ok(conn)
    }
}

impl Plug for Pipeline {
    fn call(&self, conn: Conn, _opts: &Opts) -> PlugResult {
        self.run(conn)
    }
}
