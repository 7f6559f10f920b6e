//! Connection value and plug abstraction for manifold.
//!
//! This crate provides the fundamental building blocks consumed by the
//! router:
//! - [`Conn`] — the immutable-style request/response record with its
//!   `Unset → Set → Sent` lifecycle and send-once discipline
//! - [`Plug`] — the uniform `call(conn, opts) -> conn'` contract shared by
//!   handlers, middleware, and routers
//! - [`Pipeline`] — an ordered plug chain honoring the halt flag
//! - [`Failure`] / [`Fault`] — failure-as-data records consumed by the
//!   router's failure boundary
//! - [`Adapter`] — the transport seam, with a [`TestAdapter`] for
//!   in-process tests
//!
//! # Design Principles
//!
//! - Connections are values: operations consume and return them
//! - At most one response is ever sent per connection
//! - No I/O happens here; the adapter owns the transport
//! - All types are `Send + Sync` so one connection per worker can run
//!   concurrently against a shared router

#![forbid(unsafe_code)]

mod adapter;
mod conn;
mod failure;
mod headers;
mod method;
mod params;
mod plug;
mod status;
pub mod testing;

pub use adapter::{Adapter, SendError, SentResponse, TestAdapter};
pub use conn::{Conn, ConnState, SendFailed};
pub use failure::{Failure, FailureKind, Fault};
pub use headers::Headers;
pub use method::Method;
pub use params::{ParamValue, Params};
pub use plug::{Opts, Pipeline, Plug, PlugFn, PlugResult};
pub use status::StatusCode;
