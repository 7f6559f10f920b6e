//! Declarative request routing over `manifold-conn`.
//!
//! Routes are declared in order against a builder, compiled once into a
//! flat table, and matched first-to-last at dispatch time. Path templates
//! support literal segments, `:name` captures, `prefix-:name` suffix
//! captures, `*name` trailing globs, and `prefix-*name` prefixed globs;
//! routes can additionally be constrained by host pattern, verb, and an
//! arbitrary guard over the captured bindings.
//!
//! Sub-routers mount via `forward`, which moves the matched prefix onto
//! the connection's `script_name` so nested routers only ever see the
//! path left for them. Dispatch runs inside an error translator that
//! turns handler failures into HTTP responses and never sends twice.
//!
//! ```
//! use manifold_conn::{testing, Conn, Opts, PlugFn, PlugResult, StatusCode};
//! use manifold_router::Router;
//!
//! fn show(conn: Conn, _opts: &Opts) -> PlugResult {
//!     let id = conn.params().get_str("id").unwrap_or("?").to_string();
//!     Ok(conn.send(StatusCode::OK, id)?)
//! }
//!
//! let router = Router::builder()
//!     .get("/users/:id", PlugFn(show))
//!     .build()
//!     .unwrap();
//!
//! let (conn, adapter) = testing::conn("GET", "/users/42");
//! router.call(conn).unwrap();
//! assert_eq!(adapter.response().unwrap().text(), "42");
//! ```

#![forbid(unsafe_code)]

mod builder;
mod dispatch;
mod route;
mod segment;
mod translate;

pub use builder::{BuildError, RouterBuilder, RouteSpec, Scope};
pub use dispatch::Router;
pub use route::{Guard, MatchOutcome, Route, RouteMatch};
pub use segment::{HostSpec, PathSpec, Segment, TemplateError};
pub use translate::{Classified, ErrorHook, StatusClassifier};
