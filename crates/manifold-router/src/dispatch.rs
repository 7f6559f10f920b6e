//! The dispatcher.
//!
//! A [`Router`] holds the compiled route table and walks it top to bottom
//! for each connection; the first route whose checks all pass wins.
//! Dispatch runs inside the error translator, so a failing or panicking
//! handler still produces a response.

use std::sync::Arc;

use manifold_conn::{Conn, Opts, Plug, PlugFn, PlugResult, StatusCode};
use tracing::trace;

use crate::builder::RouterBuilder;
use crate::route::{MatchOutcome, Route, RouteMatch, Target};
use crate::translate::Translator;

/// An immutable, compiled router.
///
/// Cheap to clone and share; the route table lives behind an `Arc`. A
/// router is itself a [`Plug`], so it can be mounted inside another router
/// via `forward` or run as a step in a pipeline.
#[derive(Clone)]
pub struct Router {
    routes: Arc<Vec<Route>>,
    not_found: Arc<dyn Plug>,
    translator: Translator,
}

impl Router {
    pub(crate) fn new(
        routes: Vec<Route>,
        not_found: Option<Arc<dyn Plug>>,
        translator: Translator,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            not_found: not_found.unwrap_or_else(|| Arc::new(PlugFn(default_not_found))),
            translator,
        }
    }

    /// Start declaring routes.
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// The compiled route table, in precedence order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Route a connection through the table, inside the error translator.
    ///
    /// On success the returned connection has sent its response (or a
    /// handler deliberately left it unsent). Recoverable failures come
    /// back as `Err` after a response was sent on their behalf; see the
    /// translator module for the exact contract.
    ///
    /// # Errors
    ///
    /// Returns the translated failure after a response has been sent.
    pub fn call(&self, conn: Conn) -> PlugResult {
        self.translator.run(conn, |conn| self.dispatch(conn))
    }

    /// Walk the table; first full match wins.
    fn dispatch(&self, conn: Conn) -> PlugResult {
        for route in self.routes.iter() {
            match route.try_match(&conn) {
                MatchOutcome::Matched(m) => {
                    trace!(pattern = route.pattern(), "route matched");
                    return self.invoke(conn, route, m);
                }
                MatchOutcome::GuardRejected => {
                    trace!(pattern = route.pattern(), "guard rejected, continuing");
                }
                MatchOutcome::NoMatch => {}
            }
        }
        trace!(path = conn.request_path(), "no route matched");
        self.not_found.call(conn, &Opts::Null)
    }

    fn invoke(&self, conn: Conn, route: &Route, m: RouteMatch) -> PlugResult {
        let conn = conn.merge_params(m.params);
        match &route.target {
            Target::Inline { plug, opts } => plug.call(conn, opts),
            Target::Forward { plug } => {
                let consumed = conn.path_info()[..m.consumed].to_vec();
                let leftover = conn.path_info()[m.consumed..].to_vec();
                let conn = conn.rewrite_path(consumed, leftover);
                plug.call(conn, &Opts::Null)
            }
        }
    }
}

impl Plug for Router {
    fn call(&self, conn: Conn, _opts: &Opts) -> PlugResult {
        Router::call(self, conn)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

/// Fallback when no route matches.
fn default_not_found(conn: Conn, _opts: &Opts) -> PlugResult {
    Ok(conn.send(StatusCode::NOT_FOUND, "Not Found")?)
}
