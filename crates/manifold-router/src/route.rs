//! Compiled routes and match outcomes.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use manifold_conn::{Conn, Method, Opts, Params, Plug};

use crate::segment::{HostSpec, PathSpec};

/// Method constraint of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSpec {
    /// Matches any verb, including extension methods.
    Any,
    /// Matches one specific verb.
    Only(Method),
}

impl MethodSpec {
    /// Check a request method against this constraint.
    #[must_use]
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            Self::Any => true,
            Self::Only(only) => only == method,
        }
    }
}

/// Guard predicate over a route's capture bindings.
///
/// Evaluated only after a structural match succeeds. Returning `false` (or
/// panicking) rejects the candidate; dispatch then continues with the next
/// route.
pub type Guard = Arc<dyn Fn(&Params) -> bool + Send + Sync>;

/// Where a matched route dispatches to.
pub enum Target {
    /// Invoke a handler with the route's static options.
    Inline {
        /// The handler.
        plug: Arc<dyn Plug>,
        /// Options attached at declaration time.
        opts: Opts,
    },
    /// Delegate the unmatched path suffix to a sub-router.
    Forward {
        /// The sub-router (any plug).
        plug: Arc<dyn Plug>,
    },
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline { opts, .. } => f.debug_struct("Inline").field("opts", opts).finish(),
            Self::Forward { .. } => f.debug_struct("Forward").finish(),
        }
    }
}

/// One compiled route. Immutable once built; precedence is purely the
/// declaration order in the route table.
pub struct Route {
    pub(crate) method: MethodSpec,
    pub(crate) host: HostSpec,
    pub(crate) path: PathSpec,
    pub(crate) guard: Option<Guard>,
    pub(crate) target: Target,
    pub(crate) pattern: String,
}

impl Route {
    /// The declared path template (after scope prefixes were applied).
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The method constraint.
    #[must_use]
    pub fn method(&self) -> &MethodSpec {
        &self.method
    }

    /// The host constraint.
    #[must_use]
    pub fn host(&self) -> &HostSpec {
        &self.host
    }

    /// Whether this route forwards to a sub-router.
    #[must_use]
    pub fn is_forward(&self) -> bool {
        matches!(self.target, Target::Forward { .. })
    }

    /// Check this route against a connection.
    ///
    /// Checks run in order: method, host, path structure, guard. The path
    /// is matched against the connection's remaining segments
    /// (`path_info`), not the original request path.
    pub(crate) fn try_match(&self, conn: &Conn) -> MatchOutcome {
        if !self.method.matches(conn.method()) {
            return MatchOutcome::NoMatch;
        }
        if !self.host.matches(conn.host()) {
            return MatchOutcome::NoMatch;
        }
        let structural = match &self.target {
            Target::Forward { .. } => self.path.match_prefix(conn.path_info()),
            Target::Inline { .. } => self
                .path
                .matches(conn.path_info())
                .map(|params| (params, conn.path_info().len())),
        };
        let Some((params, consumed)) = structural else {
            return MatchOutcome::NoMatch;
        };
        if let Some(guard) = &self.guard {
            // A panicking guard counts as a rejection, not a failure.
            let accepted =
                catch_unwind(AssertUnwindSafe(|| guard(&params))).unwrap_or(false);
            if !accepted {
                return MatchOutcome::GuardRejected;
            }
        }
        MatchOutcome::Matched(RouteMatch { params, consumed })
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("host", &self.host)
            .field("pattern", &self.pattern)
            .field("guarded", &self.guard.is_some())
            .field("target", &self.target)
            .finish()
    }
}

/// Result of checking one route against a connection.
#[derive(Debug)]
pub enum MatchOutcome {
    /// All checks passed.
    Matched(RouteMatch),
    /// Method, host, or path structure did not match.
    NoMatch,
    /// Structure matched but the guard rejected the bindings.
    GuardRejected,
}

/// A successful match: the capture bindings and how many of the remaining
/// path segments the route consumed.
#[derive(Debug)]
pub struct RouteMatch {
    /// Captured parameter bindings.
    pub params: Params,
    /// Number of `path_info` segments consumed by the match.
    pub consumed: usize,
}

#[cfg(test)]
mod tests {
    use manifold_conn::{testing, PlugFn, PlugResult};

    use super::*;

    fn inline_route(method: MethodSpec, host: HostSpec, path: &str, guard: Option<Guard>) -> Route {
        Route {
            method,
            host,
            path: PathSpec::parse(path).unwrap(),
            guard,
            target: Target::Inline {
                plug: Arc::new(PlugFn(|conn: Conn, _: &Opts| -> PlugResult { Ok(conn) })),
                opts: Opts::Null,
            },
            pattern: path.to_string(),
        }
    }

    #[test]
    fn checks_method_before_path() {
        let route = inline_route(
            MethodSpec::Only(Method::Post),
            HostSpec::Any,
            "/users",
            None,
        );
        let (conn, _) = testing::conn("GET", "/users");
        assert!(matches!(route.try_match(&conn), MatchOutcome::NoMatch));
    }

    #[test]
    fn any_method_matches_extension_verbs() {
        let route = inline_route(MethodSpec::Any, HostSpec::Any, "/users", None);
        let (conn, _) = testing::conn("PURGE", "/users");
        assert!(matches!(route.try_match(&conn), MatchOutcome::Matched(_)));
    }

    #[test]
    fn host_mismatch_is_no_match() {
        let route = inline_route(
            MethodSpec::Any,
            HostSpec::parse("api."),
            "/users",
            None,
        );
        let (conn, _) = testing::conn_with_host("GET", "www.example.com", "/users");
        assert!(matches!(route.try_match(&conn), MatchOutcome::NoMatch));

        let (conn, _) = testing::conn_with_host("GET", "api.example.com", "/users");
        assert!(matches!(route.try_match(&conn), MatchOutcome::Matched(_)));
    }

    #[test]
    fn guard_rejection_is_distinct_from_no_match() {
        let guard: Guard = Arc::new(|params: &Params| {
            params.get_str("bar").is_some_and(|v| v.len() <= 3)
        });
        let route = inline_route(MethodSpec::Any, HostSpec::Any, "/7/:bar", Some(guard));

        let (conn, _) = testing::conn("GET", "/7/abc");
        assert!(matches!(route.try_match(&conn), MatchOutcome::Matched(_)));

        let (conn, _) = testing::conn("GET", "/7/abcd");
        assert!(matches!(route.try_match(&conn), MatchOutcome::GuardRejected));
    }

    #[test]
    fn panicking_guard_rejects() {
        let guard: Guard = Arc::new(|_: &Params| panic!("guard blew up"));
        let route = inline_route(MethodSpec::Any, HostSpec::Any, "/x", Some(guard));
        let (conn, _) = testing::conn("GET", "/x");
        assert!(matches!(route.try_match(&conn), MatchOutcome::GuardRejected));
    }
}
