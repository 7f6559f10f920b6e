//! The declaration surface.
//!
//! Routes are declared against a [`RouterBuilder`] and compiled once by
//! [`RouterBuilder::build`] into a flat, immutable route table. Scoping is
//! purely a compile-time transformation: nested [`Scope`]s contribute a
//! path prefix and an optional host constraint that are folded into every
//! route declared inside them, and the runtime table has no nesting left.
//!
//! # Example
//!
//! ```
//! use manifold_conn::{Conn, Opts, PlugFn, PlugResult, StatusCode};
//! use manifold_router::Router;
//!
//! fn hello(conn: Conn, _opts: &Opts) -> PlugResult {
//!     Ok(conn.send(StatusCode::OK, "hello")?)
//! }
//!
//! let router = Router::builder()
//!     .get("/hello", PlugFn(hello))
//!     .scope("/api", |s| s.get("/users/:id", PlugFn(hello)))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

use manifold_conn::{Conn, Method, Opts, Params, Plug, StatusCode};
use thiserror::Error;

use crate::dispatch::Router;
use crate::route::{Guard, MethodSpec, Route, Target};
use crate::segment::{HostSpec, PathSpec, TemplateError};
use crate::translate::{ErrorHook, StatusClassifier, Translator};

/// Route table construction error.
///
/// Construction fails fast: an invalid declaration surfaces here, at build
/// time, never at request time.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A path template failed to parse.
    #[error("invalid path template `{path}`: {source}")]
    Template {
        /// The offending template, with scope prefixes applied.
        path: String,
        /// The underlying template error.
        #[source]
        source: TemplateError,
    },
    /// A forward prefix contained a glob segment.
    #[error("forward prefix `{path}` may not contain glob segments")]
    GlobInForward {
        /// The offending prefix.
        path: String,
    },
}

/// A single route declaration: method, path, and optional host, guard,
/// and static options.
pub struct RouteSpec {
    method: MethodSpec,
    path: String,
    host: Option<String>,
    guard: Option<Guard>,
    opts: Opts,
}

impl RouteSpec {
    /// Declare a route for one method.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method: MethodSpec::Only(method),
            path: path.into(),
            host: None,
            guard: None,
            opts: Opts::Null,
        }
    }

    /// Declare a route matching any verb.
    #[must_use]
    pub fn any(path: impl Into<String>) -> Self {
        Self {
            method: MethodSpec::Any,
            path: path.into(),
            host: None,
            guard: None,
            opts: Opts::Null,
        }
    }

    /// GET route.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST route.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// PUT route.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// PATCH route.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// DELETE route.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// OPTIONS route.
    #[must_use]
    pub fn options(path: impl Into<String>) -> Self {
        Self::new(Method::Options, path)
    }

    /// HEAD route.
    #[must_use]
    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::Head, path)
    }

    /// Constrain the route to a host pattern.
    ///
    /// A pattern ending in `.` matches any host starting with it;
    /// otherwise the match is exact. Overrides the enclosing scope's host.
    #[must_use]
    pub fn host(mut self, pattern: impl Into<String>) -> Self {
        self.host = Some(pattern.into());
        self
    }

    /// Attach a guard predicate over the capture bindings.
    #[must_use]
    pub fn guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&Params) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Attach static options passed to the handler on every call.
    #[must_use]
    pub fn opts(mut self, opts: Opts) -> Self {
        self.opts = opts;
        self
    }
}

/// One recorded declaration, kept in order until `build`.
enum Decl {
    Route {
        spec: RouteSpec,
        plug: Arc<dyn Plug>,
    },
    Forward {
        path: String,
        host: Option<String>,
        plug: Arc<dyn Plug>,
    },
    Scope {
        prefix: String,
        host: Option<String>,
        decls: Vec<Decl>,
    },
}

/// Builds a [`Router`] from ordered declarations.
#[derive(Default)]
pub struct RouterBuilder {
    decls: Vec<Decl>,
    classifier: StatusClassifier,
    hook: Option<ErrorHook>,
    not_found: Option<Arc<dyn Plug>>,
}

impl RouterBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a route with full control via [`RouteSpec`].
    #[must_use]
    pub fn route(mut self, spec: RouteSpec, plug: impl Plug + 'static) -> Self {
        self.decls.push(Decl::Route {
            spec,
            plug: Arc::new(plug),
        });
        self
    }

    /// GET route shorthand.
    #[must_use]
    pub fn get(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::get(path), plug)
    }

    /// POST route shorthand.
    #[must_use]
    pub fn post(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::post(path), plug)
    }

    /// PUT route shorthand.
    #[must_use]
    pub fn put(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::put(path), plug)
    }

    /// PATCH route shorthand.
    #[must_use]
    pub fn patch(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::patch(path), plug)
    }

    /// DELETE route shorthand.
    #[must_use]
    pub fn delete(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::delete(path), plug)
    }

    /// OPTIONS route shorthand.
    #[must_use]
    pub fn options(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::options(path), plug)
    }

    /// HEAD route shorthand.
    #[must_use]
    pub fn head(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::head(path), plug)
    }

    /// Any-verb route shorthand.
    #[must_use]
    pub fn any(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::any(path), plug)
    }

    /// Forward everything under `prefix` to a sub-router.
    ///
    /// The prefix may contain literal and capture segments but no globs.
    /// On a match the consumed prefix moves onto the connection's
    /// `script_name` and the leftover becomes its `path_info`.
    #[must_use]
    pub fn forward(mut self, prefix: &str, plug: impl Plug + 'static) -> Self {
        self.decls.push(Decl::Forward {
            path: prefix.to_string(),
            host: None,
            plug: Arc::new(plug),
        });
        self
    }

    /// Declare routes under a path prefix.
    #[must_use]
    pub fn scope(mut self, prefix: &str, build: impl FnOnce(Scope) -> Scope) -> Self {
        let scope = build(Scope::new(prefix));
        self.decls.push(scope.into_decl());
        self
    }

    /// Register or override a failure-tag → status classification.
    #[must_use]
    pub fn classify(mut self, tag: &str, status: StatusCode) -> Self {
        self.classifier.set(tag, status);
        self
    }

    /// Replace the default error hook.
    #[must_use]
    pub fn error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Conn, &crate::translate::Classified<'_>) -> Conn + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Replace the default not-found behavior (a minimal 404).
    #[must_use]
    pub fn not_found(mut self, plug: impl Plug + 'static) -> Self {
        self.not_found = Some(Arc::new(plug));
        self
    }

    /// Compile the declarations into a flat, immutable route table.
    ///
    /// # Errors
    ///
    /// Fails on structurally invalid templates; see [`BuildError`].
    pub fn build(self) -> Result<Router, BuildError> {
        let mut routes = Vec::new();
        flatten(self.decls, "", None, &mut routes)?;
        Ok(Router::new(
            routes,
            self.not_found,
            Translator::new(self.classifier, self.hook),
        ))
    }
}

/// Declarations nested under a path prefix and optional host constraint.
///
/// Created by [`RouterBuilder::scope`]; offers the same declaration
/// methods as the builder.
pub struct Scope {
    prefix: String,
    host: Option<String>,
    decls: Vec<Decl>,
}

impl Scope {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            host: None,
            decls: Vec::new(),
        }
    }

    fn into_decl(self) -> Decl {
        Decl::Scope {
            prefix: self.prefix,
            host: self.host,
            decls: self.decls,
        }
    }

    /// Constrain every route in this scope to a host pattern.
    ///
    /// Overrides the host inherited from an enclosing scope; individual
    /// routes may override it again.
    #[must_use]
    pub fn host(mut self, pattern: impl Into<String>) -> Self {
        self.host = Some(pattern.into());
        self
    }

    /// Declare a route inside the scope.
    #[must_use]
    pub fn route(mut self, spec: RouteSpec, plug: impl Plug + 'static) -> Self {
        self.decls.push(Decl::Route {
            spec,
            plug: Arc::new(plug),
        });
        self
    }

    /// GET route shorthand.
    #[must_use]
    pub fn get(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::get(path), plug)
    }

    /// POST route shorthand.
    #[must_use]
    pub fn post(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::post(path), plug)
    }

    /// PUT route shorthand.
    #[must_use]
    pub fn put(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::put(path), plug)
    }

    /// PATCH route shorthand.
    #[must_use]
    pub fn patch(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::patch(path), plug)
    }

    /// DELETE route shorthand.
    #[must_use]
    pub fn delete(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::delete(path), plug)
    }

    /// OPTIONS route shorthand.
    #[must_use]
    pub fn options(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::options(path), plug)
    }

    /// HEAD route shorthand.
    #[must_use]
    pub fn head(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::head(path), plug)
    }

    /// Any-verb route shorthand.
    #[must_use]
    pub fn any(self, path: &str, plug: impl Plug + 'static) -> Self {
        self.route(RouteSpec::any(path), plug)
    }

    /// Forward everything under `prefix` (relative to the scope).
    #[must_use]
    pub fn forward(mut self, prefix: &str, plug: impl Plug + 'static) -> Self {
        self.decls.push(Decl::Forward {
            path: prefix.to_string(),
            host: None,
            plug: Arc::new(plug),
        });
        self
    }

    /// Nest another scope inside this one.
    #[must_use]
    pub fn scope(mut self, prefix: &str, build: impl FnOnce(Scope) -> Scope) -> Self {
        let scope = build(Scope::new(prefix));
        self.decls.push(scope.into_decl());
        self
    }
}

/// Fold scopes away: concatenate prefixes, resolve host inheritance, and
/// compile templates, preserving declaration order.
fn flatten(
    decls: Vec<Decl>,
    prefix: &str,
    inherited_host: Option<&str>,
    out: &mut Vec<Route>,
) -> Result<(), BuildError> {
    for decl in decls {
        match decl {
            Decl::Route { spec, plug } => {
                let pattern = join_paths(prefix, &spec.path);
                let path = compile_template(&pattern)?;
                let host = resolve_host(spec.host.as_deref(), inherited_host);
                out.push(Route {
                    method: spec.method,
                    host,
                    path,
                    guard: spec.guard,
                    target: Target::Inline {
                        plug,
                        opts: spec.opts,
                    },
                    pattern,
                });
            }
            Decl::Forward { path, host, plug } => {
                let pattern = join_paths(prefix, &path);
                let compiled = compile_template(&pattern)?;
                if compiled.has_glob() {
                    return Err(BuildError::GlobInForward { path: pattern });
                }
                let host = resolve_host(host.as_deref(), inherited_host);
                out.push(Route {
                    method: MethodSpec::Any,
                    host,
                    path: compiled,
                    guard: None,
                    target: Target::Forward { plug },
                    pattern,
                });
            }
            Decl::Scope {
                prefix: scope_prefix,
                host,
                decls,
            } => {
                let combined = join_paths(prefix, &scope_prefix);
                let host = host.as_deref().or(inherited_host);
                flatten(decls, &combined, host, out)?;
            }
        }
    }
    Ok(())
}

fn compile_template(pattern: &str) -> Result<PathSpec, BuildError> {
    PathSpec::parse(pattern).map_err(|source| BuildError::Template {
        path: pattern.to_string(),
        source,
    })
}

fn resolve_host(own: Option<&str>, inherited: Option<&str>) -> HostSpec {
    match own.or(inherited) {
        Some(pattern) => HostSpec::parse(pattern),
        None => HostSpec::Any,
    }
}

/// Concatenate two path fragments segment-wise.
fn join_paths(prefix: &str, path: &str) -> String {
    let mut joined = String::new();
    for segment in prefix
        .split('/')
        .chain(path.split('/'))
        .filter(|s| !s.is_empty())
    {
        joined.push('/');
        joined.push_str(segment);
    }
    if joined.is_empty() {
        joined.push('/');
    }
    joined
}
