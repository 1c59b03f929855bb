//! Request routing — map HTTP methods and path patterns to route middleware.
//!
//! This module provides [`Router`], which keeps one ordered route list per
//! HTTP method and runs every route whose [`Pattern`] matches the request
//! path. Patterns support two wildcards:
//!
//! | Pattern          | Example match              | Captured variables        |
//! |------------------|----------------------------|---------------------------|
//! | `/users`         | `/users/42`                | `["42"]`                  |
//! | `/users/*/edit`  | `/users/42/edit`           | `["42"]`                  |
//! | `/files/**`      | `/files/docs/readme.txt`   | `["docs", "readme.txt"]`  |
//!
//! Every pattern is a prefix match (see [`pattern`]). Unlike a first-match
//! router, all matching routes run in registration order until one of them
//! stops the chain.

use std::collections::HashMap;

use tracing::trace;

use crate::context::Context;
use crate::failure::Failure;
use crate::middleware::{Chain, Flow, Handler};
use crate::{Method, Request, Response};

pub mod pattern;

pub use pattern::Pattern;

/// Methods a route registered for `ALL` fans out to, in registration order.
pub const ALL_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// A registered route: a compiled pattern bound to a handler.
///
/// Routes are immutable once registered.
#[derive(Clone)]
pub struct Route {
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// A route whose pattern matched, with the variables it captured.
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub variables: Vec<String>,
}

/// Method-indexed route table.
///
/// # Examples
///
/// ```
/// use waypost::middleware;
/// use waypost::router::Router;
/// use waypost::Method;
///
/// let mut router = Router::new();
/// router
///     .add_route("all", "/users/*", middleware::handler(|_ctx, _req, _res| {}))
///     .unwrap();
///
/// assert_eq!(router.len(), 4);
/// let hits: Vec<_> = router.resolve(&Method::Put, "/users/42").collect();
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].variables, vec!["42".to_owned()]);
/// ```
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<Method, Chain<Route>>,
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register `handler` for `method` requests whose path matches `pattern`.
    ///
    /// The method name is upper-cased. `ALL` registers the same handler for
    /// GET, POST, PUT, and DELETE, in that order.
    ///
    /// # Errors
    ///
    /// Returns the regex engine's error if `pattern` cannot be compiled.
    pub fn add_route(
        &mut self,
        method: &str,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), regex::Error> {
        let pattern = Pattern::compile(pattern)?;
        if method.eq_ignore_ascii_case("ALL") {
            for method in ALL_METHODS {
                self.insert(method, pattern.clone(), handler.clone());
            }
        } else {
            self.insert(method, pattern, handler);
        }
        Ok(())
    }

    fn insert(&mut self, method: &str, pattern: Pattern, handler: Handler) {
        let method = match method.parse::<Method>() {
            Ok(method) => method,
            Err(never) => match never {},
        };
        self.routes
            .entry(method)
            .or_default()
            .push(Route { pattern, handler });
    }

    /// Return the routes registered for `method`, in registration order.
    pub fn routes<'a>(&'a self, method: &Method) -> impl Iterator<Item = &'a Route> + use<'a> {
        self.routes
            .get(method)
            .into_iter()
            .flat_map(|chain| chain.iter())
    }

    /// Return `true` if at least one route is registered for `method`.
    pub fn has_method(&self, method: &Method) -> bool {
        self.routes.contains_key(method)
    }

    /// Return the number of routes registered across all methods.
    pub fn len(&self) -> usize {
        self.routes.values().map(Chain::len).sum()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Lazily yield every route for `method` whose pattern matches `path`.
    pub fn resolve<'a>(
        &'a self,
        method: &Method,
        path: &'a str,
    ) -> impl Iterator<Item = RouteMatch<'a>> + use<'a> {
        self.routes(method).filter_map(move |route| {
            route
                .pattern
                .matches(path)
                .map(|variables| RouteMatch { route, variables })
        })
    }

    /// Run the routes matching `request` against `response`.
    ///
    /// Each matching route overwrites the request's variables with its own
    /// captures before its handler runs. A route returning [`Flow::Stop`]
    /// ends routing; non-matching routes are skipped silently.
    ///
    /// # Returns
    ///
    /// `false` only when no route at all is registered for the request
    /// method. Once the method has routes this is `true`, even if no pattern
    /// matched or a handler stopped the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`Failure`] raised by a route handler.
    pub fn dispatch(
        &self,
        ctx: &mut Context<'_>,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<bool, Failure> {
        let Some(routes) = self.routes.get(request.method()) else {
            return Ok(false);
        };

        let path = request.path().as_str().to_owned();
        routes.run(|route| {
            let Some(variables) = route.pattern.matches(&path) else {
                return Ok(Flow::Continue);
            };
            trace!(pattern = route.pattern(), path = %path, ?variables, "route matched");
            request.set_variables(variables);
            (route.handler)(ctx, request, response)
        })?;

        Ok(true)
    }
}
