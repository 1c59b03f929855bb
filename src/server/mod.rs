//! Server nodes — the composition root and the per-request dispatcher.
//!
//! A [`Server`] owns a global middleware chain, a [`Router`], an
//! [`ErrorPipeline`], and a set of emission observers. One call to
//! [`Server::process`] (or [`Server::render`]) runs a single synchronous
//! dispatch pass:
//!
//! ```text
//! acquire request ─▶ global chain ──stop──────────────┐
//!                        │ continue                   │
//!                        ▼                            ▼
//!                     router ──no routes for method─▶ 404 / NotFound
//!                        │                            ▲
//!                        ▼                            │
//!                  body guard ──no usable body────────┘
//!                        │
//!                        ▼
//!                      output
//! ```
//!
//! A failure anywhere ends the pass. Root servers hand it to their error
//! pipeline, which may produce a response and terminate the pass; children
//! (and unrecovered failures) return it to the caller as
//! [`DispatchError::Unhandled`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::context::{Context, Extensions};
use crate::failure::Failure;
use crate::http::{RequestSource, SourceError};
use crate::middleware::{self, Chain, Flow, Handler, IntoFlow, Observer};
use crate::output::{self, Emission, OutputError, OutputSink, Prepared};
use crate::router::Router;
use crate::{Request, Response};

pub mod pipeline;

pub use pipeline::{ErrorPipeline, Recovery};

/// Redirect target that resolves to the request's referrer.
pub const BACK: &str = "back";

/// Process-unique identity of a server node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Errors produced while configuring a server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid route pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A failure no error pipeline recovered, with the exchange it interrupted.
#[derive(Debug)]
pub struct Unhandled {
    pub failure: Failure,
    pub request: Request,
    pub response: Response,
}

/// Errors produced by a dispatch pass.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to acquire the request: {0}")]
    Source(#[from] SourceError),

    #[error("failed to emit the response: {0}")]
    Output(#[from] OutputError),

    #[error("unhandled {} failure: {}", .0.failure.channel(), .0.failure)]
    Unhandled(Box<Unhandled>),
}

impl DispatchError {
    /// The unhandled failure, if that is what ended the pass.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Unhandled(unhandled) => Some(&unhandled.failure),
            Self::Source(_) | Self::Output(_) => None,
        }
    }
}

/// Why a pass ended early. The caller must not resume the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The error pipeline produced and emitted a response.
    ErrorResponse { status: u16, emission: Emission },
    /// A redirect was emitted.
    Redirect { location: String },
}

/// Result of [`Server::process`].
#[derive(Debug)]
pub enum Processed {
    /// Dispatch finished normally; the response is ready for output.
    Ready { request: Request, response: Response },
    /// The pass was terminated and nothing more should run.
    Terminated(Termination),
}

/// Result of [`Server::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Complete(Emission),
    Terminated(Termination),
}

/// Result of [`Server::redirect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirected {
    Terminated(Termination),
    /// An observer vetoed the redirect; nothing was written.
    Suppressed { location: String },
}

/// Hook fired once when a dispatch pass ends.
pub type EndHook = Arc<dyn Fn(NodeId) + Send + Sync + 'static>;

#[derive(Clone, Default)]
struct Observers {
    output: Chain<Observer<Prepared>>,
    redirect: Chain<Observer<str>>,
    end: Vec<EndHook>,
}

// Every observer must continue for the emission to proceed.
fn allowed<T: ?Sized>(observers: &Chain<Observer<T>>, value: &T) -> bool {
    observers.iter().all(|observer| observer(value) == Flow::Continue)
}

// Fires the end hooks when dropped, however the pass ends.
struct EndSignal {
    node: NodeId,
    hooks: Vec<EndHook>,
}

impl Drop for EndSignal {
    fn drop(&mut self) {
        debug!(node = %self.node, "dispatch ended");
        for hook in &self.hooks {
            hook(self.node);
        }
    }
}

/// A dispatch node: middleware, routes, error handling, and observers.
///
/// # Examples
///
/// ```
/// use waypost::Server;
/// use waypost::output::BufferSink;
/// use waypost::server::Rendered;
/// use waypost::http::Request;
///
/// let mut server = Server::new();
/// server.add(|_ctx, _req, res| res.set_header("X-Powered-By", "waypost"));
/// server
///     .get("/hello/*", |_ctx, req, res| {
///         let name = req.variable(0).unwrap_or("world").to_owned();
///         res.set_body(format!("Hello, {name}!"));
///     })
///     .unwrap();
///
/// let mut sink = BufferSink::new();
/// let rendered = server
///     .render(&mut Request::new("GET", "/hello/ada"), &mut sink)
///     .unwrap();
///
/// assert!(matches!(rendered, Rendered::Complete(_)));
/// assert!(server.success());
/// assert_eq!(sink.body_text(), "Hello, ada!");
/// assert_eq!(sink.header_value("x-powered-by"), Some("waypost"));
/// ```
pub struct Server {
    id: NodeId,
    parent: Option<NodeId>,
    config: Config,
    global: Chain<Handler>,
    router: Router,
    errors: ErrorPipeline,
    observers: Observers,
    state: Extensions,
    successful: bool,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Create a root server with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a root server with `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            id: NodeId::next(),
            parent: None,
            config,
            global: Chain::new(),
            router: Router::new(),
            errors: ErrorPipeline::new(),
            observers: Observers::default(),
            state: Extensions::new(),
            successful: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node this one was cloned from, if any.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Only root servers run their error pipeline.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn state(&self) -> &Extensions {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Extensions {
        &mut self.state
    }

    /// Whether the last output actually reached the sink.
    pub fn success(&self) -> bool {
        self.successful
    }

    /// Add global middleware, run on every request before routing.
    pub fn add<F, R>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut Context<'_>, &mut Request, &mut Response) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        self.global.push(middleware::handler(f));
        self
    }

    /// Add route middleware for `method` requests matching `pattern`.
    ///
    /// `method` is case-insensitive; `"all"` registers GET, POST, PUT, and
    /// DELETE.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Pattern`] if the pattern cannot be compiled.
    pub fn route<F, R>(&mut self, method: &str, pattern: &str, f: F) -> Result<&mut Self, ServerError>
    where
        F: Fn(&mut Context<'_>, &mut Request, &mut Response) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        self.router
            .add_route(method, pattern, middleware::handler(f))
            .map_err(|source| ServerError::Pattern {
                pattern: pattern.to_owned(),
                source,
            })?;
        Ok(self)
    }

    /// Add route middleware for GET requests.
    ///
    /// # Errors
    ///
    /// See [`Server::route`].
    pub fn get<F, R>(&mut self, pattern: &str, f: F) -> Result<&mut Self, ServerError>
    where
        F: Fn(&mut Context<'_>, &mut Request, &mut Response) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        self.route("GET", pattern, f)
    }

    /// Add route middleware for POST requests.
    ///
    /// # Errors
    ///
    /// See [`Server::route`].
    pub fn post<F, R>(&mut self, pattern: &str, f: F) -> Result<&mut Self, ServerError>
    where
        F: Fn(&mut Context<'_>, &mut Request, &mut Response) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        self.route("POST", pattern, f)
    }

    /// Add route middleware for PUT requests.
    ///
    /// # Errors
    ///
    /// See [`Server::route`].
    pub fn put<F, R>(&mut self, pattern: &str, f: F) -> Result<&mut Self, ServerError>
    where
        F: Fn(&mut Context<'_>, &mut Request, &mut Response) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        self.route("PUT", pattern, f)
    }

    /// Add route middleware for DELETE requests.
    ///
    /// # Errors
    ///
    /// See [`Server::route`].
    pub fn delete<F, R>(&mut self, pattern: &str, f: F) -> Result<&mut Self, ServerError>
    where
        F: Fn(&mut Context<'_>, &mut Request, &mut Response) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        self.route("DELETE", pattern, f)
    }

    /// Add route middleware for GET, POST, PUT, and DELETE requests.
    ///
    /// # Errors
    ///
    /// See [`Server::route`].
    pub fn all<F, R>(&mut self, pattern: &str, f: F) -> Result<&mut Self, ServerError>
    where
        F: Fn(&mut Context<'_>, &mut Request, &mut Response) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        self.route("ALL", pattern, f)
    }

    /// Add error middleware, run when a root server's dispatch fails.
    pub fn error<F, R>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut Context<'_>, &mut Request, &mut Response, &Failure) -> R
            + Send
            + Sync
            + 'static,
        R: IntoFlow,
    {
        self.errors.push(f);
        self
    }

    /// Observe output before it is written; [`Flow::Stop`] suppresses it.
    pub fn on_output<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Prepared) -> Flow + Send + Sync + 'static,
    {
        self.observers.output.push(Arc::new(f));
        self
    }

    /// Observe redirects before they are written; [`Flow::Stop`] suppresses them.
    pub fn on_redirect<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&str) -> Flow + Send + Sync + 'static,
    {
        self.observers.redirect.push(Arc::new(f));
        self
    }

    /// Run `f` once at the end of every dispatch pass.
    pub fn on_end<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(NodeId) + Send + Sync + 'static,
    {
        self.observers.end.push(Arc::new(f));
        self
    }

    /// Create a child server starting from a copy of this one's setup.
    ///
    /// Global middleware, routes, error middleware, observers, and config are
    /// copied as they stand now; later additions to either node do not reach
    /// the other. Handler closures are shared, not duplicated. The child's
    /// state map starts empty.
    pub fn child(&self) -> Server {
        let child = Server {
            id: NodeId::next(),
            parent: Some(self.id),
            config: self.config.clone(),
            global: self.global.clone(),
            router: self.router.clone(),
            errors: self.errors.clone(),
            observers: self.observers.clone(),
            state: Extensions::new(),
            successful: false,
        };
        debug!(parent = %self.id, child = %child.id, "child server created");
        child
    }

    /// Run one dispatch pass without emitting the final response.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Source`] — the request could not be acquired.
    /// - [`DispatchError::Unhandled`] — a failure was not recovered.
    /// - [`DispatchError::Output`] — the error pipeline's response could not
    ///   be emitted.
    pub fn process<S>(
        &mut self,
        source: &mut S,
        sink: &mut dyn OutputSink,
    ) -> Result<Processed, DispatchError>
    where
        S: RequestSource + ?Sized,
    {
        let _end = self.end_signal();
        self.dispatch_pass(source, sink)
    }

    /// Run one dispatch pass and emit its response.
    ///
    /// # Errors
    ///
    /// Same as [`Server::process`], plus output failures for the final
    /// response.
    pub fn render<S>(
        &mut self,
        source: &mut S,
        sink: &mut dyn OutputSink,
    ) -> Result<Rendered, DispatchError>
    where
        S: RequestSource + ?Sized,
    {
        let _end = self.end_signal();
        match self.dispatch_pass(source, sink)? {
            Processed::Ready { response, .. } => Ok(Rendered::Complete(self.output(&response, sink)?)),
            Processed::Terminated(termination) => Ok(Rendered::Terminated(termination)),
        }
    }

    /// Emit `response` through `sink`.
    ///
    /// The response is first prepared (see [`output::prepare`]); output
    /// observers may then suppress the write, in which case the prepared
    /// output is returned and [`Server::success`] is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] on serialization or sink failure.
    pub fn output(
        &mut self,
        response: &Response,
        sink: &mut dyn OutputSink,
    ) -> Result<Emission, OutputError> {
        let prepared = output::prepare(response, &self.config)?;
        if !allowed(&self.observers.output, &prepared) {
            debug!(node = %self.id, status = ?prepared.status, "output suppressed by observer");
            return Ok(Emission::Suppressed(prepared));
        }
        output::emit(&prepared, sink)?;
        self.successful = true;
        Ok(Emission::Emitted)
    }

    /// Redirect the client to `path`.
    ///
    /// [`BACK`] resolves to the request's `HTTP_REFERER`, falling back to the
    /// configured `back_fallback`. Unless an observer suppresses it, a
    /// `Location` header is written and the exchange is over.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Io`] if the sink fails.
    pub fn redirect(
        &self,
        path: &str,
        request: &Request,
        sink: &mut dyn OutputSink,
    ) -> Result<Redirected, OutputError> {
        let location = if path == BACK {
            request
                .server_meta()
                .get("HTTP_REFERER")
                .unwrap_or(&self.config.back_fallback)
                .to_owned()
        } else {
            path.to_owned()
        };

        if !allowed(&self.observers.redirect, location.as_str()) {
            debug!(node = %self.id, location = %location, "redirect suppressed by observer");
            return Ok(Redirected::Suppressed { location });
        }

        sink.header("Location", Some(&location))?;
        sink.write(&[])?;
        Ok(Redirected::Terminated(Termination::Redirect { location }))
    }

    fn end_signal(&self) -> EndSignal {
        EndSignal {
            node: self.id,
            hooks: self.observers.end.clone(),
        }
    }

    fn dispatch_pass<S>(
        &mut self,
        source: &mut S,
        sink: &mut dyn OutputSink,
    ) -> Result<Processed, DispatchError>
    where
        S: RequestSource + ?Sized,
    {
        let mut request = source.acquire()?;
        let mut response = Response::new();
        debug!(
            node = %self.id,
            method = %request.method(),
            path = request.path().as_str(),
            "dispatching request"
        );

        match self.run_phases(&mut request, &mut response) {
            Ok(()) => Ok(Processed::Ready { request, response }),
            Err(failure) => self.handle_failure(failure, request, response, sink),
        }
    }

    // Global chain, then routing, then the body guard.
    fn run_phases(&mut self, request: &mut Request, response: &mut Response) -> Result<(), Failure> {
        let not_found = self.config.not_found_status;
        let mut ctx = Context::new(self.id, self.parent, &self.config, &mut self.state);

        if self.global.run(|h| h(&mut ctx, request, response))?.is_stop() {
            debug!(node = %self.id, "global middleware stopped; routing skipped");
        } else if !self.router.dispatch(&mut ctx, request, response)? {
            response.set_code(not_found);
            return Err(Failure::NotFound);
        }

        if !response.has_text_body() {
            response.set_code(not_found);
            return Err(Failure::NotFound);
        }
        Ok(())
    }

    fn handle_failure(
        &mut self,
        failure: Failure,
        mut request: Request,
        mut response: Response,
        sink: &mut dyn OutputSink,
    ) -> Result<Processed, DispatchError> {
        warn!(
            node = %self.id,
            channel = %failure.channel(),
            kind = failure.kind(),
            error = %failure,
            "dispatch failed"
        );

        if !self.is_root() {
            return Err(unhandled(failure, request, response));
        }

        let recovery = {
            let mut ctx = Context::new(self.id, self.parent, &self.config, &mut self.state);
            self.errors
                .recover(&mut ctx, &failure, &mut request, &mut response)
        };
        match recovery {
            Ok(Recovery::Recovered) => {
                let status = response.status();
                let emission = self.output(&response, sink)?;
                Ok(Processed::Terminated(Termination::ErrorResponse {
                    status,
                    emission,
                }))
            }
            Ok(Recovery::Unrecovered) => {
                error!(node = %self.id, error = %failure, "failure left unhandled");
                Err(unhandled(failure, request, response))
            }
            Err(nested) => Err(unhandled(nested, request, response)),
        }
    }
}

fn unhandled(failure: Failure, request: Request, response: Response) -> DispatchError {
    DispatchError::Unhandled(Box::new(Unhandled {
        failure,
        request,
        response,
    }))
}
