//! Middleware chains — ordered handler lists with short-circuit execution.
//!
//! A [`Chain`] runs its entries strictly in insertion order. Each entry
//! reports a [`Flow`]: [`Flow::Continue`] moves on to the next entry,
//! [`Flow::Stop`] halts the chain immediately. A failure returned by an entry
//! also halts the chain and is handed back to the caller untouched.
//!
//! ## Core types
//!
//! - [`Chain`] — the ordered list, generic over the stored handler type.
//! - [`Handler`] — global and route middleware.
//! - [`ErrorHandler`] — error middleware, which also receives the [`Failure`].
//! - [`Observer`] — hooks consulted before output or redirect emission.
//! - [`IntoFlow`] — what handler closures may return.

use std::sync::Arc;

use crate::{Request, Response, context::Context, failure::Failure};

/// Whether a chain should keep going after an entry has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    Continue,
    Stop,
}

impl Flow {
    pub fn is_stop(self) -> bool {
        self == Self::Stop
    }
}

/// Conversion from a handler's return value into a chain decision.
///
/// `()` and `true` continue, `false` stops, and a [`Failure`] aborts the
/// chain. This lets handlers that only decorate the response return nothing.
pub trait IntoFlow {
    fn into_flow(self) -> Result<Flow, Failure>;
}

impl IntoFlow for Flow {
    fn into_flow(self) -> Result<Flow, Failure> {
        Ok(self)
    }
}

impl IntoFlow for () {
    fn into_flow(self) -> Result<Flow, Failure> {
        Ok(Flow::Continue)
    }
}

impl IntoFlow for bool {
    fn into_flow(self) -> Result<Flow, Failure> {
        Ok(if self { Flow::Continue } else { Flow::Stop })
    }
}

impl<T: IntoFlow> IntoFlow for Result<T, Failure> {
    fn into_flow(self) -> Result<Flow, Failure> {
        self.and_then(IntoFlow::into_flow)
    }
}

/// Type-erased global or route middleware.
///
/// Stored behind [`Arc`] so a child server can copy a chain without copying
/// the closures themselves.
pub type Handler = Arc<
    dyn Fn(&mut Context<'_>, &mut Request, &mut Response) -> Result<Flow, Failure>
        + Send
        + Sync
        + 'static,
>;

/// Type-erased error middleware.
pub type ErrorHandler = Arc<
    dyn Fn(&mut Context<'_>, &mut Request, &mut Response, &Failure) -> Result<Flow, Failure>
        + Send
        + Sync
        + 'static,
>;

/// A hook that may veto an emission by returning [`Flow::Stop`].
pub type Observer<T> = Arc<dyn Fn(&T) -> Flow + Send + Sync + 'static>;

/// Erase a middleware closure into a [`Handler`].
///
/// # Examples
///
/// ```
/// use waypost::middleware::{self, Flow};
///
/// let stop_everything = middleware::handler(|_ctx, _req, _res| Flow::Stop);
/// let decorate = middleware::handler(|_ctx, _req, res| {
///     res.set_header("X-Powered-By", "waypost");
/// });
/// # let _ = (stop_everything, decorate);
/// ```
pub fn handler<F, R>(f: F) -> Handler
where
    F: Fn(&mut Context<'_>, &mut Request, &mut Response) -> R + Send + Sync + 'static,
    R: IntoFlow,
{
    erase_handler(move |ctx, req, res| f(ctx, req, res).into_flow())
}

/// Erase an error-middleware closure into an [`ErrorHandler`].
pub fn error_handler<F, R>(f: F) -> ErrorHandler
where
    F: Fn(&mut Context<'_>, &mut Request, &mut Response, &Failure) -> R
        + Send
        + Sync
        + 'static,
    R: IntoFlow,
{
    erase_error_handler(move |ctx, req, res, failure| f(ctx, req, res, failure).into_flow())
}

// Pins the closure signature so the elided lifetimes stay higher-ranked.
fn erase_handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context<'_>, &mut Request, &mut Response) -> Result<Flow, Failure>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn erase_error_handler<F>(f: F) -> ErrorHandler
where
    F: Fn(&mut Context<'_>, &mut Request, &mut Response, &Failure) -> Result<Flow, Failure>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// An ordered list of handlers with short-circuit execution.
///
/// The chain does not know how to call its entries; [`Chain::run`] takes an
/// invoker so the same type serves global middleware, error middleware, route
/// tables, and observers.
///
/// # Examples
///
/// ```
/// use waypost::middleware::{Chain, Flow};
///
/// let mut chain: Chain<u32> = Chain::new();
/// chain.push(1);
/// chain.push(2);
/// chain.push(3);
///
/// let mut seen = Vec::new();
/// let flow = chain
///     .run(|n| {
///         seen.push(*n);
///         Ok(if *n == 2 { Flow::Stop } else { Flow::Continue })
///     })
///     .unwrap();
///
/// assert_eq!(flow, Flow::Stop);
/// assert_eq!(seen, vec![1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct Chain<H> {
    entries: Vec<H>,
}

impl<H> Default for Chain<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Chain<H> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry; it runs after every entry already present.
    pub fn push(&mut self, entry: H) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &H> {
        self.entries.iter()
    }

    /// Runs every entry in insertion order through `invoke`.
    ///
    /// Returns [`Flow::Stop`] as soon as an entry stops the chain and
    /// [`Flow::Continue`] once every entry has run.
    ///
    /// # Errors
    ///
    /// The first [`Failure`] returned by `invoke` ends the run and is returned
    /// as-is; later entries do not run.
    pub fn run<F>(&self, mut invoke: F) -> Result<Flow, Failure>
    where
        F: FnMut(&H) -> Result<Flow, Failure>,
    {
        for entry in &self.entries {
            if invoke(entry)?.is_stop() {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Extensions;
    use crate::server::NodeId;
    use std::sync::Mutex;

    fn run_handlers(chain: &Chain<Handler>) -> (Result<Flow, Failure>, Response) {
        let config = Config::default();
        let mut state = Extensions::new();
        let mut ctx = Context::new(NodeId::next(), None, &config, &mut state);
        let mut req = Request::new("GET", "/");
        let mut res = Response::new();
        let flow = chain.run(|h| h(&mut ctx, &mut req, &mut res));
        (flow, res)
    }

    // ── IntoFlow ──────────────────────────────────────────────────────────────

    #[test]
    fn unit_and_true_continue() {
        assert_eq!(().into_flow().unwrap(), Flow::Continue);
        assert_eq!(true.into_flow().unwrap(), Flow::Continue);
    }

    #[test]
    fn false_stops() {
        assert_eq!(false.into_flow().unwrap(), Flow::Stop);
    }

    #[test]
    fn result_propagates_failure() {
        let ok: Result<bool, Failure> = Ok(false);
        assert_eq!(ok.into_flow().unwrap(), Flow::Stop);
        let err: Result<(), Failure> = Err(Failure::NotFound);
        assert!(matches!(err.into_flow(), Err(Failure::NotFound)));
    }

    // ── Chain ─────────────────────────────────────────────────────────────────

    #[test]
    fn empty_chain_continues() {
        let chain: Chain<Handler> = Chain::new();
        let (flow, _) = run_handlers(&chain);
        assert_eq!(flow.unwrap(), Flow::Continue);
    }

    #[test]
    fn runs_in_insertion_order() {
        let mut chain = Chain::new();
        chain.push(handler(|_, _, res: &mut Response| res.set_header("X-Order", "a")));
        chain.push(handler(|_, _, res: &mut Response| {
            let prev = res.headers().get("X-Order").unwrap_or("").to_owned();
            res.set_header("X-Order", format!("{prev}b"));
        }));
        let (flow, res) = run_handlers(&chain);
        assert_eq!(flow.unwrap(), Flow::Continue);
        assert_eq!(res.headers().get("X-Order"), Some("ab"));
    }

    #[test]
    fn stop_skips_remaining_entries() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Chain::new();
        for (name, flow) in [("first", true), ("second", false), ("third", true)] {
            let calls = Arc::clone(&calls);
            chain.push(handler(move |_, _, _| {
                calls.lock().unwrap().push(name);
                flow
            }));
        }
        let (flow, _) = run_handlers(&chain);
        assert_eq!(flow.unwrap(), Flow::Stop);
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn failure_aborts_chain() {
        let mut chain = Chain::new();
        chain.push(handler(|_, _, _| -> Result<(), Failure> {
            Err(Failure::handler("boom"))
        }));
        chain.push(handler(|_, _, res: &mut Response| res.set_body("unreachable")));
        let (flow, res) = run_handlers(&chain);
        assert!(matches!(flow, Err(Failure::Handler(_))));
        assert!(res.body().is_none());
    }

    #[test]
    fn cloned_chain_is_independent() {
        let mut parent: Chain<u8> = Chain::new();
        parent.push(1);
        let mut child = parent.clone();
        child.push(2);
        assert_eq!(parent.len(), 1);
        assert_eq!(child.len(), 2);
    }
}
