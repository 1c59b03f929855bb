//! The error pipeline — turns a dispatch failure into a response.

use tracing::{debug, error};

use crate::context::Context;
use crate::failure::Failure;
use crate::http::response::is_falsy_text;
use crate::middleware::{self, Chain, ErrorHandler, IntoFlow};
use crate::{Request, Response};

/// How the error chain left the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The response now carries a truthy scalar body and should be emitted.
    Recovered,
    /// No usable body was produced; the failure stays unhandled.
    Unrecovered,
}

/// Error middleware, run only on root servers.
///
/// Whether a failure counts as handled is judged solely by the body the
/// chain leaves behind: a scalar body whose text is neither empty nor `"0"`
/// means recovered.
#[derive(Clone, Default)]
pub struct ErrorPipeline {
    chain: Chain<ErrorHandler>,
}

impl ErrorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append error middleware to the end of the chain.
    pub fn push<F, R>(&mut self, f: F)
    where
        F: Fn(&mut Context<'_>, &mut Request, &mut Response, &Failure) -> R
            + Send
            + Sync
            + 'static,
        R: IntoFlow,
    {
        self.chain.push(middleware::error_handler(f));
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Run the error chain for `failure`.
    ///
    /// Any partially written body is discarded first, and the status is
    /// forced to `error_status` unless something already chose one.
    ///
    /// # Errors
    ///
    /// An error handler that itself fails aborts the chain; its failure is
    /// returned in place of the original one.
    pub fn recover(
        &self,
        ctx: &mut Context<'_>,
        failure: &Failure,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<Recovery, Failure> {
        response.take_body();
        if response.code().is_none() {
            response.set_code(ctx.config().error_status);
        }

        let flow = self
            .chain
            .run(|handler| handler(ctx, request, response, failure))
            .inspect_err(|nested| {
                error!(error = %nested, original = %failure, "error middleware failed");
            })?;
        debug!(
            handlers = self.chain.len(),
            stopped = flow.is_stop(),
            status = response.status(),
            "error middleware finished"
        );

        let recovered = response
            .body_text()
            .is_some_and(|text| !is_falsy_text(&text));
        Ok(if recovered {
            Recovery::Recovered
        } else {
            Recovery::Unrecovered
        })
    }
}
