//! Failures raised while dispatching a request.
//!
//! Every failure travels on one of two channels. [`Channel::Error`] carries
//! runtime errors bubbling out of application handlers; [`Channel::Exception`]
//! carries failures raised deliberately, including the dispatcher's own
//! `NotFound`. Root servers route both channels through their error pipeline.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Kind tag attached to failures raised by the dispatcher itself.
pub const RESPONSE_ERROR_TYPE: &str = "RESPONSE";

/// Kind tag reported for runtime handler errors.
pub const HANDLER_ERROR_TYPE: &str = "ERROR";

/// The channel a [`Failure`] is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Runtime failures raised by handler code.
    Error,
    /// Explicitly raised domain failures.
    Exception,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Exception => "exception",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that ends the current dispatch pass.
///
/// # Examples
///
/// ```
/// use waypost::failure::{Channel, Failure};
///
/// let failure = Failure::raise("AUTH", "token expired");
/// assert_eq!(failure.channel(), Channel::Exception);
/// assert_eq!(failure.kind(), "AUTH");
/// assert_eq!(failure.to_string(), "token expired");
///
/// let failure = Failure::handler("database unavailable");
/// assert_eq!(failure.channel(), Channel::Error);
/// ```
#[derive(Debug, Error)]
pub enum Failure {
    /// No route matched, or dispatch finished without a usable body.
    #[error("Not Found.")]
    NotFound,

    /// Global middleware ended the pass before routing in an unexpected way.
    ///
    /// Reserved: the dispatcher never raises it on its own.
    #[error("Unexpected end before routing. Please check global middlewares.")]
    UnexpectedGlobal,

    /// A failure raised on purpose by application code.
    #[error("{message}")]
    Raised { kind: String, message: String },

    /// A runtime error returned by a handler.
    #[error(transparent)]
    Handler(Box<dyn StdError + Send + Sync + 'static>),
}

impl Failure {
    /// Raise a domain failure of the given kind on the exception channel.
    pub fn raise(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Wrap a runtime error for the error channel.
    pub fn handler(error: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Handler(error.into())
    }

    pub fn channel(&self) -> Channel {
        match self {
            Self::Handler(_) => Channel::Error,
            Self::NotFound | Self::UnexpectedGlobal | Self::Raised { .. } => Channel::Exception,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::NotFound | Self::UnexpectedGlobal => RESPONSE_ERROR_TYPE,
            Self::Raised { kind, .. } => kind,
            Self::Handler(_) => HANDLER_ERROR_TYPE,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_a_response_exception() {
        let f = Failure::NotFound;
        assert_eq!(f.channel(), Channel::Exception);
        assert_eq!(f.kind(), RESPONSE_ERROR_TYPE);
        assert_eq!(f.to_string(), "Not Found.");
        assert!(f.is_not_found());
    }

    #[test]
    fn unexpected_global_keeps_its_message() {
        let f = Failure::UnexpectedGlobal;
        assert_eq!(f.kind(), RESPONSE_ERROR_TYPE);
        assert!(f.to_string().starts_with("Unexpected end before routing"));
    }

    #[test]
    fn handler_errors_are_transparent() {
        let io = std::io::Error::other("disk full");
        let f = Failure::handler(io);
        assert_eq!(f.channel(), Channel::Error);
        assert_eq!(f.kind(), HANDLER_ERROR_TYPE);
        assert_eq!(f.to_string(), "disk full");
    }

    #[test]
    fn channel_names() {
        assert_eq!(Channel::Error.to_string(), "error");
        assert_eq!(Channel::Exception.to_string(), "exception");
    }
}
