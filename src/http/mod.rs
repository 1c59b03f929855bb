//! HTTP primitives shared by the dispatch core.
//!
//! This module provides [`Method`], [`StatusCode`], [`Headers`], [`Request`],
//! and [`Response`]. Nothing here parses HTTP off the wire: requests arrive
//! through a [`RequestSource`] and responses leave through an
//! [`OutputSink`](crate::output::OutputSink).

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::{Fields, Request, RequestPath, RequestSource, SourceError};
pub use response::Response;

/// A numeric response status, with a reason phrase when one is known.
///
/// Any code is representable; only the statuses a dispatch core commonly
/// emits carry a phrase.
///
/// # Examples
///
/// ```
/// use waypost::http::StatusCode;
///
/// assert_eq!(StatusCode::NOT_FOUND.to_string(), "404 Not Found");
/// assert_eq!(StatusCode::new(299).canonical_reason(), None);
/// assert_eq!(StatusCode::new(299).to_string(), "299");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u16);

const REASONS: &[(u16, &str)] = &[
    (200, "OK"),
    (201, "Created"),
    (202, "Accepted"),
    (204, "No Content"),
    (301, "Moved Permanently"),
    (302, "Found"),
    (303, "See Other"),
    (304, "Not Modified"),
    (307, "Temporary Redirect"),
    (308, "Permanent Redirect"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (409, "Conflict"),
    (410, "Gone"),
    (422, "Unprocessable Entity"),
    (429, "Too Many Requests"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
];

impl StatusCode {
    pub const OK: Self = Self(200);
    pub const FOUND: Self = Self(302);
    pub const NOT_FOUND: Self = Self(404);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub fn canonical_reason(self) -> Option<&'static str> {
        REASONS
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, reason)| *reason)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_reason() {
            Some(reason) => write!(f, "{} {reason}", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> u16 {
        status.0
    }
}

/// An HTTP request method.
///
/// Parsing upper-cases the name first, so `"get"` and `"GET"` resolve to the
/// same route table.
///
/// # Examples
///
/// ```
/// use waypost::http::Method;
///
/// let method: Method = "get".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!(method.as_str(), "GET");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Trace,
    /// Any other method, upper-cased.
    Custom(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Ok(match upper.as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            _ => Self::Custom(upper),
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!("delete".parse::<Method>().unwrap(), Method::Delete);
        assert_eq!("Post".parse::<Method>().unwrap(), Method::Post);
    }

    #[test]
    fn method_parse_custom_is_upper_cased() {
        let method: Method = "purge".parse().unwrap();
        assert_eq!(method, Method::Custom("PURGE".to_owned()));
        assert_eq!(method.as_str(), "PURGE");
    }

    #[test]
    fn status_display_includes_known_reason() {
        assert_eq!(StatusCode::new(500).to_string(), "500 Internal Server Error");
        assert_eq!(StatusCode::FOUND.canonical_reason(), Some("Found"));
        assert_eq!(StatusCode::new(799).to_string(), "799");
        assert_eq!(u16::from(StatusCode::OK), 200);
    }
}
