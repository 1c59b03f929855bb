//! Dispatch-side request container and the request-source contract.
//!
//! A [`Request`] is assembled once per dispatch by a [`RequestSource`]. The
//! core only reads what the source supplied and writes back the captured
//! path variables during route resolution.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

use super::Method;

/// Errors produced while acquiring a request from its source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error while reading the request: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// Supplies the [`Request`] for one dispatch pass.
pub trait RequestSource {
    /// Produce the request to dispatch.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the underlying collaborator cannot
    /// supply a complete request.
    fn acquire(&mut self) -> Result<Request, SourceError>;
}

/// A fixed request acts as its own source and is replayed on every pass.
impl RequestSource for Request {
    fn acquire(&mut self) -> Result<Request, SourceError> {
        Ok(self.clone())
    }
}

/// A flat string map used for server metadata, cookies, and decoded fields.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Fields {
    map: HashMap<String, String>,
}

impl Fields {
    /// Create a new empty field map
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a value, replacing any previous value for `key`
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Remove a value by key
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over all entries in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The request path as a raw string plus its `/`-split segments.
///
/// Segments are kept exactly as splitting produces them, so an absolute path
/// starts with an empty segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    raw: String,
    segments: Vec<String>,
}

impl RequestPath {
    /// Parses a request URI, discarding everything from the first `?`.
    pub fn parse(uri: &str) -> Self {
        let raw = match uri.split_once('?') {
            Some((path, _)) => path,
            None => uri,
        };
        Self {
            raw: raw.to_owned(),
            segments: raw.split('/').map(str::to_owned).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// A request as seen by the dispatch core.
///
/// # Examples
///
/// ```
/// use waypost::http::{Method, Request};
///
/// let request = Request::new("get", "/users/42?tab=posts").query("tab=posts");
///
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.path().as_str(), "/users/42");
/// assert_eq!(request.path().segments(), ["", "users", "42"]);
/// assert_eq!(request.query_string(), "tab=posts");
/// assert!(request.variables().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    query: String,
    body: Bytes,
    server: Fields,
    cookie: Fields,
    get: Fields,
    post: Fields,
    files: Map<String, Value>,
    path: RequestPath,
    variables: Vec<String>,
}

impl Request {
    /// Creates a request for `method` and `uri` with every other field empty.
    pub fn new(method: impl AsRef<str>, uri: &str) -> Self {
        let method = match method.as_ref().parse::<Method>() {
            Ok(method) => method,
            Err(never) => match never {},
        };
        Self {
            method,
            query: String::new(),
            body: Bytes::new(),
            server: Fields::new(),
            cookie: Fields::new(),
            get: Fields::new(),
            post: Fields::new(),
            files: Map::new(),
            path: RequestPath::parse(uri),
            variables: Vec::new(),
        }
    }

    /// Sets the raw query string.
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Sets the raw request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the server/environment metadata.
    #[must_use]
    pub fn server(mut self, server: Fields) -> Self {
        self.server = server;
        self
    }

    #[must_use]
    pub fn cookies(mut self, cookie: Fields) -> Self {
        self.cookie = cookie;
        self
    }

    /// Sets the decoded query-string fields.
    #[must_use]
    pub fn get_fields(mut self, get: Fields) -> Self {
        self.get = get;
        self
    }

    /// Sets the decoded form-body fields.
    #[must_use]
    pub fn post_fields(mut self, post: Fields) -> Self {
        self.post = post;
        self
    }

    /// Sets the uploaded-file metadata, kept opaque.
    #[must_use]
    pub fn files(mut self, files: Map<String, Value>) -> Self {
        self.files = files;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the raw query string (without the leading `?`).
    pub fn query_string(&self) -> &str {
        &self.query
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.body
    }

    pub fn server_meta(&self) -> &Fields {
        &self.server
    }

    pub fn cookie(&self) -> &Fields {
        &self.cookie
    }

    pub fn get(&self) -> &Fields {
        &self.get
    }

    pub fn post(&self) -> &Fields {
        &self.post
    }

    pub fn uploaded_files(&self) -> &Map<String, Value> {
        &self.files
    }

    pub fn path(&self) -> &RequestPath {
        &self.path
    }

    /// Returns the path variables captured by the route currently executing.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Returns the `index`-th captured path variable.
    pub fn variable(&self, index: usize) -> Option<&str> {
        self.variables.get(index).map(String::as_str)
    }

    pub(crate) fn set_variables(&mut self, variables: Vec<String>) {
        self.variables = variables;
    }
}

/// Decodes an `application/x-www-form-urlencoded` string into [`Fields`].
///
/// Later duplicates overwrite earlier ones.
pub(crate) fn parse_urlencoded(input: &[u8]) -> Fields {
    form_urlencoded::parse(input)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
