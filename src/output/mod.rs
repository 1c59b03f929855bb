//! Output stage — turn a finished [`Response`] into sink calls.
//!
//! Output happens in two steps. [`prepare`] applies the emission rules
//! (default `Content-Type`, falsy-body coercion, structured-body
//! serialization, name-only headers) and yields a [`Prepared`] value that
//! observers may inspect. [`emit`] then drives an [`OutputSink`] with exactly
//! one call per response field.

use std::borrow::Cow;
use std::io;

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;

use crate::Response;
use crate::config::Config;
use crate::http::response::{is_falsy, is_falsy_text, scalar_text};

/// Errors produced by the output stage.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error while writing the response: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize the response body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The three primitives the output stage writes through.
pub trait OutputSink {
    /// Set the response status code.
    fn status(&mut self, code: u16) -> io::Result<()>;

    /// Emit one header. `None` emits the bare name with no value suffix.
    fn header(&mut self, name: &str, value: Option<&str>) -> io::Result<()>;

    /// Emit the response body. Called once, after every header.
    fn write(&mut self, body: &[u8]) -> io::Result<()>;
}

/// A response with every emission rule applied, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    /// Status to set, if the response chose one.
    pub status: Option<u16>,
    /// Headers in emission order; `None` marks a name-only header.
    pub headers: Vec<(String, Option<String>)>,
    pub body: String,
}

/// What the output stage did with a prepared response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// Everything was written to the sink.
    Emitted,
    /// An observer vetoed the write; the prepared output is handed back.
    Suppressed(Prepared),
}

/// Apply the emission rules to `response`.
///
/// # Errors
///
/// Returns [`OutputError::Serialize`] if a structured body cannot be
/// serialized.
pub fn prepare(response: &Response, config: &Config) -> Result<Prepared, OutputError> {
    let mut headers: Vec<(String, Option<String>)> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            let value = (!is_falsy_text(value)).then(|| value.to_owned());
            (name.to_owned(), value)
        })
        .collect();
    if !response.headers().contains("content-type") {
        headers.push((
            "Content-Type".to_owned(),
            Some(config.default_content_type.clone()),
        ));
    }

    let body = match response.body() {
        None => String::new(),
        Some(value) if is_falsy(value) => String::new(),
        Some(value) => match scalar_text(value) {
            Some(text) => text,
            None => to_pretty_json(value, config.json_indent)?,
        },
    };

    Ok(Prepared {
        status: response.code(),
        headers,
        body,
    })
}

/// Write `prepared` to `sink`: status first, then headers, then the body.
///
/// # Errors
///
/// Returns the sink's I/O error.
pub fn emit(prepared: &Prepared, sink: &mut dyn OutputSink) -> io::Result<()> {
    if let Some(code) = prepared.status {
        sink.status(code)?;
    }
    for (name, value) in &prepared.headers {
        sink.header(name, value.as_deref())?;
    }
    sink.write(prepared.body.as_bytes())
}

fn to_pretty_json(value: &serde_json::Value, indent: usize) -> Result<String, serde_json::Error> {
    let indent = " ".repeat(indent);
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// An in-memory sink that records every call.
///
/// # Examples
///
/// ```
/// use waypost::output::{BufferSink, OutputSink};
///
/// let mut sink = BufferSink::new();
/// sink.status(201).unwrap();
/// sink.header("Location", Some("/users/7")).unwrap();
/// sink.header("X-Flag", None).unwrap();
/// sink.write(b"created").unwrap();
///
/// assert_eq!(sink.status_code(), Some(201));
/// assert_eq!(sink.header_lines(), ["Location: /users/7", "X-Flag"]);
/// assert_eq!(sink.header_value("location"), Some("/users/7"));
/// assert_eq!(sink.body_text(), "created");
/// ```
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    status: Option<u16>,
    headers: Vec<String>,
    body: BytesMut,
    writes: usize,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status
    }

    /// Header lines exactly as emitted.
    pub fn header_lines(&self) -> &[String] {
        &self.headers
    }

    /// Value of the first header line named `name` (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim_start())
        })
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Returns `true` once a body write has happened.
    pub fn is_written(&self) -> bool {
        self.writes > 0
    }
}

impl OutputSink for BufferSink {
    fn status(&mut self, code: u16) -> io::Result<()> {
        self.status = Some(code);
        Ok(())
    }

    fn header(&mut self, name: &str, value: Option<&str>) -> io::Result<()> {
        self.headers.push(match value {
            Some(value) => format!("{name}: {value}"),
            None => name.to_owned(),
        });
        Ok(())
    }

    fn write(&mut self, body: &[u8]) -> io::Result<()> {
        self.body.put(body);
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prepared(response: &Response) -> Prepared {
        prepare(response, &Config::default()).unwrap()
    }

    #[test]
    fn missing_content_type_is_defaulted() {
        let mut r = Response::new();
        r.set_body("hi");
        let p = prepared(&r);
        assert_eq!(
            p.headers,
            vec![(
                "Content-Type".to_owned(),
                Some("text/html; charset=utf-8".to_owned())
            )]
        );
        assert_eq!(p.status, None);
        assert_eq!(p.body, "hi");
    }

    #[test]
    fn existing_content_type_is_kept_case_insensitively() {
        let mut r = Response::new();
        r.set_header("content-type", "application/json");
        let p = prepared(&r);
        assert_eq!(p.headers.len(), 1);
        assert_eq!(p.headers[0].1.as_deref(), Some("application/json"));
    }

    #[test]
    fn falsy_header_values_are_name_only() {
        let mut r = Response::new();
        r.set_header("X-Empty", "");
        r.set_header("X-Zero", "0");
        r.set_header("X-Set", "yes");
        let p = prepared(&r);
        assert_eq!(p.headers[0], ("X-Empty".to_owned(), None));
        assert_eq!(p.headers[1], ("X-Zero".to_owned(), None));
        assert_eq!(p.headers[2], ("X-Set".to_owned(), Some("yes".to_owned())));
    }

    #[test]
    fn falsy_bodies_become_empty() {
        for body in [json!(false), json!(0), json!("0"), json!([]), json!({})] {
            let mut r = Response::new();
            r.set_body(body);
            assert_eq!(prepared(&r).body, "");
        }
    }

    #[test]
    fn structured_body_is_pretty_printed() {
        let mut r = Response::new();
        r.set_body(json!({"x": 1}));
        assert_eq!(prepared(&r).body, "{\n    \"x\": 1\n}");
    }

    #[test]
    fn indent_follows_config() {
        let config = Config {
            json_indent: 2,
            ..Config::default()
        };
        let mut r = Response::new();
        r.set_body(json!([1, 2]));
        assert_eq!(prepare(&r, &config).unwrap().body, "[\n  1,\n  2\n]");
    }

    #[test]
    fn emit_writes_status_headers_body_in_order() {
        let mut r = Response::new();
        r.set_code(404);
        r.set_header("X-A", "1");
        r.set_body("missing");
        let mut sink = BufferSink::new();
        emit(&prepared(&r), &mut sink).unwrap();
        assert_eq!(sink.status_code(), Some(404));
        assert_eq!(
            sink.header_lines(),
            ["X-A: 1", "Content-Type: text/html; charset=utf-8"]
        );
        assert_eq!(sink.body_text(), "missing");
        assert!(sink.is_written());
    }

    #[test]
    fn emit_without_code_leaves_status_alone() {
        let mut sink = BufferSink::new();
        emit(&prepared(&Response::new()), &mut sink).unwrap();
        assert_eq!(sink.status_code(), None);
        assert_eq!(sink.body(), b"");
    }
}
