//! CGI gateway collaborators.
//!
//! [`CgiSource`] assembles a [`Request`] from CGI meta-variables and a body
//! reader; [`CgiSink`] writes a CGI response (a `Status` line, header lines,
//! a blank line, then the body) to any [`Write`] target. Together they let a
//! server node run as a classic CGI program.

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::http::request::parse_urlencoded;
use crate::http::{Fields, Request, RequestSource, SourceError, StatusCode};
use crate::output::OutputSink;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Builds requests from CGI meta-variables and a body reader.
///
/// # Examples
///
/// ```
/// use waypost::cgi::CgiSource;
/// use waypost::http::RequestSource;
///
/// let vars = [
///     ("REQUEST_METHOD", "POST"),
///     ("REQUEST_URI", "/login?next=%2Fhome"),
///     ("QUERY_STRING", "next=%2Fhome"),
///     ("CONTENT_TYPE", "application/x-www-form-urlencoded"),
///     ("HTTP_COOKIE", "sid=abc; theme=dark"),
/// ];
/// let mut source = CgiSource::new(vars, &b"user=ada&pass=x"[..]);
/// let request = source.acquire().unwrap();
///
/// assert_eq!(request.path().as_str(), "/login");
/// assert_eq!(request.get().get("next"), Some("/home"));
/// assert_eq!(request.post().get("user"), Some("ada"));
/// assert_eq!(request.cookie().get("theme"), Some("dark"));
/// ```
pub struct CgiSource<R> {
    vars: Fields,
    body: R,
}

impl<R: Read> CgiSource<R> {
    pub fn new<I, K, V>(vars: I, body: R) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().collect(),
            body,
        }
    }
}

impl CgiSource<io::Stdin> {
    /// A source reading the current process environment and stdin.
    pub fn from_process() -> Self {
        Self::new(std::env::vars(), io::stdin())
    }
}

impl<R: Read> CgiSource<R> {
    fn read_body(&mut self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        match self
            .vars
            .get("CONTENT_LENGTH")
            .and_then(|len| len.trim().parse::<u64>().ok())
        {
            Some(len) => {
                (&mut self.body).take(len).read_to_end(&mut buf)?;
            }
            None => {
                self.body.read_to_end(&mut buf)?;
            }
        }
        Ok(Bytes::from(buf))
    }
}

impl<R: Read> RequestSource for CgiSource<R> {
    fn acquire(&mut self) -> Result<Request, SourceError> {
        let method = self
            .vars
            .get("REQUEST_METHOD")
            .ok_or(SourceError::MissingField {
                field: "REQUEST_METHOD",
            })?
            .to_owned();
        let uri = self.vars.get("REQUEST_URI").unwrap_or("/").to_owned();
        let query = self.vars.get("QUERY_STRING").unwrap_or("").to_owned();

        let body = self.read_body()?;

        let is_form = self
            .vars
            .get("CONTENT_TYPE")
            .is_some_and(|ct| ct.trim_start().starts_with(FORM_CONTENT_TYPE));
        let post = if is_form {
            parse_urlencoded(&body)
        } else {
            Fields::new()
        };

        let cookie = self
            .vars
            .get("HTTP_COOKIE")
            .map(parse_cookies)
            .unwrap_or_default();

        debug!(method = %method, uri = %uri, body_len = body.len(), "CGI request acquired");

        Ok(Request::new(&method, &uri)
            .get_fields(parse_urlencoded(query.as_bytes()))
            .query(query)
            .body(body)
            .post_fields(post)
            .cookies(cookie)
            .server(self.vars.clone()))
    }
}

/// Splits a `Cookie` header value (`a=1; b=2`) into fields.
fn parse_cookies(header: &str) -> Fields {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim(), value.trim()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

/// Writes CGI responses to a [`Write`] target.
///
/// Header lines are buffered until the body is written, so the `Status`
/// line always comes first even if headers were emitted before it.
///
/// # Examples
///
/// ```
/// use waypost::cgi::CgiSink;
/// use waypost::output::OutputSink;
///
/// let mut sink = CgiSink::new(Vec::new());
/// sink.status(404).unwrap();
/// sink.header("Content-Type", Some("text/plain")).unwrap();
/// sink.write(b"gone").unwrap();
///
/// let out = String::from_utf8(sink.into_inner()).unwrap();
/// assert_eq!(out, "Status: 404 Not Found\r\nContent-Type: text/plain\r\n\r\ngone");
/// ```
pub struct CgiSink<W: Write> {
    out: W,
    status: Option<u16>,
    head: BytesMut,
}

impl<W: Write> CgiSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            status: None,
            head: BytesMut::with_capacity(256),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl CgiSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> OutputSink for CgiSink<W> {
    fn status(&mut self, code: u16) -> io::Result<()> {
        self.status = Some(code);
        Ok(())
    }

    fn header(&mut self, name: &str, value: Option<&str>) -> io::Result<()> {
        match value {
            Some(value) => self.head.put(format!("{name}: {value}\r\n").as_bytes()),
            None => self.head.put(format!("{name}\r\n").as_bytes()),
        }
        Ok(())
    }

    fn write(&mut self, body: &[u8]) -> io::Result<()> {
        if let Some(code) = self.status.take() {
            let line = format!("Status: {}\r\n", StatusCode::new(code));
            self.out.write_all(line.as_bytes())?;
        }
        self.out.write_all(&self.head.split())?;
        self.out.write_all(b"\r\n")?;
        self.out.write_all(body)?;
        self.out.flush()
    }
}
