//! # waypost
//!
//! A synchronous middleware and route dispatch core for small HTTP
//! frameworks.
//!
//! A [`Server`] runs one request per dispatch pass: global middleware, then
//! every route whose pattern matches the path, then output. Failures go to
//! the root server's error middleware, which can turn them into a response.
//!
//! ## Quick Start
//!
//! ```rust
//! use waypost::{Failure, Request, Response, Server};
//! use waypost::output::BufferSink;
//!
//! let mut server = Server::new();
//! server
//!     .get("/users/*", |_ctx, req, res| {
//!         match req.variable(0) {
//!             Some(id) if !id.is_empty() => {
//!                 res.set_body(serde_json::json!({ "id": id }));
//!                 Ok(())
//!             }
//!             _ => Err(Failure::raise("VALIDATION", "missing user id")),
//!         }
//!     })
//!     .unwrap();
//! server.error(|_ctx, _req, res: &mut Response, failure: &Failure| {
//!     res.set_body(format!("{}: {failure}", failure.kind()));
//! });
//!
//! let mut sink = BufferSink::new();
//! server.render(&mut Request::new("GET", "/users/"), &mut sink).unwrap();
//! assert_eq!(sink.status_code(), Some(500));
//! assert_eq!(sink.body_text(), "VALIDATION: missing user id");
//! ```
//!
//! Running as a CGI program only needs the gateway collaborators:
//!
//! ```rust,no_run
//! use waypost::Server;
//! use waypost::cgi::{CgiSink, CgiSource};
//!
//! let mut server = Server::new();
//! server.get("/", |_ctx, _req, res| res.set_body("hello")).unwrap();
//! server
//!     .render(&mut CgiSource::from_process(), &mut CgiSink::stdout())
//!     .unwrap();
//! ```

// ── Exchange model ────────────────────────────────────────────────────────────
pub mod config;
pub mod failure;
pub mod http;

// ── Dispatch core ─────────────────────────────────────────────────────────────
pub mod context;
pub mod middleware;
pub mod output;
pub mod router;
pub mod server;

// ── Gateways ──────────────────────────────────────────────────────────────────
pub mod cgi;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::Config;
pub use context::Context;
pub use failure::Failure;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::Flow;
pub use server::{DispatchError, Server, ServerError};
