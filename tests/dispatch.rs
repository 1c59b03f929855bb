use std::sync::{Arc, Mutex};

use serde_json::json;
use waypost::cgi::{CgiSink, CgiSource};
use waypost::http::RequestSource;
use waypost::output::{BufferSink, Emission};
use waypost::server::{Rendered, Termination};
use waypost::{Config, Context, DispatchError, Failure, Flow, Request, Response, Server};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn render(server: &mut Server, mut request: Request) -> (Result<Rendered, DispatchError>, BufferSink) {
    let mut sink = BufferSink::new();
    let result = server.render(&mut request, &mut sink);
    (result, sink)
}

// ── scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn middleware_then_route_then_output() {
    init_tracing();
    let mut server = Server::new();
    server.add(|_, _, res: &mut Response| res.set_header("X-Trace", "on"));
    server
        .get("/users/*", |_, req: &mut Request, res: &mut Response| {
            let id = req.variable(0).unwrap_or_default().to_owned();
            res.set_body(format!("user {id}"));
        })
        .unwrap();

    let (result, sink) = render(&mut server, Request::new("GET", "/users/42"));

    assert_eq!(result.unwrap(), Rendered::Complete(Emission::Emitted));
    assert_eq!(sink.body_text(), "user 42");
    assert_eq!(
        sink.header_lines(),
        ["X-Trace: on", "Content-Type: text/html; charset=utf-8"]
    );
    assert!(server.success());
}

#[test]
fn missing_route_reaches_error_middleware() {
    init_tracing();
    let mut server = Server::new();
    server.post("/only-post", |_, _, res: &mut Response| res.set_body("x")).unwrap();
    server.error(|_, _, res: &mut Response, failure: &Failure| {
        res.set_body(format!("{} ({})", failure, failure.kind()));
    });

    let (result, sink) = render(&mut server, Request::new("GET", "/"));

    assert_eq!(
        result.unwrap(),
        Rendered::Terminated(Termination::ErrorResponse {
            status: 404,
            emission: Emission::Emitted,
        })
    );
    assert_eq!(sink.status_code(), Some(404));
    assert_eq!(sink.body_text(), "Not Found. (RESPONSE)");
}

#[test]
fn error_middleware_may_choose_status() {
    init_tracing();
    let mut server = Server::new();
    server
        .get("/admin", |_, _, _| -> Result<(), Failure> {
            Err(Failure::raise("AUTH", "login required"))
        })
        .unwrap();
    server.error(|_, _, res: &mut Response, failure: &Failure| {
        if failure.kind() == "AUTH" {
            res.set_code(401);
        }
        res.set_body(failure.to_string());
    });

    let (_, sink) = render(&mut server, Request::new("GET", "/admin/panel"));

    assert_eq!(sink.status_code(), Some(401));
    assert_eq!(sink.body_text(), "login required");
}

#[test]
fn silent_error_middleware_leaves_failure_unhandled() {
    init_tracing();
    let mut server = Server::new();
    server.error(|_, _, _, _| Flow::Continue);

    let (result, sink) = render(&mut server, Request::new("GET", "/"));

    let Err(DispatchError::Unhandled(unhandled)) = result else {
        panic!("expected an unhandled failure");
    };
    assert!(unhandled.failure.is_not_found());
    assert_eq!(unhandled.response.code(), Some(404));
    assert!(!sink.is_written());
    assert!(!server.success());
}

#[test]
fn structured_body_is_not_a_usable_route_result() {
    init_tracing();
    let mut server = Server::new();
    server
        .get("/data", |_, _, res: &mut Response| res.set_body(json!({"x": 1})))
        .unwrap();

    let (result, _) = render(&mut server, Request::new("GET", "/data"));
    assert!(result.unwrap_err().failure().is_some_and(Failure::is_not_found));

    let mut response = Response::new();
    response.set_body(json!({"x": 1}));
    let mut sink = BufferSink::new();
    server.output(&response, &mut sink).unwrap();
    assert_eq!(sink.body_text(), "{\n    \"x\": 1\n}");
}

#[test]
fn child_nodes_evolve_separately() {
    init_tracing();
    let mut parent = Server::new();
    parent.get("/", |_, _, res: &mut Response| res.set_body("shared")).unwrap();

    let mut child = parent.child();
    child.add(|_, _, res: &mut Response| res.set_header("X-Child", "1"));

    let (_, from_parent) = render(&mut parent, Request::new("GET", "/"));
    let (_, from_child) = render(&mut child, Request::new("GET", "/"));

    assert_eq!(from_parent.header_value("X-Child"), None);
    assert_eq!(from_child.header_value("X-Child"), Some("1"));
    assert_eq!(from_parent.body_text(), from_child.body_text());
}

#[test]
fn context_identifies_the_running_node() {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut parent = Server::new();
    let log = Arc::clone(&seen);
    parent.add(move |ctx: &mut Context<'_>, _, res: &mut Response| {
        log.lock().unwrap().push((ctx.node(), ctx.is_root()));
        res.set_body("ok");
    });
    let mut child = parent.child();

    render(&mut parent, Request::new("GET", "/")).0.unwrap();
    let _ = render(&mut child, Request::new("GET", "/"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], (parent.id(), true));
    assert_eq!(seen[1], (child.id(), false));
}

#[test]
fn config_drives_fallbacks() {
    init_tracing();
    let config = Config::from_json(
        r#"{ "default_content_type": "text/plain", "error_status": 503, "json_indent": 2 }"#,
    )
    .unwrap();
    let mut server = Server::with_config(config);
    server
        .get("/", |_, _, _| -> Result<(), Failure> { Err(Failure::handler("down")) })
        .unwrap();
    server.error(|_, _, res: &mut Response, _| res.set_body("later"));

    let (_, sink) = render(&mut server, Request::new("GET", "/"));

    assert_eq!(sink.status_code(), Some(503));
    assert_eq!(sink.header_value("content-type"), Some("text/plain"));
}

// ── CGI gateway ───────────────────────────────────────────────────────────────

#[test]
fn cgi_round_trip() {
    init_tracing();
    let mut server = Server::new();
    server
        .post("/login", |_, req: &mut Request, res: &mut Response| {
            let user = req.post().get("user").unwrap_or("anonymous").to_owned();
            res.set_header("Content-Type", "text/plain");
            res.set_code(201);
            res.set_body(format!("welcome {user}"));
        })
        .unwrap();

    let vars = [
        ("REQUEST_METHOD", "POST"),
        ("REQUEST_URI", "/login"),
        ("CONTENT_TYPE", "application/x-www-form-urlencoded"),
        ("CONTENT_LENGTH", "8"),
    ];
    let mut source = CgiSource::new(vars, &b"user=ada&ignored"[..]);
    let mut sink = CgiSink::new(Vec::new());
    server.render(&mut source, &mut sink).unwrap();

    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(
        out,
        "Status: 201 Created\r\nContent-Type: text/plain\r\n\r\nwelcome ada"
    );
}

#[test]
fn cgi_redirect_back() {
    init_tracing();
    let server = Server::new();
    let vars = [("REQUEST_METHOD", "GET"), ("HTTP_REFERER", "/cart")];
    let request = CgiSource::new(vars, &b""[..]).acquire().unwrap();
    let mut sink = CgiSink::new(Vec::new());
    server.redirect("back", &request, &mut sink).unwrap();

    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(out, "Location: /cart\r\n\r\n");
}

#[test]
fn cgi_source_without_method_fails_before_dispatch() {
    init_tracing();
    let ends = Arc::new(Mutex::new(0));
    let mut server = Server::new();
    let counter = Arc::clone(&ends);
    server.on_end(move |_| *counter.lock().unwrap() += 1);

    let mut source = CgiSource::new([("REQUEST_URI", "/")], &b""[..]);
    let result = server.render(&mut source, &mut BufferSink::new());

    assert!(matches!(result, Err(DispatchError::Source(_))));
    assert_eq!(*ends.lock().unwrap(), 1);
}
