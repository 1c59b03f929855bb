//! Dispatch-side response container.
//!
//! Handlers accumulate status, headers, and body into a [`Response`]; the
//! output stage reads it exactly once. The body is a [`serde_json::Value`] so
//! a handler can store either a scalar or a structured document.

use serde_json::Value;

use super::Headers;

/// A response under construction.
///
/// The status code stays unset until someone sets it, which is how the error
/// pipeline tells "no status chosen" from an explicit `200`.
///
/// # Examples
///
/// ```
/// use waypost::http::Response;
/// use serde_json::json;
///
/// let mut response = Response::new();
/// assert_eq!(response.code(), None);
/// assert_eq!(response.status(), 200);
///
/// response.set_body(json!({"x": 1}));
/// assert!(!response.has_text_body());
///
/// response.set_body("hello");
/// assert_eq!(response.body_text().as_deref(), Some("hello"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    code: Option<u16>,
    headers: Headers,
    body: Option<Value>,
}

impl Response {
    /// Creates an empty response: no code, no headers, no body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the explicitly set status code, if any.
    pub fn code(&self) -> Option<u16> {
        self.code
    }

    /// Returns the effective status code, `200` when none was set.
    pub fn status(&self) -> u16 {
        self.code.unwrap_or(200)
    }

    pub fn set_code(&mut self, code: u16) {
        self.code = Some(code);
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Sets a header, replacing an existing value with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.body = Some(body.into());
    }

    /// Removes and returns the body.
    pub fn take_body(&mut self) -> Option<Value> {
        self.body.take()
    }

    /// Returns the body as text when it is a scalar.
    ///
    /// Absent bodies, `null`, arrays, and objects yield `None`.
    pub fn body_text(&self) -> Option<String> {
        self.body.as_ref().and_then(scalar_text)
    }

    /// Returns `true` when the body is a scalar with a non-empty text form.
    pub fn has_text_body(&self) -> bool {
        self.body_text().is_some_and(|text| !text.is_empty())
    }
}

/// Stringifies a scalar JSON value; `true` becomes `"1"` and `false` becomes `""`.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        // Whole floats drop the fraction: `1.0` renders as `1`.
        Value::Number(n) => Some(match n.as_f64() {
            Some(float) if n.is_f64() => float.to_string(),
            _ => n.to_string(),
        }),
        Value::Bool(true) => Some("1".to_owned()),
        Value::Bool(false) => Some(String::new()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Truthiness used by the output stage when coercing bodies.
pub(crate) fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => is_falsy_text(s),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Truthiness of a header value or stringified body.
pub(crate) fn is_falsy_text(text: &str) -> bool {
    text.is_empty() || text == "0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unset_code_reports_ok() {
        let mut r = Response::new();
        assert_eq!(r.status(), 200);
        r.set_code(418);
        assert_eq!(r.code(), Some(418));
        assert_eq!(r.status(), 418);
    }

    #[test]
    fn scalar_bodies_stringify() {
        assert_eq!(scalar_text(&json!("hi")).as_deref(), Some("hi"));
        assert_eq!(scalar_text(&json!(42)).as_deref(), Some("42"));
        assert_eq!(scalar_text(&json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(scalar_text(&json!(1.0)).as_deref(), Some("1"));
        assert_eq!(scalar_text(&json!(-3.0)).as_deref(), Some("-3"));
        assert_eq!(scalar_text(&json!(true)).as_deref(), Some("1"));
        assert_eq!(scalar_text(&json!(false)).as_deref(), Some(""));
        assert_eq!(scalar_text(&json!(null)), None);
        assert_eq!(scalar_text(&json!([1])), None);
    }

    #[test]
    fn has_text_body_requires_non_empty_scalar() {
        let mut r = Response::new();
        assert!(!r.has_text_body());
        r.set_body("");
        assert!(!r.has_text_body());
        r.set_body(false);
        assert!(!r.has_text_body());
        r.set_body(json!({"a": 1}));
        assert!(!r.has_text_body());
        r.set_body(0);
        assert!(r.has_text_body());
    }

    #[test]
    fn falsy_values() {
        for value in [
            json!(null),
            json!(false),
            json!(0),
            json!(0.0),
            json!(""),
            json!("0"),
            json!([]),
            json!({}),
        ] {
            assert!(is_falsy(&value), "{value} should be falsy");
        }
        for value in [json!(true), json!(1), json!("a"), json!("00"), json!([0])] {
            assert!(!is_falsy(&value), "{value} should be truthy");
        }
    }

    #[test]
    fn take_body_clears() {
        let mut r = Response::new();
        r.set_body("x");
        assert_eq!(r.take_body(), Some(json!("x")));
        assert!(r.body().is_none());
    }
}
