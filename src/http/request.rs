//! Request object handed to routes, middleware and handlers.
//!
//! # Responsibilities
//! - Carry method, URI, headers and the buffered body
//! - Parse the query string once, at construction
//! - Decode JSON and form bodies into parameters on demand
//!
//! # Design Decisions
//! - Body is fully buffered before dispatch; size is capped by the server layer
//! - `key[]` query and form fields collect into arrays, other repeats keep the last value
//! - A JSON body that is not an object contributes no parameters

use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use serde_json::Value;

use crate::routing::coerce::ParameterSet;

/// An HTTP request with a buffered body.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    query: ParameterSet,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        let query = uri.query().map(parse_pairs).unwrap_or_default();
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            query,
        }
    }

    /// Build from the parts of an incoming axum request and its collected body.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        let mut request = Self::new(parts.method, parts.uri);
        request.headers = parts.headers;
        request.body = body;
        request
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and its content type.
    pub fn with_json(self, value: &Value) -> Self {
        self.with_header(CONTENT_TYPE.as_str(), "application/json")
            .with_body(value.to_string())
    }

    /// Set a urlencoded form body and its content type.
    pub fn with_form(self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter())
            .finish();
        self.with_header(CONTENT_TYPE.as_str(), "application/x-www-form-urlencoded")
            .with_body(encoded)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request path, without query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as text, or `default` when absent or not valid UTF-8.
    pub fn header<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(default)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decoded query string parameters.
    pub fn query(&self) -> &ParameterSet {
        &self.query
    }

    /// Urlencoded form fields; empty for other content types.
    pub fn post(&self) -> ParameterSet {
        if self.content_type_is("application/x-www-form-urlencoded") {
            std::str::from_utf8(&self.body)
                .map(parse_pairs)
                .unwrap_or_default()
        } else {
            ParameterSet::new()
        }
    }

    /// The body parsed as JSON, when the content type says it is JSON.
    pub fn json(&self) -> Option<Value> {
        if !self.content_type_is("json") || self.body.is_empty() {
            return None;
        }
        match serde_json::from_slice(&self.body) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(error = %err, "Ignoring malformed JSON body");
                None
            }
        }
    }

    /// Parameters carried by the body: JSON object fields or form fields.
    pub fn body_params(&self) -> ParameterSet {
        match self.json() {
            Some(Value::Object(map)) => map,
            Some(_) => ParameterSet::new(),
            None => self.post(),
        }
    }

    /// A single input value, body first, then query.
    pub fn input(&self, key: &str) -> Option<Value> {
        self.body_params()
            .remove(key)
            .or_else(|| self.query.get(key).cloned())
    }

    fn content_type_is(&self, needle: &str) -> bool {
        self.header(CONTENT_TYPE.as_str(), "")
            .to_ascii_lowercase()
            .contains(needle)
    }
}

fn parse_pairs(encoded: &str) -> ParameterSet {
    let mut params = ParameterSet::new();
    for (key, value) in url::form_urlencoded::parse(encoded.as_bytes()) {
        match key.strip_suffix("[]") {
            Some(list) => {
                let entry = params
                    .entry(list.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                match entry {
                    Value::Array(items) => items.push(Value::String(value.into_owned())),
                    other => *other = Value::Array(vec![Value::String(value.into_owned())]),
                }
            }
            None => {
                params.insert(key.into_owned(), Value::String(value.into_owned()));
            }
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_parsing() {
        let request = Request::new(
            Method::GET,
            Uri::from_static("/search?q=red+shoes&tag[]=a&tag[]=b&page=1&page=2"),
        );
        assert_eq!(request.path(), "/search");
        assert_eq!(request.query()["q"], json!("red shoes"));
        assert_eq!(request.query()["tag"], json!(["a", "b"]));
        assert_eq!(request.query()["page"], json!("2"));
    }

    #[test]
    fn test_json_body() {
        let request = Request::new(Method::POST, Uri::from_static("/items"))
            .with_json(&json!({"name": "lamp", "price": 12.5}));
        assert_eq!(request.body_params()["price"], json!(12.5));
        assert_eq!(request.input("name"), Some(json!("lamp")));
        assert!(request.post().is_empty());

        let array = Request::new(Method::POST, Uri::from_static("/items")).with_json(&json!([1, 2]));
        assert!(array.body_params().is_empty());
    }

    #[test]
    fn test_form_body_and_headers() {
        let request = Request::new(Method::POST, Uri::from_static("/items?name=query"))
            .with_form(&[("name", "form"), ("ids[]", "1"), ("ids[]", "2")])
            .with_header("X-Token", "abc");
        assert_eq!(request.body_params()["ids"], json!(["1", "2"]));
        assert_eq!(request.input("name"), Some(json!("form")));
        assert_eq!(request.header("x-token", "none"), "abc");
        assert_eq!(request.header("x-missing", "none"), "none");
    }

    #[test]
    fn test_malformed_json_is_ignored() {
        let request = Request::new(Method::POST, Uri::from_static("/"))
            .with_header("content-type", "application/json")
            .with_body("{not json");
        assert!(request.json().is_none());
        assert!(request.body_params().is_empty());
    }
}
