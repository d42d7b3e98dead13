//! Incoming HTTP request type.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::method::Method;
use crate::params::Params;

/// Header carrying the request id, inbound and outbound.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

pub(crate) const HEADER_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// An incoming HTTP request with its body fully read.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Params,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: Params,
    pub(crate) request_id: String,
}

impl Request {
    /// Starts building a request by hand. Used by the self-test harness and
    /// handy in unit tests.
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            path: path.into(),
            query: Params::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Converts hyper's request head. The server checks the method first;
    /// unknown ones never get this far.
    pub(crate) fn from_parts(method: Method, parts: http::request::Parts, body: Bytes) -> Self {
        let query = parts
            .uri
            .query()
            .map(|q| Params::from_urlencoded(q.as_bytes()))
            .unwrap_or_default();
        let request_id = request_id_from(&parts.headers);
        Self {
            method,
            path: parts.uri.path().to_owned(),
            query,
            headers: parts.headers,
            body,
            params: Params::new(),
            request_id,
        }
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn request_id(&self) -> &str { &self.request_id }

    /// Header lookup. Names are case-insensitive; non-UTF-8 values read as
    /// absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns a query-string parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key)
    }

    pub fn query_params(&self) -> &Params {
        &self.query
    }

    /// Every parameter a handler input can bind from: query string, then a
    /// url-encoded form body, then path parameters. Later sources win.
    pub fn values(&self) -> Params {
        let mut out = self.query.clone();
        if self.is_form() {
            out.extend_from(&Params::from_urlencoded(&self.body));
        }
        out.extend_from(&self.params);
        out
    }

    /// Whether the fronting proxy reports a TLS connection.
    pub fn is_secure(&self) -> bool {
        self.header(HEADER_FORWARDED_PROTO)
            .is_some_and(|p| p.eq_ignore_ascii_case("https"))
    }

    fn is_form(&self) -> bool {
        self.header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
    }
}

/// The inbound `X-Request-Id`, or a fresh uuid v4 when absent or empty.
pub(crate) fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`]. Obtain via [`Request::builder`].
pub struct RequestBuilder {
    method: Method,
    path: String,
    query: Params,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestBuilder {
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key, value);
        self
    }

    pub fn query_params(mut self, params: Params) -> Self {
        self.query.extend_from(&params);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.append(name.clone(), value.clone());
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        let request_id = request_id_from(&self.headers);
        Request {
            method: self.method,
            path: self.path,
            query: self.query,
            headers: self.headers,
            body: self.body,
            params: Params::new(),
            request_id,
        }
    }
}
