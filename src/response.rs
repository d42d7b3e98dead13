//! Outgoing HTTP response, doubling as the response sink middleware and
//! handlers write into.
//!
//! Middleware adds headers, handlers may write body bytes directly, and the
//! dispatcher finally hands the value to a [`Renderer`](crate::Renderer).
//! Writes are append-only unless stated otherwise, so output from several
//! chain steps lands in execution order.

use std::fmt;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types the built-in renderers emit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Javascript, // application/javascript  (JSONP)
    Json,       // application/json
    Text,       // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Javascript => "application/javascript",
            Self::Json       => "application/json",
            Self::Text       => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response under construction.
///
/// ```rust
/// use std::fmt::Write;
/// use trellis::Response;
///
/// let mut res = Response::new();
/// write!(res, "mw1,").unwrap();
/// res.write(b"mw2");
/// res.append_header("x-middleware-message", "first").unwrap();
/// assert_eq!(res.body(), b"mw1,mw2");
/// assert_eq!(res.status().as_u16(), 200);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plain-text response with a single line body.
    pub fn plain(status: StatusCode, line: &str) -> Self {
        let mut res = Self::new();
        res.set_status(status);
        res.set_content_type(ContentType::Text);
        res.write(line.as_bytes());
        res.write(b"\n");
        res
    }

    /// Current status; `200 OK` until someone sets another.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of `name`, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of `name`, in insertion order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Adds a header value, keeping existing values of the same name.
    pub fn append_header<K, V>(&mut self, name: K, value: V) -> Result<(), Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let (name, value) = header_pair(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Sets a header, replacing existing values of the same name.
    pub fn insert_header<K, V>(&mut self, name: K, value: V) -> Result<(), Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let (name, value) = header_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
    }

    /// Appends raw bytes to the body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub(crate) fn clear_body(&mut self) {
        self.body.clear();
    }

    /// Converts into the type hyper sends on the wire.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *res.headers_mut() = self.headers;
        res
    }
}

impl fmt::Write for Response {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}

fn header_pair<K, V>(name: K, value: V) -> Result<(HeaderName, HeaderValue), Error>
where
    HeaderName: TryFrom<K>,
    <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
    HeaderValue: TryFrom<V>,
    <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
{
    let name = HeaderName::try_from(name).map_err(|e| Error::from(e.into()))?;
    let value = HeaderValue::try_from(value).map_err(|e| Error::from(e.into()))?;
    Ok((name, value))
}
