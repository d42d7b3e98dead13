//! Turning handler results and errors into response bodies.
//!
//! The dispatcher wraps every outcome in an [`Envelope`] and passes it to a
//! [`Renderer`]. The JSON renderer is deliberately asymmetric: a success is
//! written as the bare result value, an error as the envelope object.
//!
//! | outcome | JSON body |
//! |---|---|
//! | `Ok(json!({"foo":"f"}))` | `{"foo":"f"}` |
//! | `Err(Error::new("boom"))` | `{"errorString":"boom","errorCode":-1,"processingTime":0.12,"requestId":"…"}` |

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, ErrorCode};
use crate::request::Request;
use crate::response::{ContentType, Response};

/// Query parameter that switches successful JSON responses to JSONP.
pub const CALLBACK_PARAM: &str = "callback";

/// Everything a renderer may need about one outcome.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub error_string: String,
    pub error_code: ErrorCode,
    /// Milliseconds spent in the chain.
    pub processing_time: f64,
    pub request_id: String,
    #[serde(rename = "response", skip_serializing_if = "Option::is_none")]
    pub response_object: Option<Value>,
}

impl Envelope {
    pub fn success(value: Value, processing_time: f64, request_id: &str) -> Self {
        Self {
            error_string: "OK".to_owned(),
            error_code: ErrorCode::Ok,
            processing_time,
            request_id: request_id.to_owned(),
            response_object: Some(value),
        }
    }

    pub fn failure(err: &Error, processing_time: f64, request_id: &str) -> Self {
        Self {
            error_string: err.message().to_owned(),
            error_code: err.code(),
            processing_time,
            request_id: request_id.to_owned(),
            response_object: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code == ErrorCode::Ok
    }
}

/// A render failure. Caught by the dispatcher and written as a plain-text
/// line; never propagated further.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Serializes an [`Envelope`] into the response.
pub trait Renderer: Send + Sync + 'static {
    /// Content types this renderer produces, used for negotiation.
    fn content_types(&self) -> &[&'static str];

    fn render(&self, envelope: &Envelope, res: &mut Response, req: &Request) -> Result<(), RenderError>;
}

// ── JSON ──────────────────────────────────────────────────────────────────────

/// `application/json`, with JSONP for successes when `?callback=name` is
/// present.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn content_types(&self) -> &[&'static str] {
        &["application/json", "application/javascript"]
    }

    fn render(&self, envelope: &Envelope, res: &mut Response, req: &Request) -> Result<(), RenderError> {
        if !envelope.is_success() {
            return write_envelope(envelope, res);
        }

        let body = match &envelope.response_object {
            Some(v) => serde_json::to_vec(v)?,
            None => b"null".to_vec(),
        };
        match req.query(CALLBACK_PARAM).filter(|cb| is_callback_name(cb)) {
            Some(cb) => {
                res.set_content_type(ContentType::Javascript);
                res.write(cb.as_bytes());
                res.write(b"(");
                res.write(&body);
                res.write(b")");
            }
            None => {
                res.set_content_type(ContentType::Json);
                res.write(&body);
            }
        }
        Ok(())
    }
}

/// Writes the whole envelope as a JSON object.
pub(crate) fn write_envelope(envelope: &Envelope, res: &mut Response) -> Result<(), RenderError> {
    let body = serde_json::to_vec(envelope)?;
    res.set_content_type(ContentType::Json);
    res.write(&body);
    Ok(())
}

/// Identifier-ish callback names such as `foo`, `jQuery123_cb` or `ns.handler`.
fn is_callback_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 128
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.'))
}

// ── Plain text ────────────────────────────────────────────────────────────────

/// `text/plain` for diagnostic routes. String results are written verbatim,
/// other values as compact JSON, errors as their message line.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn content_types(&self) -> &[&'static str] {
        &["text/plain"]
    }

    fn render(&self, envelope: &Envelope, res: &mut Response, _req: &Request) -> Result<(), RenderError> {
        res.set_content_type(ContentType::Text);
        if !envelope.is_success() {
            res.write(envelope.error_string.as_bytes());
            res.write(b"\n");
            return Ok(());
        }
        match &envelope.response_object {
            Some(Value::String(s)) => res.write(s.as_bytes()),
            Some(Value::Null) | None => {}
            Some(v) => res.write(&serde_json::to_vec(v)?),
        }
        Ok(())
    }
}

// ── Function renderer ─────────────────────────────────────────────────────────

/// Newtype wrapper that turns a closure into a [`Renderer`].
pub struct RenderFn<F> {
    f: F,
    content_types: Vec<&'static str>,
}

impl<F> Renderer for RenderFn<F>
where
    F: Fn(&Envelope, &mut Response, &Request) -> Result<(), RenderError> + Send + Sync + 'static,
{
    fn content_types(&self) -> &[&'static str] {
        &self.content_types
    }

    fn render(&self, envelope: &Envelope, res: &mut Response, req: &Request) -> Result<(), RenderError> {
        (self.f)(envelope, res, req)
    }
}

/// Wraps a closure as a renderer serving `content_types`.
pub fn render_fn<F>(f: F, content_types: &[&'static str]) -> RenderFn<F>
where
    F: Fn(&Envelope, &mut Response, &Request) -> Result<(), RenderError> + Send + Sync + 'static,
{
    RenderFn { f, content_types: content_types.to_vec() }
}

// ── Negotiation ───────────────────────────────────────────────────────────────

/// Picks the renderer for a request.
///
/// Media ranges in `accept` are tried by descending `q` (ties keep header
/// order); the first renderer serving a matching type wins. Without a match,
/// or without the header, the first renderer is used. `None` only when
/// `renderers` is empty.
pub fn negotiate<'r>(renderers: &'r [Arc<dyn Renderer>], accept: Option<&str>) -> Option<&'r dyn Renderer> {
    let first = renderers.first().map(|r| &**r)?;
    let Some(accept) = accept else {
        return Some(first);
    };

    let mut ranges: Vec<(&str, f32)> = accept
        .split(',')
        .filter_map(|part| {
            let mut it = part.split(';');
            let range = it.next()?.trim();
            if range.is_empty() {
                return None;
            }
            let q = it
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((range, q))
        })
        .filter(|(_, q)| *q > 0.0)
        .collect();
    ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (range, _) in ranges {
        for r in renderers {
            if r.content_types().iter().any(|ct| media_matches(range, ct)) {
                return Some(&**r);
            }
        }
    }
    Some(first)
}

fn media_matches(range: &str, content_type: &str) -> bool {
    if range == "*/*" {
        return true;
    }
    match range.strip_suffix("/*") {
        Some(major) => content_type
            .split('/')
            .next()
            .is_some_and(|m| m.eq_ignore_ascii_case(major)),
        None => range.eq_ignore_ascii_case(content_type),
    }
}

/// Last-resort output when rendering itself failed: a plain-text line with
/// status 500. Whatever the failed renderer may have written is discarded.
pub fn write_error(res: &mut Response, message: &str) {
    res.clear_body();
    res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    res.set_content_type(ContentType::Text);
    res.write(message.as_bytes());
    res.write(b"\n");
}
