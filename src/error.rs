//! Error taxonomy.
//!
//! Every error raised by a handler or middleware is an [`Error`] carrying an
//! [`ErrorCode`]. The dispatcher is the only place a code is turned into an
//! HTTP status; nothing below it looks at statuses.
//!
//! Infrastructure failures (bad route patterns, bind errors, config parsing)
//! have their own enums at the bottom of this file.

use std::fmt;

use http::StatusCode;
use serde::{Serialize, Serializer};

// ── ErrorCode ─────────────────────────────────────────────────────────────────

/// Semantic category of an [`Error`].
///
/// The integer values are part of the wire format: they appear as
/// `errorCode` in rendered error envelopes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCode {
    /// Success marker. Only used in envelopes, never carried by an `Error`
    /// created through the public constructors.
    Ok,
    GeneralFailure,
    Unauthorized,
    InsecureAccessDenied,
    NotFound,
    MethodNotAllowed,
    BadRequest,
    /// The handler already wrote the full response. The dispatcher must not
    /// touch it.
    Hijacked,
}

impl ErrorCode {
    /// Wire value (`errorCode` in envelopes).
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ok                   => 1,
            Self::GeneralFailure       => -1,
            Self::Unauthorized         => -9,
            Self::InsecureAccessDenied => -10,
            Self::NotFound             => -12,
            Self::MethodNotAllowed     => -13,
            Self::BadRequest           => -14,
            Self::Hijacked             => -20,
        }
    }

    /// Transport status for this code. `None` for [`ErrorCode::Hijacked`]:
    /// the response has already been written.
    pub fn http_status(self) -> Option<StatusCode> {
        match self {
            Self::Ok                   => Some(StatusCode::OK),
            Self::GeneralFailure       => Some(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Unauthorized         => Some(StatusCode::UNAUTHORIZED),
            Self::InsecureAccessDenied => Some(StatusCode::FORBIDDEN),
            Self::NotFound             => Some(StatusCode::NOT_FOUND),
            Self::MethodNotAllowed     => Some(StatusCode::METHOD_NOT_ALLOWED),
            Self::BadRequest           => Some(StatusCode::BAD_REQUEST),
            Self::Hijacked             => None,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// An error returned from a handler or middleware.
///
/// ```rust
/// use trellis::{Error, ErrorCode, errorf};
///
/// let e = Error::new("wat");
/// assert_eq!(e.code(), ErrorCode::GeneralFailure);
///
/// let e = Error::with_code("who are you", ErrorCode::Unauthorized);
/// assert_eq!(e.status().map(|s| s.as_u16()), Some(401));
///
/// let e = errorf!("word {}", "dawg");
/// assert_eq!(e.message(), "word dawg");
/// ```
#[derive(Debug)]
pub struct Error {
    code: ErrorCode,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// A [`ErrorCode::GeneralFailure`] error.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(message, ErrorCode::GeneralFailure)
    }

    pub fn with_code(message: impl Into<String>, code: ErrorCode) -> Self {
        Self { code, message: message.into(), source: None }
    }

    /// The sentinel returned by handlers that wrote the whole response
    /// themselves.
    pub fn hijacked() -> Self {
        Self::with_code("response hijacked", ErrorCode::Hijacked)
    }

    /// Attaches the underlying cause.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.code.http_status()
    }

    pub fn is_hijacked(&self) -> bool {
        self.code == ErrorCode::Hijacked
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("json: {e}")).with_source(e)
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Self::new(format!("http: {e}")).with_source(e)
    }
}

/// Reports whether `err` is a trellis [`Error`] carrying
/// [`ErrorCode::Hijacked`].
///
/// `None` and foreign error types are never hijacked.
pub fn is_hijacked(err: Option<&(dyn std::error::Error + 'static)>) -> bool {
    err.and_then(|e| e.downcast_ref::<Error>())
        .is_some_and(Error::is_hijacked)
}

/// Builds a [`ErrorCode::GeneralFailure`] error from a format string.
#[macro_export]
macro_rules! errorf {
    ($($arg:tt)*) => {
        $crate::Error::new(::std::format!($($arg)*))
    };
}

// ── Infrastructure errors ─────────────────────────────────────────────────────

/// A route pattern or method set rejected at registration time.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route `{0}` must start with `/`")]
    NotAbsolute(String),

    #[error("route `{0}` declares no methods")]
    NoMethods(String),

    #[error("route `{path}`: malformed placeholder segment `{segment}`")]
    MalformedPlaceholder { path: String, segment: String },

    #[error("route `{path}`: placeholder `{name}` declared twice")]
    DuplicatePlaceholder { path: String, name: String },
}

/// Failure while freezing a [`Registry`](crate::Registry) into a dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("API root `{0}` registered twice")]
    DuplicateApi(String),

    #[error("API `{api}`: {source}")]
    Route {
        api: String,
        #[source]
        source: RouteError,
    },
}

/// Server configuration could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid listen address `{0}`")]
    Listen(String),
}

/// Infrastructure failure while serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
