//! HTTP methods and method sets.
//!
//! Covers RFC 9110 standard methods, WebDAV extensions (RFC 4918 / 4791 / 3253 / 5323),
//! and `PURGE` used by nginx and Varnish for cache invalidation.
//!
//! Unknown method strings never become a [`Request`](crate::Request): the
//! server answers them with a `405` error envelope listing the methods the
//! path does serve, or `404` if it serves none.
//!
//! Routes accept a [`MethodSet`], built by or-ing methods together:
//!
//! ```rust
//! use trellis::{Method, MethodSet};
//!
//! let set: MethodSet = Method::Get | Method::Post;
//! assert!(set.contains(Method::Post));
//! assert!(!set.contains(Method::Delete));
//! assert_eq!(set.to_string(), "GET|POST");
//! ```

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// A known HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    // RFC 9110 ─────────────────────────────────────────────────────────────────
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
    // WebDAV RFC 4918 ──────────────────────────────────────────────────────────
    Copy,
    Lock,
    Mkcol,
    Move,
    Propfind,
    Proppatch,
    Unlock,
    // WebDAV extensions ────────────────────────────────────────────────────────
    Mkcalendar, // RFC 4791 — CalDAV
    Report,     // RFC 3253
    Search,     // RFC 5323
    // Cache invalidation ───────────────────────────────────────────────────────
    Purge, // nginx / Varnish
}

impl Method {
    /// Every known method, in declaration order.
    pub const ALL: [Method; 20] = [
        Self::Connect,
        Self::Delete,
        Self::Get,
        Self::Head,
        Self::Options,
        Self::Patch,
        Self::Post,
        Self::Put,
        Self::Trace,
        Self::Copy,
        Self::Lock,
        Self::Mkcol,
        Self::Move,
        Self::Propfind,
        Self::Proppatch,
        Self::Unlock,
        Self::Mkcalendar,
        Self::Report,
        Self::Search,
        Self::Purge,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect    => "CONNECT",
            Self::Copy       => "COPY",
            Self::Delete     => "DELETE",
            Self::Get        => "GET",
            Self::Head       => "HEAD",
            Self::Lock       => "LOCK",
            Self::Mkcalendar => "MKCALENDAR",
            Self::Mkcol      => "MKCOL",
            Self::Move       => "MOVE",
            Self::Options    => "OPTIONS",
            Self::Patch      => "PATCH",
            Self::Post       => "POST",
            Self::Propfind   => "PROPFIND",
            Self::Proppatch  => "PROPPATCH",
            Self::Purge      => "PURGE",
            Self::Put        => "PUT",
            Self::Report     => "REPORT",
            Self::Search     => "SEARCH",
            Self::Trace      => "TRACE",
            Self::Unlock     => "UNLOCK",
        }
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT"    => Ok(Self::Connect),
            "COPY"       => Ok(Self::Copy),
            "DELETE"     => Ok(Self::Delete),
            "GET"        => Ok(Self::Get),
            "HEAD"       => Ok(Self::Head),
            "LOCK"       => Ok(Self::Lock),
            "MKCALENDAR" => Ok(Self::Mkcalendar),
            "MKCOL"      => Ok(Self::Mkcol),
            "MOVE"       => Ok(Self::Move),
            "OPTIONS"    => Ok(Self::Options),
            "PATCH"      => Ok(Self::Patch),
            "POST"       => Ok(Self::Post),
            "PROPFIND"   => Ok(Self::Propfind),
            "PROPPATCH"  => Ok(Self::Proppatch),
            "PURGE"      => Ok(Self::Purge),
            "PUT"        => Ok(Self::Put),
            "REPORT"     => Ok(Self::Report),
            "SEARCH"     => Ok(Self::Search),
            "TRACE"      => Ok(Self::Trace),
            "UNLOCK"     => Ok(Self::Unlock),
            _            => Err(()),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl From<Method> for http::Method {
    fn from(m: Method) -> Self {
        // Every variant is a valid token, so this never falls through.
        http::Method::from_bytes(m.as_str().as_bytes()).unwrap_or(http::Method::GET)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── MethodSet ─────────────────────────────────────────────────────────────────

/// A set of methods a route answers to. One bit per [`Method`] variant.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct MethodSet(u32);

impl MethodSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, method: Method) -> bool {
        self.0 & method.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, method: Method) {
        self.0 |= method.bit();
    }

    /// Members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Method> {
        Method::ALL.into_iter().filter(move |m| self.contains(*m))
    }

    /// Lowest member in declaration order, used when a single method is
    /// needed to address the route.
    pub fn first(self) -> Option<Method> {
        self.iter().next()
    }
}

impl From<Method> for MethodSet {
    fn from(m: Method) -> Self {
        Self(m.bit())
    }
}

impl BitOr for Method {
    type Output = MethodSet;

    fn bitor(self, rhs: Method) -> MethodSet {
        MethodSet(self.bit() | rhs.bit())
    }
}

impl BitOr<Method> for MethodSet {
    type Output = MethodSet;

    fn bitor(self, rhs: Method) -> MethodSet {
        MethodSet(self.0 | rhs.bit())
    }
}

impl BitOr for MethodSet {
    type Output = MethodSet;

    fn bitor(self, rhs: MethodSet) -> MethodSet {
        MethodSet(self.0 | rhs.0)
    }
}

impl FromIterator<Method> for MethodSet {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        let mut set = Self::empty();
        for m in iter {
            set.insert(m);
        }
        set
    }
}

/// `GET|POST`, as printed in self-test transcripts.
impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, m) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(m.as_str())?;
        }
        Ok(())
    }
}

impl fmt::Debug for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
