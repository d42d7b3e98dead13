//! Path patterns and the route table.
//!
//! Patterns are `/`-separated segments; a segment written `{name}` is a
//! placeholder that matches any non-empty segment and binds it under `name`.
//! Lookup is a linear scan in registration order: the first route whose
//! pattern matches the path and whose method set contains the method wins.
//! Build the table once at startup; it is read-only afterwards.
//!
//! Each path segment is percent-decoded before it is compared or bound, so an
//! encoded `/` (`%2F`) stays inside its segment. A segment that does not
//! decode to UTF-8 matches nothing.

use percent_encoding::percent_decode_str;

use crate::error::RouteError;
use crate::method::{Method, MethodSet};
use crate::params::Params;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed, validated path pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        if !raw.starts_with('/') {
            return Err(RouteError::NotAbsolute(raw.to_owned()));
        }

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();
        for seg in raw.split('/') {
            if !seg.contains(['{', '}']) {
                segments.push(Segment::Literal(seg.to_owned()));
                continue;
            }
            let name = seg
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .filter(|n| !n.is_empty() && !n.contains(['{', '}']))
                .ok_or_else(|| RouteError::MalformedPlaceholder {
                    path: raw.to_owned(),
                    segment: seg.to_owned(),
                })?;
            if names.contains(&name) {
                return Err(RouteError::DuplicatePlaceholder {
                    path: raw.to_owned(),
                    name: name.to_owned(),
                });
            }
            names.push(name);
            segments.push(Segment::Placeholder(name.to_owned()));
        }

        Ok(Self { raw: raw.to_owned(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(n) => Some(n.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Matches `path` segment by segment, returning the bound placeholders
    /// decoded.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::new();
        let mut parts = path.split('/');
        for seg in &self.segments {
            let part = percent_decode_str(parts.next()?).decode_utf8().ok()?;
            match seg {
                Segment::Literal(lit) if *lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Placeholder(_) if part.is_empty() => return None,
                Segment::Placeholder(name) => params.insert(name.as_str(), part),
            }
        }
        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

/// Substitutes `{name}` placeholders with values from `params`.
///
/// Placeholders without a binding are left verbatim, so partial substitution
/// is legal. Applying it twice with the same params gives the same result as
/// once (provided no bound value itself contains `{…}`).
///
/// ```rust
/// use trellis::{Params, format_path};
///
/// let params = Params::from([("bar", "baz"), ("baz", "foo")]);
/// assert_eq!(format_path("/foo/{bar}", &params), "/foo/baz");
/// assert_eq!(format_path("/foo/{biz}", &params), "/foo/{biz}");
/// assert_eq!(format_path("/foo/{bar}", &Params::new()), "/foo/{bar}");
/// ```
pub fn format_path(pattern: &str, params: &Params) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        let close = open + len;
        out.push_str(&rest[..open]);
        match params.get(&rest[open + 1..close]) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..=close]),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

// ── RouteTable ────────────────────────────────────────────────────────────────

/// Result of [`RouteTable::resolve`].
#[derive(Debug)]
pub enum Resolution<'a, T> {
    Found(&'a T, Params),
    NotFound,
    /// The path exists but not for this method. Carries every method the path
    /// does answer to.
    MethodNotAllowed(MethodSet),
}

struct Entry<T> {
    pattern: Pattern,
    methods: MethodSet,
    value: T,
}

/// Ordered list of (pattern, methods, value) entries.
pub struct RouteTable<T> {
    entries: Vec<Entry<T>>,
}

impl<T> RouteTable<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Appends a route. Later registrations lose ties to earlier ones.
    pub fn insert(&mut self, pattern: &str, methods: MethodSet, value: T) -> Result<(), RouteError> {
        if methods.is_empty() {
            return Err(RouteError::NoMethods(pattern.to_owned()));
        }
        let pattern = Pattern::parse(pattern)?;
        self.entries.push(Entry { pattern, methods, value });
        Ok(())
    }

    pub fn resolve(&self, method: Method, path: &str) -> Resolution<'_, T> {
        let mut allowed = MethodSet::empty();
        for entry in &self.entries {
            let Some(params) = entry.pattern.matches(path) else {
                continue;
            };
            if entry.methods.contains(method) {
                return Resolution::Found(&entry.value, params);
            }
            allowed = allowed | entry.methods;
        }
        if allowed.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed(allowed)
        }
    }

    /// Every method some route serves for `path`.
    pub fn allowed(&self, path: &str) -> MethodSet {
        self.entries
            .iter()
            .filter(|e| e.pattern.matches(path).is_some())
            .fold(MethodSet::empty(), |acc, e| acc | e.methods)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable<&'static str> {
        let mut t = RouteTable::new();
        t.insert("/users/{id}", Method::Get.into(), "get-user").unwrap();
        t.insert("/users/me", Method::Get.into(), "me").unwrap();
        t.insert("/users/{id}", Method::Delete.into(), "delete-user").unwrap();
        t.insert("/users/{id}/posts/{post}", Method::Get | Method::Head, "post").unwrap();
        t.insert("/health", Method::Get.into(), "health").unwrap();
        t
    }

    #[test]
    fn resolves_and_binds() {
        let t = table();
        match t.resolve(Method::Get, "/users/42/posts/7") {
            Resolution::Found(v, p) => {
                assert_eq!(*v, "post");
                assert_eq!(p.get("id"), Some("42"));
                assert_eq!(p.get("post"), Some("7"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn registration_order_breaks_ties() {
        // `/users/{id}` was registered before the literal `/users/me`.
        match table().resolve(Method::Get, "/users/me") {
            Resolution::Found(v, p) => {
                assert_eq!(*v, "get-user");
                assert_eq!(p.get("id"), Some("me"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn later_route_can_serve_another_method() {
        match table().resolve(Method::Delete, "/users/42") {
            Resolution::Found(v, _) => assert_eq!(*v, "delete-user"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn method_not_allowed_vs_not_found() {
        let t = table();
        match t.resolve(Method::Post, "/users/42") {
            Resolution::MethodNotAllowed(allowed) => {
                assert_eq!(allowed, Method::Get | Method::Delete);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(t.resolve(Method::Get, "/nope"), Resolution::NotFound));
        // placeholders never match empty segments
        assert!(matches!(t.resolve(Method::Get, "/users/"), Resolution::NotFound));
        assert!(matches!(t.resolve(Method::Get, "/health/extra"), Resolution::NotFound));
    }

    #[test]
    fn allowed_methods_for_path() {
        let t = table();
        assert_eq!(t.allowed("/users/42"), Method::Get | Method::Delete);
        assert_eq!(t.allowed("/users/1/posts/2"), Method::Get | Method::Head);
        assert!(t.allowed("/nope").is_empty());
    }

    #[test]
    fn segments_are_percent_decoded() {
        let t = table();
        match t.resolve(Method::Get, "/users/a%20b%2Fc") {
            Resolution::Found(v, p) => {
                assert_eq!(*v, "get-user");
                assert_eq!(p.get("id"), Some("a b/c"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match t.resolve(Method::Get, "/%68ealth") {
            Resolution::Found(v, _) => assert_eq!(*v, "health"),
            other => panic!("unexpected {other:?}"),
        }
        // %FF is not UTF-8
        assert!(matches!(t.resolve(Method::Get, "/users/%FF"), Resolution::NotFound));
    }

    #[test]
    fn rejects_bad_patterns() {
        let mut t = RouteTable::new();
        assert!(matches!(t.insert("/a", MethodSet::empty(), ()), Err(RouteError::NoMethods(_))));
        assert!(matches!(t.insert("a/b", Method::Get.into(), ()), Err(RouteError::NotAbsolute(_))));
        assert!(matches!(
            t.insert("/a/{x}/{x}", Method::Get.into(), ()),
            Err(RouteError::DuplicatePlaceholder { .. })
        ));
        assert!(matches!(
            t.insert("/a/pre{x}", Method::Get.into(), ()),
            Err(RouteError::MalformedPlaceholder { .. })
        ));
        assert!(matches!(
            t.insert("/a/{}", Method::Get.into(), ()),
            Err(RouteError::MalformedPlaceholder { .. })
        ));
        assert!(t.is_empty());
    }

    #[test]
    fn placeholder_names() {
        let p = Pattern::parse("/a/{x}/b/{y}").unwrap();
        assert_eq!(p.placeholders().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(p.as_str(), "/a/{x}/b/{y}");
    }

    #[test]
    fn format_path_partial_and_idempotent() {
        let params = Params::from([("bar", "baz"), ("baz", "foo")]);
        let cases = [
            ("/foo/{bar}", "/foo/baz"),
            ("/foo/{biz}", "/foo/{biz}"),
            ("/foo/{bar}/x/{biz}", "/foo/baz/x/{biz}"),
            ("/plain", "/plain"),
            ("/open/{bar", "/open/{bar"),
        ];
        for (pattern, expected) in cases {
            let once = format_path(pattern, &params);
            assert_eq!(once, expected, "pattern {pattern}");
            assert_eq!(format_path(&once, &params), once, "pattern {pattern}");
        }
        assert_eq!(format_path("/foo/{bar}", &Params::new()), "/foo/{bar}");
    }
}
