//! Named string parameters: path placeholders, query strings, form bodies.

use std::collections::HashMap;
use std::collections::hash_map;

/// A name → value mapping for one request.
///
/// ```rust
/// use trellis::Params;
///
/// let p = Params::from([("foo", "f"), ("bar", "b")]);
/// assert_eq!(p.get("foo"), Some("f"));
/// assert_eq!(p.get("baz"), None);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Sets `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every entry of `other` into `self`; `other` wins on conflicts.
    pub fn extend_from(&mut self, other: &Params) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }

    /// Decodes `application/x-www-form-urlencoded` bytes (a query string or a
    /// form body). Repeated keys keep their first value.
    pub fn from_urlencoded(input: &[u8]) -> Self {
        let mut out = HashMap::new();
        for (k, v) in url::form_urlencoded::parse(input).into_owned() {
            out.entry(k).or_insert(v);
        }
        Self(out)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl IntoIterator for Params {
    type Item = (String, String);
    type IntoIter = hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
