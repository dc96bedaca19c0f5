//! Ordered multi-valued parameter map and the component escaping used whenever
//! parameters are serialized into a URL.
//!
//! Names are kept in lexicographic order so every serialization of the same map
//! is byte-identical. Component escaping percent-encodes everything except the
//! RFC 3986 unreserved characters `A-Z a-z 0-9 - _ . ~`.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Parameter name/value pairs, each name carrying one or more values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Vec<String>>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Vec<String>> {
        self.0.get(name)
    }

    /// First value of a parameter, the form most consumers care about
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) -> Option<Vec<String>> {
        self.0.insert(name.into(), values)
    }

    /// Replace all values of `name` with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), vec![value.into()]);
    }

    /// Append a value, keeping existing ones
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.0.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &[String]) -> bool) {
        self.0.retain(|k, v| keep(k, v));
    }

    /// Standard query string: `a=1&b=2`, names and values component-escaped
    pub fn to_query_string(&self) -> String {
        self.join_with("&", "=")
    }

    /// Serialize with custom delimiters; delimiters are inserted verbatim.
    pub fn join_with(&self, delimiter: &str, assign: &str) -> String {
        self.0
            .iter()
            .flat_map(|(name, values)| {
                values
                    .iter()
                    .map(move |value| format!("{}{}{}", encode_component(name), assign, encode_component(value)))
            })
            .collect::<Vec<_>>()
            .join(delimiter)
    }
}

impl FromIterator<(String, Vec<String>)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Params(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Params {
    type Item = (String, Vec<String>);
    type IntoIter = btree_map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Percent-encode a single URL component
pub fn encode_component(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Percent-decode a URL component; undecodable input is returned unchanged.
pub fn decode_component(s: &str) -> String {
    urlencoding::decode(s)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| s.to_string())
}

/// Parse `a=1&b=2&a=3` into a parameter map. A name without `=` gets an empty value.
pub fn parse_query(query: &str) -> Params {
    let mut params = Params::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.push(decode_component(name), decode_component(value));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_is_sorted_and_escaped() {
        let mut params = Params::new();
        params.set("B", "x y");
        params.set("A", "1");
        params.push("A", "2");
        assert_eq!(params.to_query_string(), "A=1&A=2&B=x%20y");
    }

    #[test]
    fn test_join_with_keeps_delimiters_verbatim() {
        let mut params = Params::new();
        params.set("P1", "V=1");
        params.set("P2", "V2");
        assert_eq!(params.join_with("%3b", "%3d"), "P1%3dV%3D1%3bP2%3dV2");
    }

    #[test]
    fn test_parse_query_accumulates_values() {
        let params = parse_query("A=1&B=%5B%22x%22%5D&A=2&flag");
        assert_eq!(params.get("A").unwrap(), &vec!["1".to_string(), "2".to_string()]);
        assert_eq!(params.first("B"), Some("[\"x\"]"));
        assert_eq!(params.first("flag"), Some(""));
    }
}
