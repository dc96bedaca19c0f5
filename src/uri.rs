//! Minimal URI model used for system alias surgery.
//!
//! Components are kept verbatim (already escaped), so a parsed URI serializes
//! back to exactly the input. Relative URIs have an empty protocol and host.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref RE_URI: Regex = Regex::new(
        r"^(?:([A-Za-z][A-Za-z0-9+.\-]*):)?(?://(\[[^\]]*\]|[^/?#:]*)(:([0-9]*))?)?([^?#]*)(?:\?([^#]*))?(?:#(.*))?$"
    )
    .unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uri {
    pub protocol: String,
    pub host: String,
    pub port: String,
    pub path: String,
    /// Query without the leading `?`
    pub query: String,
    /// Fragment without the leading `#`
    pub fragment: String,
    /// `host:` was written without a port
    empty_port: bool,
}

impl Uri {
    pub fn parse(s: &str) -> Self {
        match RE_URI.captures(s) {
            Some(caps) => {
                let part = |i: usize| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default();
                Uri {
                    protocol: part(1),
                    host: part(2),
                    port: part(4),
                    path: part(5),
                    query: part(6),
                    fragment: part(7),
                    empty_port: caps.get(3).is_some_and(|m| m.as_str() == ":"),
                }
            }
            None => Uri {
                path: s.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn is_absolute(&self) -> bool {
        !self.protocol.is_empty()
    }

    /// Replace host and port; an empty port is omitted on output
    pub fn set_authority(&mut self, host: impl Into<String>, port: impl Into<String>) {
        self.host = host.into();
        self.port = port.into();
        self.empty_port = false;
    }

    /// Make the URI relative to its server
    pub fn clear_authority(&mut self) {
        self.protocol.clear();
        self.set_authority("", "");
    }

    /// Drop query parameters by (case-insensitive) name
    pub fn remove_query_params(&mut self, names: &[&str]) {
        self.query = self
            .query
            .split('&')
            .filter(|p| {
                let name = p.split('=').next().unwrap_or("").to_lowercase();
                !p.is_empty() && !names.contains(&name.as_str())
            })
            .collect::<Vec<_>>()
            .join("&");
    }

    /// Append an already-serialized query fragment
    pub fn append_query(&mut self, params: &str) {
        if params.is_empty() {
            return;
        }
        if self.query.is_empty() {
            self.query = params.to_string();
        } else {
            self.query = format!("{}&{}", self.query, params);
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.protocol.is_empty() {
            write!(f, "{}:", self.protocol)?;
        }
        if !self.host.is_empty() {
            write!(f, "//{}", self.host)?;
            if !self.port.is_empty() || self.empty_port {
                write!(f, ":{}", self.port)?;
            }
        }
        f.write_str(&self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

/// Append a query string to a URL, keeping any `#fragment` at the end.
pub fn append_params_to_url(url: &str, params: &str) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let (base, fragment) = match url.find('#') {
        Some(i) => (&url[..i], &url[i..]),
        None => (url, ""),
    };
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}{}", base, separator, params, fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let uri = Uri::parse("https://example.corp:44335/sap/bc/ui2/nwbc/~canvas;window=app/wda/WD1/?a=1#top");
        assert_eq!(uri.protocol, "https");
        assert_eq!(uri.host, "example.corp");
        assert_eq!(uri.port, "44335");
        assert_eq!(uri.path, "/sap/bc/ui2/nwbc/~canvas;window=app/wda/WD1/");
        assert_eq!(uri.query, "a=1");
        assert_eq!(uri.fragment, "top");
        assert_eq!(
            uri.to_string(),
            "https://example.corp:44335/sap/bc/ui2/nwbc/~canvas;window=app/wda/WD1/?a=1#top"
        );
    }

    #[test]
    fn test_parse_relative_round_trips() {
        let s = "/gui/sap/its/webgui?%7etransaction=SU01&%7enosplash=1";
        let uri = Uri::parse(s);
        assert!(!uri.is_absolute());
        assert_eq!(uri.query, "%7etransaction=SU01&%7enosplash=1");
        assert_eq!(uri.to_string(), s);
    }

    #[test]
    fn test_bracketed_host_round_trips() {
        let s = "https://[::1]:44355/sap/bc/app?x=1";
        let uri = Uri::parse(s);
        assert_eq!(uri.host, "[::1]");
        assert_eq!(uri.port, "44355");
        assert_eq!(uri.path, "/sap/bc/app");
        assert_eq!(uri.to_string(), s);
    }

    #[test]
    fn test_empty_port_round_trips() {
        let s = "http://backend.corp:/sap/bc/gui?a=1";
        let uri = Uri::parse(s);
        assert_eq!(uri.host, "backend.corp");
        assert_eq!(uri.port, "");
        assert_eq!(uri.to_string(), s);

        let mut moved = uri.clone();
        moved.set_authority("other.corp", "");
        assert_eq!(moved.to_string(), "http://other.corp/sap/bc/gui?a=1");
        moved.clear_authority();
        assert_eq!(moved.to_string(), "/sap/bc/gui?a=1");
    }

    #[test]
    fn test_remove_query_params_is_case_insensitive_on_name() {
        let mut uri = Uri::parse("/x?a=1&sap-client=120&sap-language=EN&b=2");
        uri.remove_query_params(&["sap-client", "sap-language"]);
        assert_eq!(uri.query, "a=1&b=2");
    }

    #[test]
    fn test_append_params_before_fragment() {
        assert_eq!(append_params_to_url("http://a/b#frag", "x=1"), "http://a/b?x=1#frag");
        assert_eq!(append_params_to_url("http://a/b?y=2", "x=1"), "http://a/b?y=2&x=1");
        assert_eq!(append_params_to_url("http://a/b", ""), "http://a/b");
    }
}
