//! Shell hash parsing and construction.
//!
//! Grammar: `#SemanticObject-action[~context][?params][&/app-route]`.

use crate::error::{ResolveError, Result};
use crate::model::Intent;
use crate::params::{parse_query, Params};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RE_SHELL_HASH: Regex =
        Regex::new(r"^([A-Za-z0-9_/*]+)-([A-Za-z0-9_/*.\-]+)(?:~([^?]*))?(?:\?(.*))?$").unwrap();
}

/// Ensure a hash fragment starts with `#`
pub fn fix_hash_fragment(hash: &str) -> String {
    if hash.starts_with('#') {
        hash.to_string()
    } else {
        format!("#{}", hash)
    }
}

/// Parse a hash fragment into an intent. The form factor is left unset.
pub fn parse_shell_hash(hash: &str) -> Result<Intent> {
    let body = hash.strip_prefix('#').unwrap_or(hash);
    let (main, route) = match body.find("&/") {
        Some(i) => (&body[..i], Some(body[i + 2..].to_string())),
        None => (body, None),
    };

    let caps = RE_SHELL_HASH
        .captures(main)
        .ok_or_else(|| ResolveError::Parse(hash.to_string()))?;

    let params = caps
        .get(4)
        .map(|m| parse_query(m.as_str()))
        .unwrap_or_default();

    Ok(Intent {
        semantic_object: caps[1].to_string(),
        action: caps[2].to_string(),
        context_raw: caps.get(3).map(|m| m.as_str().to_string()),
        form_factor: None,
        params,
        app_specific_route: route,
    })
}

/// Build `#SO-action[?params]`
pub fn construct_shell_hash(semantic_object: &str, action: &str, params: &Params) -> String {
    let query = params.to_query_string();
    if query.is_empty() {
        format!("#{}-{}", semantic_object, action)
    } else {
        format!("#{}-{}?{}", semantic_object, action, query)
    }
}
