//! Transactions hosted by the business client canvas (`/~canvas;` URLs).
//!
//! Unwrapped transactions receive their parameters as a plain query string.
//! Wrapped transactions (`APB_LPD_CALL_*`) receive them through the `P_OBJECT`
//! parameter chain, see [`inject_into_pobject_param`].

use super::{
    remove_all, result_from_template, semantics_of, take_sap_system, template_of, unnecessary_webgui_parameters,
    ConstructContext,
};
use crate::error::Result;
use crate::mapper::MatchingTarget;
use crate::model::{ApplicationType, ResolutionResult, SystemAliasSemantics};
use crate::params::{decode_component, encode_component, Params};
use crate::system_alias::UriType;
use crate::uri::Uri;

/// Maximum length of one `P_OBJECT`/`P_OBJx` value before encoding
pub const MAX_GUI_PARAM_LENGTH: usize = 132;

/// Escaped `%`, separating parameters inside `P_OBJECT`
pub const POBJECT_PARAM_DELIMITER: &str = "%25";

/// Escaped `!`, separating name and value inside `P_OBJECT`
pub const POBJECT_ASSIGN_DELIMITER: &str = "%21";

const POBJECT_PARAM: &str = "P_OBJECT";

/// Result of rewriting the parameter named by `amend_gui_param`
struct Amended {
    found: bool,
    query: String,
}

/// Replace every `name<assign>...` entry of a `delimiter`-separated query by `amend(entry)`
fn amend_gui_param(
    name: &str,
    query: &str,
    delimiter: &str,
    assign: &str,
    mut amend: impl FnMut(&str) -> String,
) -> Amended {
    let prefix = format!("{}{}", name, assign);
    let mut found = false;
    let query = query
        .split(delimiter)
        .map(|entry| {
            if entry.starts_with(&prefix) {
                found = true;
                amend(entry)
            } else {
                entry.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(delimiter);
    Amended { found, query }
}

/// Raw value of the last `name<assign>value` entry of a `delimiter`-separated query
fn gui_param_value<'a>(name: &str, query: &'a str, delimiter: &str, assign: &str) -> Option<&'a str> {
    let prefix = format!("{}{}", name, assign);
    query
        .split(delimiter)
        .filter_map(|entry| entry.strip_prefix(prefix.as_str()))
        .last()
}

/// Fold `params` into the `P_OBJECT` parameter of `query`.
///
/// Parameters are serialized as `name%21value` joined by `%25` and appended to
/// any value `P_OBJECT` already holds. The result is cut into chunks of
/// [`MAX_GUI_PARAM_LENGTH`] characters, each component-escaped once more: the
/// first chunk becomes `P_OBJECT`, the following ones `P_OBJ1`, `P_OBJ2`, ...
/// The `P_OBJx` entries precede `P_OBJECT`.
pub fn inject_into_pobject_param(query: &str, params: &Params, delimiter: &str, assign: &str) -> String {
    let to_inject = params.join_with(POBJECT_PARAM_DELIMITER, POBJECT_ASSIGN_DELIMITER);
    if to_inject.is_empty() {
        return query.to_string();
    }

    let mut existing = gui_param_value(POBJECT_PARAM, query, delimiter, assign)
        .map(decode_component)
        .unwrap_or_default();
    if !existing.is_empty() {
        existing.push_str(POBJECT_PARAM_DELIMITER);
    }
    let to_inject = format!("{}{}", existing, to_inject);

    let chars: Vec<char> = to_inject.chars().collect();
    let mut pobject = String::new();
    let mut pobj_x: Vec<String> = Vec::new();
    for (i, chunk) in chars.chunks(MAX_GUI_PARAM_LENGTH).enumerate() {
        let encoded = encode_component(&chunk.iter().collect::<String>());
        if i == 0 {
            pobject = format!("{}{}{}", POBJECT_PARAM, assign, encoded);
        } else {
            pobj_x.push(format!("P_OBJ{}{}{}", i, assign, encoded));
        }
    }
    let injected = pobj_x
        .into_iter()
        .chain(std::iter::once(pobject))
        .collect::<Vec<_>>()
        .join(delimiter);

    let amended = amend_gui_param(POBJECT_PARAM, query, delimiter, assign, |_| injected.clone());
    if amended.found {
        amended.query
    } else if query.is_empty() {
        injected
    } else {
        format!("{}{}{}", query, delimiter, injected)
    }
}

async fn splice_template(
    target: &MatchingTarget,
    ctx: &ConstructContext<'_>,
    sap_system: Option<&str>,
    sap_system_src: Option<&str>,
) -> Result<Uri> {
    let template = template_of(target)?;
    ctx.bridge
        .splice(
            Uri::parse(template.url_str()),
            template.system_alias.as_deref(),
            sap_system,
            sap_system_src,
            UriType::Webgui,
            semantics_of(template, SystemAliasSemantics::Applied),
        )
        .await
}

fn finish(target: &MatchingTarget, uri: Uri, sap_system: Option<String>, sap_system_src: Option<String>) -> Result<ResolutionResult> {
    let mut result = result_from_template(template_of(target)?, false);
    result.url = uri.to_string();
    result.text = target.inbound.title.clone();
    result.application_type = Some(ApplicationType::Nwbc);
    result.sap_system = sap_system;
    result.sap_system_src = sap_system_src;
    Ok(result)
}

/// Unwrapped canvas transaction: parameters go to the query string
pub async fn construct_nowrap(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let mut effective = target.mapped_intent_params_plus_simple_defaults.clone();
    let (sap_system, sap_system_src) = take_sap_system(&mut effective);
    let unnecessary = unnecessary_webgui_parameters(&effective, &target.inbound);
    remove_all(&mut effective, &unnecessary);

    let mut uri = splice_template(target, ctx, sap_system.as_deref(), sap_system_src.as_deref()).await?;
    uri.append_query(&effective.to_query_string());
    finish(target, uri, sap_system, sap_system_src)
}

/// Wrapped canvas transaction: parameters go to `P_OBJECT`
pub async fn construct_wrap(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let mut effective = target.mapped_intent_params_plus_simple_defaults.clone();
    let (sap_system, sap_system_src) = take_sap_system(&mut effective);

    let mut uri = splice_template(target, ctx, sap_system.as_deref(), sap_system_src.as_deref()).await?;
    uri.query = inject_into_pobject_param(&uri.query, &effective, "&", "=");
    finish(target, uri, sap_system, sap_system_src)
}
