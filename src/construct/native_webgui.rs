//! Transactions started through the native web GUI (`/its/webgui` URLs).
//!
//! Business parameters travel inside the `~transaction` query parameter:
//! `~transaction=*TCODE P1=V1;P2=V2`, escaped as `%7etransaction=*TCODE%20P1%3dV1%3bP2%3dV2`.
//! Everything else (`sap-*`, `~*`) stays a regular query parameter.

use super::{
    is_business_parameter, remove_all, result_from_template, sap_system_of, semantics_of, take_sap_system,
    template_of, unnecessary_webgui_parameters, ConstructContext, SAP_SYSTEM_PARAM,
};
use super::webgui::inject_into_pobject_param;
use crate::error::{ResolveError, Result};
use crate::mapper::MatchingTarget;
use crate::model::{ApplicationType, Inbound, Intent, ResolutionResult, SystemAliasSemantics};
use crate::params::{decode_component, Params};
use crate::system_alias::{SystemAliasBridge, UriType, LOCAL_SYSTEM_ALIAS};
use crate::uri::Uri;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error};

/// Easy access parameter naming the transaction code
pub const TCODE_PARAM: &str = "sap-ui2-tcode";

/// Parameters the native web GUI must never receive
const FORBIDDEN_PARAMS: [&str; 5] = [
    "sap-wd-run-sc",
    "sap-wd-auto-detect",
    "sap-ep-version",
    "sap-system",
    "sap-system-src",
];

const TRANSACTION_PREFIXES: [&str; 2] = ["%7etransaction", "?%7etransaction"];

lazy_static! {
    static ref RE_TRANSACTION_VALUE: Regex = Regex::new(r"(?i)^(.+?)(%20|(%20)(.+))?$").unwrap();
}

/// Parsed `~transaction` query segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionParam {
    /// Segment name as written, e.g. `%7etransaction`
    pub name: String,
    /// Transaction code without the leading `*`
    pub code: String,
    /// Already-escaped `(name, value)` pairs following the code
    pub params: Vec<(String, String)>,
}

fn is_transaction_segment(segment: &str) -> bool {
    TRANSACTION_PREFIXES.iter().any(|p| segment.starts_with(p))
}

pub fn parse_transaction_param(segment: &str) -> Result<TransactionParam> {
    let parts: Vec<&str> = segment.split('=').collect();
    if parts.len() > 2 {
        return Err(ResolveError::InvalidArguments(
            "Found more than one assignment ('=') in the transaction query parameter".to_string(),
        ));
    }
    if parts.len() < 2 || parts[1].is_empty() {
        return Err(ResolveError::InvalidArguments(
            "The transaction query parameter must specify at least the transaction name".to_string(),
        ));
    }

    let caps = RE_TRANSACTION_VALUE.captures(parts[1]).ok_or_else(|| {
        ResolveError::InvalidArguments(format!("Cannot parse transaction parameter value '{}'", parts[1]))
    })?;
    let mut code = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();

    let mut params = Vec::new();
    if let Some(rest) = caps.get(2).filter(|m| m.as_str() != "%20").and(caps.get(4)) {
        for assignment in rest.as_str().split("%3b") {
            let (name, value) = assignment.split_once("%3d").unwrap_or((assignment, ""));
            if !name.is_empty() {
                params.push((name.to_string(), value.to_string()));
            }
        }
    }

    if !params.is_empty() {
        if let Some(stripped) = code.strip_prefix('*') {
            code = stripped.to_string();
        }
    }

    Ok(TransactionParam {
        name: parts[0].to_string(),
        code,
        params,
    })
}

/// Merge `params` into a `~transaction` segment. Parameter names are uppercased
/// and the code gets the `*` that skips the first screen.
pub fn inject_into_transaction_param(segment: &str, params: &Params) -> String {
    let parsed = match parse_transaction_param(segment) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Cannot inject parameters into transaction: {}", e);
            return segment.to_string();
        }
    };

    let mut assignments: Vec<String> = parsed
        .params
        .iter()
        .map(|(name, value)| format!("{}%3d{}", name.to_uppercase(), value))
        .collect();
    let upper: Params = params
        .iter()
        .map(|(name, values)| (name.to_uppercase(), values.clone()))
        .collect();
    let injected = upper.join_with("%3b", "%3d");
    if !injected.is_empty() {
        assignments.push(injected);
    }

    let has_params = !assignments.is_empty();
    format!(
        "{}={}{}{}{}",
        parsed.name,
        if has_params { "*" } else { "" },
        parsed.code,
        if has_params { "%20" } else { "" },
        assignments.join("%3b")
    )
}

/// Distribute `params` over a native web GUI URI: business parameters into
/// `~transaction`, the rest (including those of `uri`) into the query string.
pub fn blend_into_native_webgui(inbound: &Inbound, params: &Params, mut uri: Uri) -> ResolutionResult {
    let (sap_system, sap_system_src) = sap_system_of(params);

    let mut effective = params.clone();
    effective.retain(|name, _| !FORBIDDEN_PARAMS.contains(&name.to_lowercase().as_str()));
    let unnecessary = unnecessary_webgui_parameters(&effective, inbound);
    remove_all(&mut effective, &unnecessary);

    let mut to_append = Params::new();
    effective.retain(|name, values| {
        if is_business_parameter(name) {
            true
        } else {
            to_append.insert(name, values.to_vec());
            false
        }
    });

    let mut kept = Vec::new();
    for segment in uri.query.split('&').filter(|s| !s.is_empty()) {
        let raw_name = segment.split('=').next().unwrap_or_default();
        if !is_business_parameter(raw_name) {
            let Some((name, value)) = segment.split_once('=') else {
                error!("Found no '=' separator in query parameter '{}' of the native web GUI URL", segment);
                continue;
            };
            let name = decode_component(name);
            if !to_append.contains(&name) {
                to_append.set(name, decode_component(value));
            }
        } else if is_transaction_segment(segment) {
            kept.push(inject_into_transaction_param(segment, &effective));
        } else {
            kept.push(segment.to_string());
        }
    }

    let appended = to_append.to_query_string().replace('~', "%7e");
    if !appended.is_empty() {
        kept.push(appended);
    }
    uri.query = kept.join("&");
    debug!("Blended native web GUI URL: {}", uri);

    let mut result = inbound
        .resolution_result
        .as_ref()
        .map(|t| result_from_template(t, true))
        .unwrap_or_default();
    result.url = uri.to_string();
    result.text = inbound.title.clone();
    result.application_type = Some(ApplicationType::Tr);
    result.sap_system = sap_system;
    result.sap_system_src = sap_system_src;
    result
}

/// Native web GUI URI of `transaction` on the local system, interpolated with `sap_system`
pub async fn build_native_webgui_uri(
    bridge: &SystemAliasBridge,
    transaction: &str,
    sap_system: Option<&str>,
    sap_system_src: Option<&str>,
) -> Result<Uri> {
    let url = format!("/gui/sap/its/webgui?%7etransaction={}&%7enosplash=1", transaction);
    bridge
        .splice(
            Uri::parse(&url),
            Some(LOCAL_SYSTEM_ALIAS),
            sap_system,
            sap_system_src,
            UriType::NativeWebgui,
            SystemAliasSemantics::Apply,
        )
        .await
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
            UriType::NativeWebgui,
            semantics_of(template, SystemAliasSemantics::Applied),
        )
        .await
}

/// Unwrapped transaction: business parameters go to `~transaction`
pub async fn construct_nowrap(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let mapped = &target.mapped_intent_params_plus_simple_defaults;
    let (sap_system, sap_system_src) = sap_system_of(mapped);
    let uri = splice_template(target, ctx, sap_system.as_deref(), sap_system_src.as_deref()).await?;
    Ok(blend_into_native_webgui(&target.inbound, mapped, uri))
}

/// Wrapped transaction: parameters go to `P_OBJECT` inside `~transaction`
pub async fn construct_wrap(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let template = template_of(target)?;
    let mut effective = target.mapped_intent_params_plus_simple_defaults.clone();
    let (sap_system, sap_system_src) = take_sap_system(&mut effective);

    let mut uri = splice_template(target, ctx, sap_system.as_deref(), sap_system_src.as_deref()).await?;
    uri.query = uri
        .query
        .split('&')
        .map(|segment| {
            if is_transaction_segment(segment) {
                inject_into_pobject_param(segment, &effective, "%3b", "%3d")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("&");

    let mut result = result_from_template(template, false);
    result.url = uri.to_string();
    result.text = target.inbound.title.clone();
    result.application_type = Some(ApplicationType::Tr);
    result.sap_system = sap_system;
    result.sap_system_src = sap_system_src;
    Ok(result)
}

/// URI built from the `sap.gui` transaction code
pub async fn construct_full(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let template = template_of(target)?;
    let gui = template
        .sap_gui
        .as_ref()
        .ok_or_else(|| ResolveError::FallbackRequired("the inbound has no sap.gui section".to_string()))?;

    let mapped = &target.mapped_intent_params_plus_simple_defaults;
    let (mapped_system, sap_system_src) = sap_system_of(mapped);
    let sap_system = mapped_system.or_else(|| template.system_alias.clone());

    let uri = build_native_webgui_uri(ctx.bridge, &gui.transaction, sap_system.as_deref(), sap_system_src.as_deref())
        .await?;
    let mut result = blend_into_native_webgui(&target.inbound, mapped, uri);
    result.platform_runtime = template.platform_runtime.clone();
    result.sap_system = sap_system;
    Ok(result)
}

/// `#Shell-startGUI?sap-system=S&sap-ui2-tcode=T[&P=V...]`
pub async fn resolve_start_gui(
    intent: &Intent,
    target: &MatchingTarget,
    bridge: &SystemAliasBridge,
) -> Result<ResolutionResult> {
    let transaction = intent
        .params
        .first(TCODE_PARAM)
        .ok_or_else(|| ResolveError::InvalidArguments(format!("{} parameter is missing", TCODE_PARAM)))?;
    let (sap_system, sap_system_src) = sap_system_of(&intent.params);

    let uri = build_native_webgui_uri(bridge, transaction, sap_system.as_deref(), sap_system_src.as_deref()).await?;

    let mut params = target.mapped_intent_params_plus_simple_defaults.clone();
    params.remove(TCODE_PARAM);
    let mut result = blend_into_native_webgui(&target.inbound, &params, uri);
    result.platform_runtime = target
        .inbound
        .resolution_result
        .as_ref()
        .and_then(|t| t.platform_runtime.clone());
    result.sap_system = intent.params.first(SAP_SYSTEM_PARAM).map(str::to_string);
    result.text = transaction.to_string();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::test_support::{create_test_bridge, create_test_target, with_template};
    use crate::hash::parse_shell_hash;
    use crate::model::GuiTarget;

    fn context(bridge: &SystemAliasBridge) -> ConstructContext<'_> {
        ConstructContext {
            bridge,
            fallback: None,
            hash_fragment: "#Obj-display",
        }
    }

    #[test]
    fn test_parse_transaction_param() {
        let plain = parse_transaction_param("%7etransaction=SU01").unwrap();
        assert_eq!(plain.code, "SU01");
        assert!(plain.params.is_empty());

        let with_params = parse_transaction_param("%7etransaction=*SU01%20P1%3dV1%3bP2%3dV2").unwrap();
        assert_eq!(with_params.code, "SU01");
        assert_eq!(
            with_params.params,
            vec![("P1".to_string(), "V1".to_string()), ("P2".to_string(), "V2".to_string())]
        );

        // a trailing blank carries no parameters, so the star stays
        assert_eq!(parse_transaction_param("%7etransaction=*SU01%20").unwrap().code, "*SU01");
    }

    #[test]
    fn test_parse_transaction_param_errors() {
        let err = parse_transaction_param("%7etransaction=a=b").unwrap_err();
        assert!(err.to_string().contains("more than one assignment"));
        let err = parse_transaction_param("%7etransaction=").unwrap_err();
        assert!(err.to_string().contains("at least the transaction name"));
    }

    #[test]
    fn test_inject_uppercases_and_merges() {
        let mut params = Params::new();
        params.set("matnr", "4711");
        assert_eq!(
            inject_into_transaction_param("%7etransaction=*MM03%20werks%3d1000", &params),
            "%7etransaction=*MM03%20WERKS%3d1000%3bMATNR%3d4711"
        );
        assert_eq!(
            inject_into_transaction_param("%7etransaction=SU01", &Params::new()),
            "%7etransaction=SU01"
        );
        // unparseable segments are left alone
        assert_eq!(inject_into_transaction_param("%7etransaction=", &params), "%7etransaction=");
    }

    #[test]
    fn test_blend_partitions_parameters() {
        let inbound = Inbound::new("Obj", "display");
        let mut params = Params::new();
        params.set("matnr", "4711");
        params.set("sap-theme", "dark");
        params.set("sap-system", "U1Y");
        params.set("~sessionid", "1");
        let uri = Uri::parse("/gui/sap/its/webgui?%7etransaction=MM03&%7enosplash=1&sap-client=000");
        let result = blend_into_native_webgui(&inbound, &params, uri);
        assert_eq!(
            result.url,
            "/gui/sap/its/webgui?%7etransaction=*MM03%20MATNR%3d4711&%7enosplash=1\
             &sap-client=000&sap-theme=dark&%7esessionid=1"
        );
        assert_eq!(result.sap_system.as_deref(), Some("U1Y"));
        assert_eq!(result.application_type, Some(ApplicationType::Tr));
    }

    #[test]
    fn test_blend_drops_lone_screen_skip_parameter() {
        let inbound = Inbound::new("Obj", "display");
        let mut params = Params::new();
        params.set("DYNP_OKCODE", "onli");
        let uri = Uri::parse("/gui/sap/its/webgui?%7etransaction=SU01&%7enosplash=1");
        let result = blend_into_native_webgui(&inbound, &params, uri);
        assert_eq!(result.url, "/gui/sap/its/webgui?%7etransaction=SU01&%7enosplash=1");
    }

    #[tokio::test]
    async fn test_nowrap_moves_to_sap_system_with_rfc_data() {
        let bridge = create_test_bridge();
        let target = create_test_target(
            ApplicationType::Tr,
            Some("/gui/sap/its/webgui?%7etransaction=SU01&%7enosplash=1"),
            &[("P1", "V1"), ("sap-system", "U1Y")],
        );
        let result = construct_nowrap(&target, &context(&bridge)).await.unwrap();
        assert_eq!(
            result.url,
            "https://u1y.corp:44355/gui/sap/its/webgui;~service=3255\
             ?%7etransaction=*SU01%20P1%3dV1&%7enosplash=1&sap-client=000&sap-language=EN"
        );
        assert!(!result.url.contains("sap-system"));
        assert_eq!(result.sap_system.as_deref(), Some("U1Y"));
    }

    #[tokio::test]
    async fn test_wrap_injects_pobject_into_transaction() {
        let bridge = create_test_bridge();
        let target = create_test_target(
            ApplicationType::Tr,
            Some("/gui/sap/its/webgui?%7etransaction=*APB_LPD_CALL_TRANS%20P_TCODE%3dSU01&%7enosplash=1"),
            &[("USER", "ME")],
        );
        let result = construct_wrap(&target, &context(&bridge)).await.unwrap();
        assert_eq!(
            result.url,
            "/gui/sap/its/webgui?%7etransaction=*APB_LPD_CALL_TRANS%20P_TCODE%3dSU01%3bP_OBJECT%3dUSER%2521ME\
             &%7enosplash=1"
        );
        assert_eq!(result.application_type, Some(ApplicationType::Tr));
    }

    #[tokio::test]
    async fn test_full_webgui_uses_gui_transaction() {
        let bridge = create_test_bridge();
        let target = with_template(create_test_target(ApplicationType::Tr, None, &[("P1", "V1")]), |t| {
            t.sap_gui = Some(GuiTarget {
                transaction: "SU01".to_string(),
            });
        });
        let result = construct_full(&target, &context(&bridge)).await.unwrap();
        assert_eq!(
            result.url,
            "/gui/sap/its/webgui?%7etransaction=*SU01%20P1%3dV1&%7enosplash=1&sap-language=en"
        );
        assert_eq!(result.sap_system, None);
    }

    #[tokio::test]
    async fn test_start_gui_easy_access() {
        let bridge = create_test_bridge();
        let intent = parse_shell_hash("#Shell-startGUI?sap-system=U1Y&sap-ui2-tcode=SU01").unwrap();
        let target = create_test_target(
            ApplicationType::Tr,
            None,
            &[("sap-system", "U1Y"), ("sap-ui2-tcode", "SU01")],
        );
        let result = resolve_start_gui(&intent, &target, &bridge).await.unwrap();
        assert_eq!(
            result.url,
            "https://u1y.corp:44355/gui/sap/its/webgui;~service=3255\
             ?%7etransaction=SU01&%7enosplash=1&sap-client=000&sap-language=EN"
        );
        assert_eq!(result.text, "SU01");
        assert_eq!(result.sap_system.as_deref(), Some("U1Y"));
    }
}
