//! Per-technology construction of launchable resolution results.
//!
//! Each submodule turns a mapped `MatchingTarget` into a `ResolutionResult`.
//! The helpers here hold the rules the technologies share: where `sap-system`
//! goes, which parameters count as business parameters, and which screen-skip
//! parameters are redundant.

pub mod fallback;
pub mod native_webgui;
pub mod sapui5;
pub mod url;
pub mod wcf;
pub mod wda;
pub mod webgui;

use crate::error::{ResolveError, Result};
use crate::mapper::MatchingTarget;
use crate::model::{Inbound, ResolutionResult, ResolutionTemplate, SystemAliasSemantics};
use crate::params::Params;
use crate::system_alias::SystemAliasBridge;
use fallback::FallbackResolver;

// ============================================================================
// Constants
// ============================================================================

/// Business parameter naming the target system
pub const SAP_SYSTEM_PARAM: &str = "sap-system";

/// Business parameter naming the system whose alias data must be used
pub const SAP_SYSTEM_SRC_PARAM: &str = "sap-system-src";

/// Parameter listing, as a JSON array, the names that were filled from defaults
pub const DEFAULTED_PARAM_NAMES_PARAM: &str = "sap-ushell-defaultedParameterNames";

/// Screen-skip parameters dropped when they are the only business parameters
const SCREEN_SKIP_PARAMS: [&str; 2] = ["DYNP_NO1ST", "DYNP_OKCODE"];

/// Collaborators a constructor may call out to
pub struct ConstructContext<'a> {
    pub bridge: &'a SystemAliasBridge,
    pub fallback: Option<&'a dyn FallbackResolver>,
    /// Hash fragment being resolved, with its leading `#`
    pub hash_fragment: &'a str,
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Resolution template of the matched inbound. A missing template can only be
/// handled by the fallback resolver.
pub(crate) fn template_of(target: &MatchingTarget) -> Result<&ResolutionTemplate> {
    target
        .inbound
        .resolution_result
        .as_ref()
        .ok_or_else(|| ResolveError::FallbackRequired("the inbound has no resolution result".to_string()))
}

/// Declared semantics, or `default` when the inbound declares none
pub(crate) fn semantics_of(template: &ResolutionTemplate, default: SystemAliasSemantics) -> SystemAliasSemantics {
    template.system_alias_semantics.unwrap_or(default)
}

/// First values of `sap-system` and `sap-system-src`
pub(crate) fn sap_system_of(params: &Params) -> (Option<String>, Option<String>) {
    (
        params.first(SAP_SYSTEM_PARAM).map(str::to_string),
        params.first(SAP_SYSTEM_SRC_PARAM).map(str::to_string),
    )
}

/// Like `sap_system_of`, removing both parameters from `params`
pub(crate) fn take_sap_system(params: &mut Params) -> (Option<String>, Option<String>) {
    let system = sap_system_of(params);
    params.remove(SAP_SYSTEM_PARAM);
    params.remove(SAP_SYSTEM_SRC_PARAM);
    system
}

/// JSON array form of the defaulted parameter names
pub(crate) fn defaulted_names_value(names: &[String]) -> String {
    serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string())
}

/// Start a result carrying the template's pass-through members
pub(crate) fn result_from_template(template: &ResolutionTemplate, with_runtime: bool) -> ResolutionResult {
    ResolutionResult {
        additional_information: template.additional_information.clone(),
        application_dependencies: template.application_dependencies.clone(),
        platform_runtime: if with_runtime {
            template.platform_runtime.clone()
        } else {
            None
        },
        ..Default::default()
    }
}

/// Whether a native transaction parameter is a business parameter, i.e. its
/// name starts with neither `sap-` nor `~`
pub fn is_business_parameter(name: &str) -> bool {
    !(name.starts_with("sap-") || name.starts_with('~'))
}

/// Screen-skip parameters that can be dropped from a transaction call.
///
/// Only when the business parameters are exactly `DYNP_OKCODE`, `DYNP_NO1ST`
/// or both (case-insensitive), and the inbound requires neither, are they
/// returned. Any other combination keeps everything.
pub fn unnecessary_webgui_parameters(params: &Params, inbound: &Inbound) -> Vec<String> {
    let required = SCREEN_SKIP_PARAMS.iter().any(|name| {
        inbound
            .signature
            .parameters
            .get(*name)
            .map(|spec| spec.required)
            .unwrap_or(false)
    });
    if required {
        return Vec::new();
    }

    let business: Vec<&String> = params.names().filter(|n| is_business_parameter(n)).collect();
    let mut normalized: Vec<String> = business.iter().map(|n| n.to_uppercase()).collect();
    normalized.sort();
    let elidable = matches!(
        normalized.iter().map(String::as_str).collect::<Vec<_>>().as_slice(),
        ["DYNP_NO1ST", "DYNP_OKCODE"] | ["DYNP_OKCODE"] | ["DYNP_NO1ST"]
    );
    if elidable {
        business.into_iter().cloned().collect()
    } else {
        Vec::new()
    }
}

pub(crate) fn remove_all(params: &mut Params, names: &[String]) {
    for name in names {
        params.remove(name);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::adapters::StaticSystemAliases;
    use crate::mapper::MatchingTarget;
    use crate::model::{ApplicationType, Inbound, ResolutionTemplate};
    use crate::params::Params;
    use crate::system_alias::{InMemoryAliasCache, SystemAliasBridge};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Bridge over a relative local alias and one remote system
    pub fn create_test_bridge() -> SystemAliasBridge {
        let aliases = StaticSystemAliases::from_value(json!({
            "": {"https": {"host": "", "port": 0, "pathPrefix": ""}},
            "U1Y": {"https": {"host": "u1y.corp", "port": 44355, "pathPrefix": ""},
                    "rfc": {"systemId": "", "host": "u1y.corp", "service": 3255},
                    "client": "000", "language": "EN"}
        }))
        .unwrap();
        SystemAliasBridge::new(Some(Arc::new(aliases)), Arc::new(InMemoryAliasCache::new()), "en")
    }

    pub fn create_test_target(application_type: ApplicationType, url: Option<&str>, params: &[(&str, &str)]) -> MatchingTarget {
        let mut inbound = Inbound::new("Obj", "display");
        inbound.title = "Display Object".to_string();
        inbound.resolution_result = Some(ResolutionTemplate::new(application_type, url));
        let mut mapped = Params::new();
        for (name, value) in params {
            mapped.push(*name, *value);
        }
        MatchingTarget {
            inbound: Arc::new(inbound),
            intent_params_plus_all_defaults: mapped.clone(),
            defaulted_param_names: vec![],
            complex_defaults: BTreeMap::new(),
            new_app_state_members: BTreeMap::new(),
            mapped_intent_params_plus_simple_defaults: mapped,
            mapped_defaulted_param_names: vec![],
        }
    }

    pub fn with_template(mut target: MatchingTarget, edit: impl FnOnce(&mut ResolutionTemplate)) -> MatchingTarget {
        let mut inbound = (*target.inbound).clone();
        if let Some(template) = inbound.resolution_result.as_mut() {
            edit(template);
        }
        target.inbound = Arc::new(inbound);
        target
    }
}
