//! UI5 component targets: the template URL plus the effective startup parameters.

use super::{defaulted_names_value, result_from_template, sap_system_of, template_of, DEFAULTED_PARAM_NAMES_PARAM};
use crate::error::{ResolveError, Result};
use crate::mapper::MatchingTarget;
use crate::model::ResolutionResult;
use crate::params::Params;

/// Parameters handed to the component out of band instead of through the URL
pub const RESERVED_PARAMS: [&str; 2] = ["sap-ui-fl-max-layer", "sap-ui-fl-control-variant-id"];

/// Startup parameters of a UI5 target and the reserved parameters split off them
pub fn effective_parameters(target: &MatchingTarget) -> (Params, Params) {
    let mut effective = target.mapped_intent_params_plus_simple_defaults.clone();
    let mut reserved = Params::new();
    for name in RESERVED_PARAMS {
        if let Some(values) = effective.remove(name) {
            reserved.insert(name, values);
        }
    }

    let defaulted: Vec<String> = target
        .mapped_defaulted_param_names
        .iter()
        .filter(|name| !RESERVED_PARAMS.contains(&name.as_str()))
        .cloned()
        .collect();
    if !defaulted.is_empty() {
        effective.set(DEFAULTED_PARAM_NAMES_PARAM, defaulted_names_value(&defaulted));
    }
    (effective, reserved)
}

pub fn construct(target: &MatchingTarget) -> Result<ResolutionResult> {
    let template = template_of(target)?;
    let mut result = result_from_template(template, false);
    result.application_type = Some(template.application_type.clone());

    let base_url = match (&template.url, &template.application_dependencies) {
        (Some(url), _) => url.clone(),
        // dependencies alone locate the component
        (None, Some(_)) => String::new(),
        (None, None) => return Err(ResolveError::MissingUrl),
    };

    let (effective, reserved) = effective_parameters(target);
    let (sap_system, sap_system_src) = sap_system_of(&effective);
    result.sap_system = sap_system;
    result.sap_system_src = sap_system_src;

    let query = effective.to_query_string();
    result.url = if query.is_empty() {
        base_url
    } else {
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", base_url, separator, query)
    };
    result.reserved_parameters = reserved;
    result.ui5_component_name = template.ui5_component_name.clone();
    result.text = target.inbound.title.clone();
    Ok(result)
}
