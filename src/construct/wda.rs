//! Web Dynpro targets, hosted by the business client canvas.

use super::{
    defaulted_names_value, result_from_template, sap_system_of, semantics_of, template_of, ConstructContext,
    DEFAULTED_PARAM_NAMES_PARAM, SAP_SYSTEM_PARAM, SAP_SYSTEM_SRC_PARAM,
};
use crate::error::{ResolveError, Result};
use crate::mapper::MatchingTarget;
use crate::model::{ApplicationType, Inbound, Intent, ResolutionResult, SystemAliasSemantics};
use crate::params::Params;
use crate::system_alias::{SystemAliasBridge, UriType, LOCAL_SYSTEM_ALIAS};
use crate::uri::{append_params_to_url, Uri};
use tracing::debug;

/// Easy access parameter naming the application
pub const WD_APP_ID_PARAM: &str = "sap-ui2-wd-app-id";

/// Easy access parameter naming the application configuration
pub const WD_CONF_ID_PARAM: &str = "sap-ui2-wd-conf-id";

/// URL parameter carrying the application configuration
const WD_CONFIG_ID_URL_PARAM: &str = "sap-wd-configId";

/// Canvas URL of an application on the local system, interpolated with `sap_system`.
pub async fn build_wda_uri(
    bridge: &SystemAliasBridge,
    application_id: &str,
    config_id: Option<&str>,
    sap_system: Option<&str>,
    sap_system_src: Option<&str>,
    other_params: &Params,
) -> Result<Uri> {
    let mut params = other_params.clone();
    if let Some(config_id) = config_id.filter(|c| !c.is_empty()) {
        params.set(WD_CONFIG_ID_URL_PARAM, config_id);
    }
    params.remove(SAP_SYSTEM_PARAM);
    params.remove(SAP_SYSTEM_SRC_PARAM);

    let url = format!(
        "/ui2/nwbc/~canvas;window=app/wda/{}/?{}",
        application_id,
        params.to_query_string()
    );
    bridge
        .splice(
            Uri::parse(&url),
            Some(LOCAL_SYSTEM_ALIAS),
            sap_system,
            sap_system_src,
            UriType::Wda,
            SystemAliasSemantics::Apply,
        )
        .await
}

/// Query parameters of a canvas URL; the target system is part of the URL already.
fn wda_url_parameters(params: &Params, mapped_defaulted: &[String]) -> String {
    let mut effective = params.clone();
    if !mapped_defaulted.is_empty() {
        effective.set(DEFAULTED_PARAM_NAMES_PARAM, defaulted_names_value(mapped_defaulted));
    }
    effective.remove(SAP_SYSTEM_PARAM);
    effective.remove(SAP_SYSTEM_SRC_PARAM);
    effective.to_query_string()
}

fn create_wda_result(
    inbound: &Inbound,
    url: String,
    sap_system: Option<String>,
    sap_system_src: Option<String>,
) -> ResolutionResult {
    let mut result = inbound
        .resolution_result
        .as_ref()
        .map(|t| result_from_template(t, false))
        .unwrap_or_default();
    result.url = url;
    result.text = inbound.title.clone();
    result.application_type = Some(ApplicationType::Nwbc);
    result.sap_system = sap_system;
    result.sap_system_src = sap_system_src;
    result
}

/// Template URL with the target system spliced in
pub async fn construct(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let template = template_of(target)?;
    let mapped = &target.mapped_intent_params_plus_simple_defaults;
    let (sap_system, sap_system_src) = sap_system_of(mapped);

    let uri = ctx
        .bridge
        .splice(
            Uri::parse(template.url_str()),
            template.system_alias.as_deref(),
            sap_system.as_deref(),
            sap_system_src.as_deref(),
            UriType::Wda,
            semantics_of(template, SystemAliasSemantics::Applied),
        )
        .await?;

    let params = wda_url_parameters(mapped, &target.mapped_defaulted_param_names);
    let url = append_params_to_url(&uri.to_string(), &params);
    Ok(create_wda_result(&target.inbound, url, sap_system, sap_system_src))
}

/// URL built from the `sap.wda` application id and configuration
pub async fn construct_full(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let template = template_of(target)?;
    let wda = template
        .sap_wda
        .as_ref()
        .ok_or_else(|| ResolveError::FallbackRequired("the inbound has no sap.wda section".to_string()))?;

    let mapped = &target.mapped_intent_params_plus_simple_defaults;
    let (mapped_system, sap_system_src) = sap_system_of(mapped);
    let sap_system = mapped_system.clone().or_else(|| template.system_alias.clone());
    debug!(
        "Building Web Dynpro URL for {} on system {:?}",
        wda.application_id, sap_system
    );

    let uri = build_wda_uri(
        ctx.bridge,
        &wda.application_id,
        wda.config_id.as_deref(),
        sap_system.as_deref(),
        sap_system_src.as_deref(),
        &Params::new(),
    )
    .await?;

    let params = wda_url_parameters(mapped, &target.mapped_defaulted_param_names);
    let url = append_params_to_url(&uri.to_string(), &params);
    Ok(create_wda_result(&target.inbound, url, mapped_system, sap_system_src))
}

/// `#Shell-startWDA?sap-system=S&sap-ui2-wd-app-id=A[&sap-ui2-wd-conf-id=C]`
pub async fn resolve_start_wda(
    intent: &Intent,
    target: &MatchingTarget,
    bridge: &SystemAliasBridge,
) -> Result<ResolutionResult> {
    let application_id = intent.params.first(WD_APP_ID_PARAM).ok_or_else(|| {
        ResolveError::InvalidArguments(format!("{} parameter is missing", WD_APP_ID_PARAM))
    })?;
    let config_id = intent.params.first(WD_CONF_ID_PARAM);
    let (sap_system, sap_system_src) = sap_system_of(&intent.params);

    let mut other_params = intent.params.clone();
    other_params.remove(WD_APP_ID_PARAM);
    other_params.remove(WD_CONF_ID_PARAM);

    let uri = build_wda_uri(
        bridge,
        application_id,
        config_id,
        sap_system.as_deref(),
        sap_system_src.as_deref(),
        &other_params,
    )
    .await?;

    Ok(ResolutionResult {
        url: uri.to_string(),
        application_type: Some(ApplicationType::Nwbc),
        text: application_id.to_string(),
        additional_information: Some(String::new()),
        sap_system,
        sap_system_src,
        platform_runtime: target
            .inbound
            .resolution_result
            .as_ref()
            .and_then(|t| t.platform_runtime.clone()),
        ..Default::default()
    })
}
