//! Choice of the construction strategy for a matched inbound.
//!
//! The strategy is computed once from the inbound's resolution template and
//! the feature flags, checking kinds in a fixed priority order. A strategy
//! that cannot finish for lack of collaborator data hands over to the
//! fallback resolver.

use crate::config::ResolverConfig;
use crate::construct::{fallback, native_webgui, sapui5, url, wcf, wda, webgui, ConstructContext};
use crate::error::Result;
use crate::mapper::MatchingTarget;
use crate::model::{ApplicationType, Inbound, ResolutionResult};
use tracing::{debug, warn};

/// Canvas path of gateway-hosted transactions
const CANVAS_PATH: &str = "/~canvas;";

/// Native web GUI path
const NATIVE_WEBGUI_PATH: &str = "/its/webgui";

/// Transactions whose parameters travel in `P_OBJECT`
const WRAPPER_TRANSACTION: &str = "APB_LPD_CALL_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Sapui5,
    FullWda,
    Wda,
    FullWebgui,
    WebguiNowrap,
    WebguiWrap,
    NativeWebguiNowrap,
    NativeWebguiWrap,
    Url,
    Wcf,
    Fallback,
}

impl ResolutionKind {
    pub fn of(inbound: &Inbound, config: &ResolverConfig) -> Self {
        let Some(template) = inbound.resolution_result.as_ref() else {
            return ResolutionKind::Fallback;
        };
        let url = template.url_str();
        let wrapped = url.contains(&format!("app/transaction/{}", WRAPPER_TRANSACTION));
        let is_tr = template.application_type == ApplicationType::Tr;
        let wda = config.enable_wda_local_resolution;
        let webgui = config.enable_webgui_local_resolution;
        let native = config.enable_native_webgui_local_resolution;

        match &template.application_type {
            ApplicationType::Sapui5 => ResolutionKind::Sapui5,
            ApplicationType::Wda if wda && template.sap_wda.is_some() => ResolutionKind::FullWda,
            ApplicationType::Wda if wda => ResolutionKind::Wda,
            _ if is_tr && webgui && template.sap_gui.is_some() => ResolutionKind::FullWebgui,
            _ if is_tr && webgui && url.contains(CANVAS_PATH) && !wrapped => ResolutionKind::WebguiNowrap,
            _ if is_tr && webgui && url.contains(CANVAS_PATH) => ResolutionKind::WebguiWrap,
            _ if is_tr && native && url.contains(NATIVE_WEBGUI_PATH) && !url.contains(WRAPPER_TRANSACTION) => {
                ResolutionKind::NativeWebguiNowrap
            }
            _ if is_tr && native && url.contains(NATIVE_WEBGUI_PATH) => ResolutionKind::NativeWebguiWrap,
            ApplicationType::Url => ResolutionKind::Url,
            ApplicationType::Wcf => ResolutionKind::Wcf,
            _ => ResolutionKind::Fallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionKind::Sapui5 => "SAPUI5",
            ResolutionKind::FullWda => "full local WDA",
            ResolutionKind::Wda => "local WDA",
            ResolutionKind::FullWebgui => "full local native webgui",
            ResolutionKind::WebguiNowrap => "local webgui (nowrap)",
            ResolutionKind::WebguiWrap => "local webgui (wrap)",
            ResolutionKind::NativeWebguiNowrap => "local native webgui (nowrap)",
            ResolutionKind::NativeWebguiWrap => "local native webgui (wrap)",
            ResolutionKind::Url => "URL",
            ResolutionKind::Wcf => "WCF",
            ResolutionKind::Fallback => "fallback",
        }
    }
}

async fn run(kind: ResolutionKind, target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    match kind {
        ResolutionKind::Sapui5 => sapui5::construct(target),
        ResolutionKind::FullWda => wda::construct_full(target, ctx).await,
        ResolutionKind::Wda => wda::construct(target, ctx).await,
        ResolutionKind::FullWebgui => native_webgui::construct_full(target, ctx).await,
        ResolutionKind::WebguiNowrap => webgui::construct_nowrap(target, ctx).await,
        ResolutionKind::WebguiWrap => webgui::construct_wrap(target, ctx).await,
        ResolutionKind::NativeWebguiNowrap => native_webgui::construct_nowrap(target, ctx).await,
        ResolutionKind::NativeWebguiWrap => native_webgui::construct_wrap(target, ctx).await,
        ResolutionKind::Url => url::construct(target, ctx).await,
        ResolutionKind::Wcf => wcf::construct(target, ctx).await,
        ResolutionKind::Fallback => fallback::construct(target, ctx).await,
    }
}

/// Construct the result for `kind`, switching to the fallback resolver when
/// the strategy asks for it.
pub async fn construct(
    kind: ResolutionKind,
    target: &MatchingTarget,
    ctx: &ConstructContext<'_>,
) -> Result<ResolutionResult> {
    debug!("Resolving {} with the {} strategy", target.inbound, kind.as_str());
    match run(kind, target, ctx).await {
        Err(e) if e.requests_fallback() && kind != ResolutionKind::Fallback => {
            warn!("{} resolution deferred to the fallback resolver: {}", kind.as_str(), e);
            fallback::construct(target, ctx).await
        }
        other => other,
    }
}
