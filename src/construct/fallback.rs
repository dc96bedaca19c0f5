//! Resolution delegated to an external resolver, for inbounds the local
//! constructors cannot or may not handle.

use super::{defaulted_names_value, ConstructContext, DEFAULTED_PARAM_NAMES_PARAM};
use crate::error::{ResolveError, Result};
use crate::mapper::MatchingTarget;
use crate::model::{Inbound, ResolutionResult};
use crate::params::Params;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait FallbackResolver: Send + Sync {
    async fn resolve_hash_fragment_fallback(
        &self,
        hash_fragment: &str,
        inbound: &Inbound,
        effective_parameters: &Params,
    ) -> Result<ResolutionResult>;
}

/// Parameters handed to the fallback resolver: intent parameters with all
/// defaults, plus the defaulted names.
pub fn effective_parameters(target: &MatchingTarget) -> Params {
    let mut effective = target.intent_params_plus_all_defaults.clone();
    let defaulted = if target.mapped_defaulted_param_names.is_empty() {
        &target.defaulted_param_names
    } else {
        &target.mapped_defaulted_param_names
    };
    if !defaulted.is_empty() {
        effective.set(DEFAULTED_PARAM_NAMES_PARAM, defaulted_names_value(defaulted));
    }
    effective
}

pub async fn construct(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let fallback = ctx.fallback.ok_or(ResolveError::NoFallback)?;
    let effective = effective_parameters(target);
    debug!("Delegating {} to the fallback resolver", ctx.hash_fragment);

    let resolved = fallback
        .resolve_hash_fragment_fallback(ctx.hash_fragment, &target.inbound, &effective)
        .await?;
    Ok(ResolutionResult {
        application_type: resolved.application_type,
        additional_information: resolved.additional_information,
        url: resolved.url,
        application_dependencies: resolved.application_dependencies,
        text: resolved.text,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::test_support::{create_test_bridge, create_test_target};
    use crate::model::ApplicationType;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingFallback {
        seen: Mutex<Vec<(String, Params)>>,
    }

    #[async_trait]
    impl FallbackResolver for RecordingFallback {
        async fn resolve_hash_fragment_fallback(
            &self,
            hash_fragment: &str,
            _inbound: &Inbound,
            effective_parameters: &Params,
        ) -> Result<ResolutionResult> {
            self.seen
                .lock()
                .unwrap()
                .push((hash_fragment.to_string(), effective_parameters.clone()));
            Ok(ResolutionResult {
                url: "/fallback/app".to_string(),
                application_type: Some(ApplicationType::Nwbc),
                text: "From fallback".to_string(),
                sap_system: Some("IGNORED".to_string()),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_fallback_receives_defaulted_names() {
        let bridge = create_test_bridge();
        let fallback = RecordingFallback::default();
        let ctx = ConstructContext {
            bridge: &bridge,
            fallback: Some(&fallback),
            hash_fragment: "#Obj-display?A=1",
        };
        let mut target = create_test_target(ApplicationType::Wda, None, &[("A", "1"), ("B", "2")]);
        target.defaulted_param_names = vec!["B".to_string()];

        let result = construct(&target, &ctx).await.unwrap();
        assert_eq!(result.url, "/fallback/app");
        assert_eq!(result.text, "From fallback");
        assert_eq!(result.sap_system, None);

        let seen = fallback.seen.lock().unwrap();
        assert_eq!(seen[0].0, "#Obj-display?A=1");
        assert_eq!(seen[0].1.first(DEFAULTED_PARAM_NAMES_PARAM), Some("[\"B\"]"));
    }

    #[tokio::test]
    async fn test_no_fallback_configured() {
        let bridge = create_test_bridge();
        let ctx = ConstructContext {
            bridge: &bridge,
            fallback: None,
            hash_fragment: "#Obj-display",
        };
        let target = create_test_target(ApplicationType::Wda, None, &[]);
        assert!(matches!(construct(&target, &ctx).await, Err(ResolveError::NoFallback)));
    }
}
