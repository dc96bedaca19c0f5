//! Generic URL targets.

use super::{result_from_template, semantics_of, take_sap_system, template_of, ConstructContext};
use crate::error::Result;
use crate::index::SHELL_SEMANTIC_OBJECT;
use crate::mapper::MatchingTarget;
use crate::model::{ApplicationType, ResolutionResult, SystemAliasSemantics};
use crate::system_alias::UriType;
use crate::uri::{append_params_to_url, Uri};

/// Action of the shell intent that opens an arbitrary external URL
pub const LAUNCH_URL_ACTION: &str = "launchURL";

/// Parameter of `Shell-launchURL` carrying the URL itself
pub const EXTERNAL_URL_PARAM: &str = "sap-external-url";

/// Whether the template URL was typed in by a user and must not be touched
fn absolute_url_defined_by_user(uri: &Uri, system_alias: Option<&str>, semantics: SystemAliasSemantics) -> bool {
    match semantics {
        SystemAliasSemantics::Applied => uri.is_absolute() && system_alias.map_or(true, str::is_empty),
        SystemAliasSemantics::Apply => uri.is_absolute(),
    }
}

pub async fn construct(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let template = template_of(target)?;
    let inbound = &target.inbound;
    let base_url = template.url_str();

    let mut effective = target.mapped_intent_params_plus_simple_defaults.clone();
    if inbound.semantic_object == SHELL_SEMANTIC_OBJECT && inbound.action == LAUNCH_URL_ACTION {
        effective.remove(EXTERNAL_URL_PARAM);
    }
    let (sap_system, sap_system_src) = take_sap_system(&mut effective);

    let semantics = semantics_of(template, SystemAliasSemantics::Applied);
    let uri = Uri::parse(base_url);
    let url_without_params = if absolute_url_defined_by_user(&uri, template.system_alias.as_deref(), semantics) {
        base_url.to_string()
    } else {
        ctx.bridge
            .splice(
                uri,
                template.system_alias.as_deref(),
                sap_system.as_deref(),
                sap_system_src.as_deref(),
                UriType::Url,
                semantics,
            )
            .await?
            .to_string()
    };

    let mut result = result_from_template(template, false);
    result.url = append_params_to_url(&url_without_params, &effective.to_query_string());
    result.text = inbound.title.clone();
    result.application_type = Some(ApplicationType::Url);
    result.sap_system = sap_system;
    result.sap_system_src = sap_system_src;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::test_support::{create_test_bridge, create_test_target, with_template};
    use std::sync::Arc;

    fn context(bridge: &crate::system_alias::SystemAliasBridge) -> ConstructContext<'_> {
        ConstructContext {
            bridge,
            fallback: None,
            hash_fragment: "#Obj-display",
        }
    }

    #[tokio::test]
    async fn test_user_defined_absolute_url_is_kept() {
        let bridge = create_test_bridge();
        let target = create_test_target(
            ApplicationType::Url,
            Some("https://www.example.org/page#top"),
            &[("q", "a b"), ("sap-system", "U1Y")],
        );
        let result = construct(&target, &context(&bridge)).await.unwrap();
        assert_eq!(result.url, "https://www.example.org/page?q=a%20b#top");
        assert_eq!(result.sap_system.as_deref(), Some("U1Y"));
        assert_eq!(result.application_type, Some(ApplicationType::Url));
    }

    #[tokio::test]
    async fn test_relative_url_moves_to_sap_system() {
        let bridge = create_test_bridge();
        let target = create_test_target(ApplicationType::Url, Some("/sap/bc/app"), &[("sap-system", "U1Y")]);
        let result = construct(&target, &context(&bridge)).await.unwrap();
        assert_eq!(result.url, "https://u1y.corp:44355/sap/bc/app?sap-client=000&sap-language=EN");
    }

    #[tokio::test]
    async fn test_launch_url_drops_external_url_parameter() {
        let bridge = create_test_bridge();
        let mut target = create_test_target(
            ApplicationType::Url,
            Some("https://www.example.org"),
            &[("sap-external-url", "https://www.example.org")],
        );
        let mut inbound = (*target.inbound).clone();
        inbound.semantic_object = "Shell".to_string();
        inbound.action = "launchURL".to_string();
        target.inbound = Arc::new(inbound);
        let result = construct(&target, &context(&bridge)).await.unwrap();
        assert_eq!(result.url, "https://www.example.org");
    }

    #[tokio::test]
    async fn test_apply_semantics_keeps_any_absolute_url() {
        let bridge = create_test_bridge();
        let target = with_template(
            create_test_target(ApplicationType::Url, Some("https://pre.built/app"), &[("sap-system", "U1Y")]),
            |t| {
                t.system_alias = Some("U1Y".to_string());
                t.system_alias_semantics = Some(SystemAliasSemantics::Apply);
            },
        );
        let result = construct(&target, &context(&bridge)).await.unwrap();
        assert_eq!(result.url, "https://pre.built/app");
    }
}
