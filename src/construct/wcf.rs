//! Web client framework targets. They take the full width of the shell and
//! carry no title of their own.

use super::{semantics_of, take_sap_system, template_of, ConstructContext};
use crate::error::Result;
use crate::mapper::MatchingTarget;
use crate::model::{ApplicationType, ResolutionResult, SystemAliasSemantics};
use crate::system_alias::UriType;
use crate::uri::{append_params_to_url, Uri};

pub async fn construct(target: &MatchingTarget, ctx: &ConstructContext<'_>) -> Result<ResolutionResult> {
    let template = template_of(target)?;
    let mut effective = target.mapped_intent_params_plus_simple_defaults.clone();
    let (sap_system, sap_system_src) = take_sap_system(&mut effective);

    let uri = ctx
        .bridge
        .splice(
            Uri::parse(template.url_str()),
            template.system_alias.as_deref(),
            sap_system.as_deref(),
            sap_system_src.as_deref(),
            UriType::Wcf,
            semantics_of(template, SystemAliasSemantics::Apply),
        )
        .await?;

    Ok(ResolutionResult {
        url: append_params_to_url(&uri.to_string(), &effective.to_query_string()),
        application_type: Some(ApplicationType::Wcf),
        text: String::new(),
        additional_information: Some(String::new()),
        full_width: true,
        sap_system,
        sap_system_src,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::test_support::{create_test_bridge, create_test_target, with_template};

    #[tokio::test]
    async fn test_wcf_applies_alias_and_takes_full_width() {
        let bridge = create_test_bridge();
        let ctx = ConstructContext {
            bridge: &bridge,
            fallback: None,
            hash_fragment: "#Obj-display",
        };
        let target = with_template(
            create_test_target(ApplicationType::Wcf, Some("/sap/bc/wcf/app?wcf-target-id=X"), &[("A", "1")]),
            |t| t.system_alias = Some("U1Y".to_string()),
        );
        let result = construct(&target, &ctx).await.unwrap();
        assert_eq!(
            result.url,
            "https://u1y.corp:44355/sap/bc/wcf/app?wcf-target-id=X&sap-client=000&sap-language=EN&A=1"
        );
        assert!(result.full_width);
        assert_eq!(result.text, "");
        assert_eq!(result.application_type, Some(ApplicationType::Wcf));
    }
}
