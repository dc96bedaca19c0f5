//! Reference values (user defaults and similar) resolved by an external collaborator.

use crate::error::{ResolveError, Result};
use crate::index::InboundIndex;
use crate::matcher::KnownReferences;
use crate::model::{Inbound, ValueFormat};
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Prefix of references served by the user default service
pub const USER_DEFAULT_PREFIX: &str = "UserDefault.";

/// Prefix of user default references carrying extended (range) values
pub const EXTENDED_USER_DEFAULT_PREFIX: &str = "UserDefault.extended.";

#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Resolve the named references. Names without a value are simply absent
    /// from the returned map.
    async fn resolve_references(&self, names: &[String]) -> Result<KnownReferences>;
}

/// Resolve `missing` through `resolver`, keeping only the requested names.
pub async fn resolve_missing(
    resolver: Option<&dyn ReferenceResolver>,
    missing: &BTreeSet<String>,
) -> Result<KnownReferences> {
    if missing.is_empty() {
        return Ok(KnownReferences::new());
    }
    let Some(resolver) = resolver else {
        return Err(ResolveError::ReferenceResolution(
            "no reference resolver configured".to_string(),
        ));
    };

    let names: Vec<String> = missing.iter().cloned().collect();
    debug!("Resolving {} references: {:?}", names.len(), names);
    let mut known = resolver.resolve_references(&names).await?;
    known.retain(|name, _| {
        let requested = missing.contains(name);
        if !requested {
            warn!("Ignoring unrequested reference {}", name);
        }
        requested
    });
    Ok(known)
}

/// Names of user default parameters referenced anywhere in the catalogue.
/// Serialized as `{"simple": {"Name": {}}, "extended": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserDefaultParameterNames {
    #[serde(serialize_with = "serialize_name_set")]
    pub simple: BTreeSet<String>,
    #[serde(serialize_with = "serialize_name_set")]
    pub extended: BTreeSet<String>,
}

fn serialize_name_set<S: Serializer>(names: &BTreeSet<String>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(names.iter().map(|n| (n, serde_json::Map::new())))
}

impl UserDefaultParameterNames {
    fn add_reference(&mut self, reference: &str) {
        if let Some(name) = reference.strip_prefix(EXTENDED_USER_DEFAULT_PREFIX) {
            self.extended.insert(name.to_string());
        } else if let Some(name) = reference.strip_prefix(USER_DEFAULT_PREFIX) {
            self.simple.insert(name.to_string());
        }
    }

    fn add_inbound(&mut self, inbound: &Inbound) {
        for spec in inbound.signature.parameters.values() {
            for value in [spec.default_value.as_ref(), spec.filter.as_ref()].into_iter().flatten() {
                if value.format == ValueFormat::Reference {
                    self.add_reference(&value.value);
                }
            }
        }
    }
}

pub fn user_default_parameter_names(index: &InboundIndex) -> UserDefaultParameterNames {
    let mut names = UserDefaultParameterNames::default();
    for inbound in index.all() {
        names.add_inbound(inbound);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParameterSpec, ReferenceValue, ValueSpec};

    struct FixedResolver;

    #[async_trait]
    impl ReferenceResolver for FixedResolver {
        async fn resolve_references(&self, _names: &[String]) -> Result<KnownReferences> {
            let mut known = KnownReferences::new();
            known.insert("UserDefault.CompanyCode".to_string(), ReferenceValue::from("1000"));
            known.insert("UserDefault.Plant".to_string(), ReferenceValue::from("P1"));
            Ok(known)
        }
    }

    #[tokio::test]
    async fn test_resolve_missing_keeps_requested_names() {
        let missing: BTreeSet<String> = ["UserDefault.CompanyCode".to_string()].into_iter().collect();
        let known = resolve_missing(Some(&FixedResolver), &missing).await.unwrap();
        assert_eq!(known.len(), 1);
        assert!(known.contains_key("UserDefault.CompanyCode"));
    }

    #[tokio::test]
    async fn test_resolve_missing_without_resolver() {
        assert!(resolve_missing(None, &BTreeSet::new()).await.unwrap().is_empty());
        let missing: BTreeSet<String> = ["UserDefault.X".to_string()].into_iter().collect();
        assert!(matches!(
            resolve_missing(None, &missing).await,
            Err(ResolveError::ReferenceResolution(_))
        ));
    }

    #[test]
    fn test_user_default_parameter_names() {
        let mut inbound = Inbound::new("Obj", "display");
        inbound.signature.parameters.insert(
            "CompanyCode".to_string(),
            ParameterSpec {
                default_value: Some(ValueSpec::reference("UserDefault.CompanyCode")),
                ..Default::default()
            },
        );
        inbound.signature.parameters.insert(
            "Plant".to_string(),
            ParameterSpec {
                default_value: Some(ValueSpec::reference("UserDefault.extended.Plant")),
                filter: Some(ValueSpec::reference("UserDefault.Plant")),
                ..Default::default()
            },
        );
        inbound.signature.parameters.insert(
            "Other".to_string(),
            ParameterSpec {
                default_value: Some(ValueSpec::reference("MachineContext.Id")),
                ..Default::default()
            },
        );
        let index = InboundIndex::new(vec![inbound]);
        let names = user_default_parameter_names(&index);
        assert_eq!(
            serde_json::to_value(&names).unwrap()["extended"],
            serde_json::json!({"Plant": {}})
        );
        assert_eq!(
            names.simple.into_iter().collect::<Vec<_>>(),
            vec!["CompanyCode".to_string(), "Plant".to_string()]
        );
    }
}
