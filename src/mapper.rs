//! Parameter renaming and application state merging for a matched inbound.
//!
//! Every stage takes a `MatchingTarget` by value and hands back the new one.
//! Application states are never modified in place: merging always writes a
//! fresh state and swaps its key into the parameter sets.

use crate::app_state::{
    AppState, AppStateStore, SelectionVariant, SvParameter, SvSelectOption, SELECTION_VARIANT_KEY, XAPP_STATE_PARAM,
};
use crate::error::Result;
use crate::matcher::MatchResult;
use crate::model::{AdditionalParameters, ExtendedValue, Inbound, Signature, TAG_PARAMETER};
use crate::params::Params;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A match result on its way to URL construction
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingTarget {
    pub inbound: Arc<Inbound>,
    pub intent_params_plus_all_defaults: Params,
    pub defaulted_param_names: Vec<String>,
    /// Extended defaults the matcher produced
    pub complex_defaults: BTreeMap<String, ExtendedValue>,
    /// Extended defaults still to be written into application state
    pub new_app_state_members: BTreeMap<String, ExtendedValue>,
    pub mapped_intent_params_plus_simple_defaults: Params,
    pub mapped_defaulted_param_names: Vec<String>,
}

impl From<MatchResult> for MatchingTarget {
    fn from(result: MatchResult) -> Self {
        Self {
            inbound: result.inbound,
            mapped_intent_params_plus_simple_defaults: result.intent_params_plus_all_defaults.clone(),
            mapped_defaulted_param_names: result.defaulted_param_names.clone(),
            intent_params_plus_all_defaults: result.intent_params_plus_all_defaults,
            defaulted_param_names: result.defaulted_param_names,
            new_app_state_members: result.complex_defaults.clone(),
            complex_defaults: result.complex_defaults,
        }
    }
}

// ============================================================================
// Renaming
// ============================================================================

/// Rename parameters per the signature's `renameTo`.
///
/// Names are visited in sorted order; when two names map to the same target
/// the first one wins and the collision is logged.
pub fn map_parameter_names(signature: &Signature, params: &Params) -> Params {
    let mut mapped = Params::new();
    for (name, values) in params {
        let new_name = signature.renamed(name);
        if mapped.contains(&new_name) {
            error!(
                "Renaming of parameter {} to {} collides with an existing parameter, dropping it",
                name, new_name
            );
            continue;
        }
        mapped.insert(new_name, values.clone());
    }
    mapped
}

/// Renamed defaulted names, deduplicated and sorted
pub fn map_default_parameter_names(signature: &Signature, defaulted: &[String]) -> Vec<String> {
    let mut mapped = BTreeSet::new();
    for name in defaulted {
        let new_name = signature.renamed(name);
        if !mapped.insert(new_name.clone()) {
            error!("Renaming of defaulted parameter names creates duplicates {} -> {}", name, new_name);
        }
    }
    mapped.into_iter().collect()
}

/// For each declared parameter, the property names whose presence in an
/// existing selection variant makes an extended default for it redundant
pub fn dominator_map(signature: &Signature) -> BTreeMap<String, BTreeSet<String>> {
    let targets: BTreeMap<&String, String> = signature
        .parameters
        .keys()
        .map(|name| (name, signature.renamed(name)))
        .collect();

    targets
        .iter()
        .map(|(name, target)| {
            let mut dominated_by: BTreeSet<String> = targets
                .iter()
                .filter(|(_, t)| *t == target)
                .map(|(n, _)| (*n).clone())
                .collect();
            dominated_by.insert(target.clone());
            ((*name).clone(), dominated_by)
        })
        .collect()
}

// ============================================================================
// Application State Merge
// ============================================================================

#[derive(Debug, Default)]
struct ChangeRecord {
    changed: bool,
    deleted: bool,
}

/// Rebuild the variant with renamed properties. Under `ignore_undeclared`,
/// properties the signature does not declare are dropped.
fn rename_and_remove_duplicates(
    variant: &SelectionVariant,
    signature: &Signature,
    ignore_undeclared: bool,
) -> (SelectionVariant, ChangeRecord) {
    let mut record = ChangeRecord::default();
    let mut result = SelectionVariant {
        other: variant.other.clone(),
        ..Default::default()
    };

    for parameter in &variant.parameters {
        let spec = signature.parameters.get(&parameter.property_name);
        if ignore_undeclared && spec.is_none() {
            record.deleted = true;
            continue;
        }
        let rename_to = spec.and_then(|s| s.rename_to.as_deref());
        let name = rename_to.unwrap_or(&parameter.property_name);
        if result.has_property(name) {
            if rename_to.is_some() {
                error!("Renaming of app state creates duplicates {} -> {}", parameter.property_name, name);
            }
            continue;
        }
        result.parameters.push(SvParameter {
            property_name: name.to_string(),
            property_value: parameter.property_value.clone(),
        });
        record.changed |= rename_to.is_some();
    }

    for option in &variant.select_options {
        let spec = signature.parameters.get(&option.property_name);
        if ignore_undeclared && spec.is_none() {
            record.deleted = true;
            continue;
        }
        let rename_to = spec.and_then(|s| s.rename_to.as_deref());
        let name = rename_to.unwrap_or(&option.property_name);
        if result.has_property(name) {
            if rename_to.is_some() {
                error!("Renaming of app state creates duplicates {} -> {}", option.property_name, name);
            }
            continue;
        }
        result.select_options.push(SvSelectOption {
            property_name: name.to_string(),
            ranges: option.ranges.clone(),
        });
        record.changed |= rename_to.is_some();
    }

    (result, record)
}

/// Rename parameters and merge extended defaults into application state.
///
/// A new state is created when extended defaults remain to be stored or a
/// rename applies to an existing state. If nothing effectively changed, the
/// original state key is kept.
pub async fn map_and_merge(result: MatchResult, store: Option<&dyn AppStateStore>) -> Result<MatchingTarget> {
    let mut target = MatchingTarget::from(result);
    target.mapped_intent_params_plus_simple_defaults =
        map_parameter_names(&target.inbound.signature, &target.intent_params_plus_all_defaults);

    let has_rename = target.inbound.signature.has_rename_to();
    if !target.new_app_state_members.is_empty() || has_rename {
        target = match store {
            Some(store) => merge_app_state(target, store, has_rename).await?,
            None => {
                if !target.new_app_state_members.is_empty() {
                    warn!("No application state store available, dropping extended defaults");
                    target.new_app_state_members.clear();
                }
                target
            }
        };
    }

    Ok(cleanup(target))
}

async fn merge_app_state(
    mut target: MatchingTarget,
    store: &dyn AppStateStore,
    has_rename: bool,
) -> Result<MatchingTarget> {
    let source_key = target
        .intent_params_plus_all_defaults
        .first(XAPP_STATE_PARAM)
        .map(str::to_string);

    let Some(source_key) = source_key else {
        if target.new_app_state_members.is_empty() {
            return Ok(target);
        }
        let new_state = store.create_empty_app_state().await?;
        return write_merged_state(target, store, new_state, Map::new()).await;
    };

    let source = store.get_app_state(&source_key).await?;
    let data = match source.data {
        None => Map::new(),
        Some(Value::Object(data)) => data,
        Some(_) => {
            warn!("Application state {} holds no object, keeping it unchanged", source_key);
            target.new_app_state_members.clear();
            return Ok(target);
        }
    };

    let existing = SelectionVariant::from_state_data(&data);
    let dominators = dominator_map(&target.inbound.signature);
    target.new_app_state_members.retain(|name, _| {
        let dominated = dominators
            .get(name)
            .map(|names| names.iter().any(|n| existing.has_property(n)))
            .unwrap_or(false);
        if dominated {
            debug!("Extended default {} is dominated by application state {}", name, source_key);
        }
        !dominated
    });

    if target.new_app_state_members.is_empty() && !has_rename {
        return Ok(target);
    }
    let new_state = store.create_empty_app_state().await?;
    write_merged_state(target, store, new_state, data).await
}

async fn write_merged_state(
    mut target: MatchingTarget,
    store: &dyn AppStateStore,
    mut new_state: AppState,
    mut data: Map<String, Value>,
) -> Result<MatchingTarget> {
    let mut variant = SelectionVariant::from_state_data(&data);
    for (name, value) in &target.new_app_state_members {
        variant.mass_add_select_option(name, &value.ranges);
    }

    let signature = &target.inbound.signature;
    let ignore_undeclared = signature.additional_parameters == AdditionalParameters::Ignored;
    let (variant, record) = rename_and_remove_duplicates(&variant, signature, ignore_undeclared);

    if !variant.is_empty() || record.deleted {
        data.insert(SELECTION_VARIANT_KEY.to_string(), variant.to_value());
    }

    if !record.changed && !record.deleted && target.new_app_state_members.is_empty() {
        debug!("Application state unchanged, keeping the original key");
        return Ok(target);
    }

    new_state.data = Some(Value::Object(data));
    store.save(&new_state).await?;
    debug!("Saved merged application state {}", new_state.key);
    target
        .intent_params_plus_all_defaults
        .set(XAPP_STATE_PARAM, new_state.key.clone());
    target
        .mapped_intent_params_plus_simple_defaults
        .set(XAPP_STATE_PARAM, new_state.key);
    Ok(target)
}

/// Drop defaulted names of extended defaults that did not make it into
/// application state, rename the defaulted names and strip `sap-tag`.
fn cleanup(mut target: MatchingTarget) -> MatchingTarget {
    let complex = &target.complex_defaults;
    let members = &target.new_app_state_members;
    target
        .defaulted_param_names
        .retain(|name| !complex.contains_key(name) || members.contains_key(name));

    target.defaulted_param_names.retain(|n| n != TAG_PARAMETER);
    target.intent_params_plus_all_defaults.remove(TAG_PARAMETER);
    target.mapped_intent_params_plus_simple_defaults.remove(TAG_PARAMETER);

    target.mapped_defaulted_param_names =
        map_default_parameter_names(&target.inbound.signature, &target.defaulted_param_names);
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryAppStateStore;
    use crate::model::{ParameterSpec, SelectOptionRange};
    use serde_json::json;

    fn renaming_inbound() -> Arc<Inbound> {
        let mut inbound = Inbound::new("Obj", "display");
        inbound.signature.parameters.insert(
            "A".to_string(),
            ParameterSpec {
                rename_to: Some("AA".to_string()),
                ..Default::default()
            },
        );
        inbound.signature.parameters.insert(
            "Plant".to_string(),
            ParameterSpec {
                rename_to: Some("Werk".to_string()),
                ..Default::default()
            },
        );
        Arc::new(inbound)
    }

    fn match_result(inbound: Arc<Inbound>, params: Params, defaulted: &[&str]) -> MatchResult {
        MatchResult {
            inbound,
            intent_params_plus_all_defaults: params,
            defaulted_param_names: defaulted.iter().map(|s| s.to_string()).collect(),
            complex_defaults: BTreeMap::new(),
            priority_string: String::new(),
            sap_priority: 0,
        }
    }

    #[test]
    fn test_map_parameter_names_first_wins() {
        let inbound = renaming_inbound();
        let mut params = Params::new();
        params.set("A", "1");
        params.set("AA", "2");
        params.set("B", "3");
        let mapped = map_parameter_names(&inbound.signature, &params);
        assert_eq!(mapped.first("AA"), Some("1"));
        assert_eq!(mapped.first("B"), Some("3"));
        assert!(!mapped.contains("A"));
        assert_eq!(mapped.len(), 2);
    }

    #[test]
    fn test_map_default_parameter_names_sorted_and_deduped() {
        let inbound = renaming_inbound();
        let names = vec!["Z".to_string(), "A".to_string(), "AA".to_string()];
        assert_eq!(
            map_default_parameter_names(&inbound.signature, &names),
            vec!["AA".to_string(), "Z".to_string()]
        );
    }

    #[test]
    fn test_dominator_map_groups_rename_targets() {
        let mut signature = renaming_inbound().signature.clone();
        signature.parameters.insert(
            "B".to_string(),
            ParameterSpec {
                rename_to: Some("AA".to_string()),
                ..Default::default()
            },
        );
        let map = dominator_map(&signature);
        let expected: BTreeSet<String> = ["A", "AA", "B"].iter().map(|s| s.to_string()).collect();
        assert_eq!(map["A"], expected);
        assert_eq!(map["Plant"].len(), 2);
    }

    #[tokio::test]
    async fn test_extended_default_creates_new_state() {
        let store = InMemoryAppStateStore::new();
        let mut result = match_result(renaming_inbound(), Params::new(), &["Plant", "sap-tag"]);
        result.complex_defaults.insert(
            "Plant".to_string(),
            ExtendedValue {
                ranges: vec![SelectOptionRange::eq_value("P1")],
            },
        );

        let target = map_and_merge(result, Some(&store)).await.unwrap();
        let key = target.intent_params_plus_all_defaults.first(XAPP_STATE_PARAM).unwrap();
        assert_eq!(target.mapped_intent_params_plus_simple_defaults.first(XAPP_STATE_PARAM), Some(key));
        assert_eq!(target.mapped_defaulted_param_names, vec!["Werk".to_string()]);

        let saved = store.get_app_state(key).await.unwrap();
        let data = saved.data.unwrap();
        assert_eq!(data["selectionVariant"]["SelectOptions"][0]["PropertyName"], json!("Werk"));
    }

    #[tokio::test]
    async fn test_dominated_extended_default_is_dropped() {
        let store = InMemoryAppStateStore::new();
        let mut existing = AppState::new("EXISTING");
        existing.data = Some(json!({
            "selectionVariant": {"Parameters": [{"PropertyName": "Plant", "PropertyValue": "P9"}]}
        }));
        store.save(&existing).await.unwrap();

        let mut inbound = Inbound::new("Obj", "display");
        inbound.signature.parameters.insert("Plant".to_string(), ParameterSpec::default());
        let mut params = Params::new();
        params.set(XAPP_STATE_PARAM, "EXISTING");
        let mut result = match_result(Arc::new(inbound), params, &["Plant"]);
        result.complex_defaults.insert(
            "Plant".to_string(),
            ExtendedValue {
                ranges: vec![SelectOptionRange::eq_value("P1")],
            },
        );

        let target = map_and_merge(result, Some(&store)).await.unwrap();
        assert!(target.new_app_state_members.is_empty());
        assert_eq!(target.intent_params_plus_all_defaults.first(XAPP_STATE_PARAM), Some("EXISTING"));
        assert!(target.mapped_defaulted_param_names.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_state_data_keeps_key_and_drops_members() {
        let store = InMemoryAppStateStore::new();
        let mut existing = AppState::new("BROKEN");
        existing.data = Some(json!("not an object"));
        store.save(&existing).await.unwrap();

        let mut params = Params::new();
        params.set(XAPP_STATE_PARAM, "BROKEN");
        let mut result = match_result(renaming_inbound(), params, &["Plant"]);
        result.complex_defaults.insert("Plant".to_string(), ExtendedValue::default());

        let target = map_and_merge(result, Some(&store)).await.unwrap();
        assert_eq!(target.intent_params_plus_all_defaults.first(XAPP_STATE_PARAM), Some("BROKEN"));
        assert!(target.new_app_state_members.is_empty());
        assert!(target.defaulted_param_names.is_empty());
    }

    #[tokio::test]
    async fn test_rename_in_existing_state() {
        let store = InMemoryAppStateStore::new();
        let mut existing = AppState::new("SRC");
        existing.data = Some(json!({
            "selectionVariant": {
                "SelectOptions": [{"PropertyName": "Plant", "Ranges": [{"Sign": "I", "Option": "EQ", "Low": "1"}]}],
                "Text": "kept"
            },
            "customData": 1
        }));
        store.save(&existing).await.unwrap();

        let mut params = Params::new();
        params.set(XAPP_STATE_PARAM, "SRC");
        let target = map_and_merge(match_result(renaming_inbound(), params, &[]), Some(&store))
            .await
            .unwrap();
        let key = target.intent_params_plus_all_defaults.first(XAPP_STATE_PARAM).unwrap();
        assert_ne!(key, "SRC");
        let data = store.get_app_state(key).await.unwrap().data.unwrap();
        assert_eq!(data["selectionVariant"]["SelectOptions"][0]["PropertyName"], json!("Werk"));
        assert_eq!(data["selectionVariant"]["Text"], json!("kept"));
        assert_eq!(data["customData"], json!(1));
    }

    #[tokio::test]
    async fn test_mapping_twice_changes_nothing() {
        let store = InMemoryAppStateStore::new();
        let mut params = Params::new();
        params.set("A", "1");
        let mut result = match_result(renaming_inbound(), params, &["Plant"]);
        result.complex_defaults.insert(
            "Plant".to_string(),
            ExtendedValue {
                ranges: vec![SelectOptionRange::eq_value("P1")],
            },
        );
        let first = map_and_merge(result, Some(&store)).await.unwrap();

        let first_key = first
            .mapped_intent_params_plus_simple_defaults
            .first(XAPP_STATE_PARAM)
            .map(str::to_string);
        assert!(first_key.is_some());
        assert_eq!(first.mapped_intent_params_plus_simple_defaults.first("AA"), Some("1"));

        // map the already mapped target again
        let again = MatchResult {
            inbound: Arc::clone(&first.inbound),
            intent_params_plus_all_defaults: first.mapped_intent_params_plus_simple_defaults.clone(),
            defaulted_param_names: first.mapped_defaulted_param_names.clone(),
            complex_defaults: BTreeMap::new(),
            priority_string: String::new(),
            sap_priority: 0,
        };
        let second = map_and_merge(again, Some(&store)).await.unwrap();
        assert_eq!(
            second.mapped_intent_params_plus_simple_defaults,
            first.mapped_intent_params_plus_simple_defaults
        );
        assert_eq!(second.mapped_defaulted_param_names, first.mapped_defaulted_param_names);
        assert_eq!(
            second
                .mapped_intent_params_plus_simple_defaults
                .first(XAPP_STATE_PARAM)
                .map(str::to_string),
            first_key
        );
    }
}
