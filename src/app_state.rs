//! Application state: opaque keyed records whose `selectionVariant` member
//! carries parameters and select options across navigation.

use crate::error::Result;
use crate::model::SelectOptionRange;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Intent parameter carrying the key of a cross-application state
pub const XAPP_STATE_PARAM: &str = "sap-xapp-state";

/// Member of the state data holding the selection variant
pub const SELECTION_VARIANT_KEY: &str = "selectionVariant";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub key: String,
    /// `None` for a freshly created state
    pub data: Option<Value>,
}

impl AppState {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: None,
        }
    }
}

#[async_trait]
pub trait AppStateStore: Send + Sync {
    /// Load a state. Unknown keys yield a state without data.
    async fn get_app_state(&self, key: &str) -> Result<AppState>;

    /// Allocate a new state under a fresh key
    async fn create_empty_app_state(&self) -> Result<AppState>;

    async fn save(&self, state: &AppState) -> Result<()>;
}

// ============================================================================
// Selection Variant
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvParameter {
    #[serde(rename = "PropertyName")]
    pub property_name: String,
    #[serde(rename = "PropertyValue", default)]
    pub property_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvSelectOption {
    #[serde(rename = "PropertyName")]
    pub property_name: String,
    #[serde(rename = "Ranges", default)]
    pub ranges: Vec<SelectOptionRange>,
}

/// Selection variant; members other than parameters and select options are kept verbatim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionVariant {
    #[serde(rename = "Parameters", default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SvParameter>,
    #[serde(rename = "SelectOptions", default, skip_serializing_if = "Vec::is_empty")]
    pub select_options: Vec<SvSelectOption>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl SelectionVariant {
    /// Parse the `selectionVariant` member of state data; absent or malformed yields empty.
    pub fn from_state_data(data: &Map<String, Value>) -> Self {
        match data.get(SELECTION_VARIANT_KEY) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!("Ignoring malformed selection variant: {}", e);
                SelectionVariant::default()
            }),
            None => SelectionVariant::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.select_options.is_empty()
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.property_name.as_str())
    }

    pub fn select_option_names(&self) -> impl Iterator<Item = &str> {
        self.select_options.iter().map(|s| s.property_name.as_str())
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.parameter_names().any(|n| n == name) || self.select_option_names().any(|n| n == name)
    }

    /// Add ranges to a select option, creating it when absent
    pub fn mass_add_select_option(&mut self, name: &str, ranges: &[SelectOptionRange]) {
        match self.select_options.iter_mut().find(|s| s.property_name == name) {
            Some(existing) => existing.ranges.extend(ranges.iter().cloned()),
            None => self.select_options.push(SvSelectOption {
                property_name: name.to_string(),
                ranges: ranges.to_vec(),
            }),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_variant() -> SelectionVariant {
        let data = json!({
            "selectionVariant": {
                "Parameters": [{"PropertyName": "P1", "PropertyValue": "v1"}],
                "SelectOptions": [{"PropertyName": "S1", "Ranges": [{"Sign": "I", "Option": "EQ", "Low": "a"}]}],
                "SelectionVariantID": "42"
            }
        });
        SelectionVariant::from_state_data(data.as_object().unwrap())
    }

    #[test]
    fn test_parse_keeps_unknown_members() {
        let sv = create_test_variant();
        assert!(sv.has_property("P1"));
        assert!(sv.has_property("S1"));
        assert_eq!(sv.to_value()["SelectionVariantID"], json!("42"));
    }

    #[test]
    fn test_mass_add_select_option_appends() {
        let mut sv = create_test_variant();
        sv.mass_add_select_option("S1", &[SelectOptionRange::eq_value("b")]);
        sv.mass_add_select_option("S2", &[SelectOptionRange::eq_value("c")]);
        assert_eq!(sv.select_options[0].ranges.len(), 2);
        assert_eq!(sv.select_options[1].property_name, "S2");
    }

    #[test]
    fn test_malformed_variant_is_empty() {
        let data = json!({"selectionVariant": "oops"});
        assert!(SelectionVariant::from_state_data(data.as_object().unwrap()).is_empty());
    }
}
