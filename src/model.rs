//! Data model shared by the pipeline: intents, inbounds with their signatures and
//! resolution templates, and the resolution results handed back to callers.

use crate::navigation::NavigationMode;
use crate::params::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Wildcard accepted for semantic objects and actions
pub const WILDCARD: &str = "*";

/// Signature parameter whose plain default value carries the inbound's tags
pub const TAG_PARAMETER: &str = "sap-tag";

fn is_false(b: &bool) -> bool {
    !*b
}

// ============================================================================
// Intent
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    Desktop,
    Tablet,
    Phone,
}

impl FormFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormFactor::Desktop => "desktop",
            FormFactor::Tablet => "tablet",
            FormFactor::Phone => "phone",
        }
    }
}

/// A parsed navigation intent. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub semantic_object: String,
    pub action: String,
    pub context_raw: Option<String>,
    /// `None` matches any form factor
    pub form_factor: Option<FormFactor>,
    pub params: Params,
    pub app_specific_route: Option<String>,
}

impl Intent {
    pub fn new(semantic_object: impl Into<String>, action: impl Into<String>, params: Params) -> Self {
        Self {
            semantic_object: semantic_object.into(),
            action: action.into(),
            context_raw: None,
            form_factor: None,
            params,
            app_specific_route: None,
        }
    }

    pub fn with_form_factor(mut self, form_factor: Option<FormFactor>) -> Self {
        self.form_factor = form_factor;
        self
    }

    pub fn has_wildcard_semantic_object(&self) -> bool {
        self.semantic_object.is_empty() || self.semantic_object == WILDCARD
    }

    pub fn has_wildcard_action(&self) -> bool {
        self.action.is_empty() || self.action == WILDCARD
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Form factors an inbound applies to; every form factor when absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceTypes {
    pub desktop: bool,
    pub tablet: bool,
    pub phone: bool,
}

impl Default for DeviceTypes {
    fn default() -> Self {
        Self {
            desktop: true,
            tablet: true,
            phone: true,
        }
    }
}

impl DeviceTypes {
    pub fn supports(&self, form_factor: FormFactor) -> bool {
        match form_factor {
            FormFactor::Desktop => self.desktop,
            FormFactor::Tablet => self.tablet,
            FormFactor::Phone => self.phone,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    #[default]
    Plain,
    /// Pattern matched against the whole value
    Regexp,
    /// Name of an externally resolved value, e.g. `UserDefault.CompanyCode`
    Reference,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSpec {
    #[serde(default)]
    pub format: ValueFormat,
    #[serde(default)]
    pub value: String,
}

impl ValueSpec {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            format: ValueFormat::Plain,
            value: value.into(),
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            format: ValueFormat::Reference,
            value: name.into(),
        }
    }

    pub fn regexp(pattern: impl Into<String>) -> Self {
        Self {
            format: ValueFormat::Regexp,
            value: pattern.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_to: Option<String>,
}

/// Policy for intent parameters the signature does not declare
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdditionalParameters {
    /// Passed through to the target
    #[default]
    Allowed,
    /// Accepted when matching but dropped from the parameter set
    Ignored,
    /// Any undeclared parameter rejects the inbound
    NotAllowed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub additional_parameters: AdditionalParameters,
}

impl Signature {
    pub fn has_rename_to(&self) -> bool {
        self.parameters.values().any(|p| p.rename_to.is_some())
    }

    /// Target name of a parameter after renaming
    pub fn renamed(&self, name: &str) -> String {
        self.parameters
            .get(name)
            .and_then(|p| p.rename_to.clone())
            .unwrap_or_else(|| name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApplicationType {
    Sapui5,
    Url,
    Wda,
    /// Native transaction
    Tr,
    Wcf,
    /// Classic UI hosted by the business client canvas
    Nwbc,
    Other(String),
}

impl ApplicationType {
    pub fn as_str(&self) -> &str {
        match self {
            ApplicationType::Sapui5 => "SAPUI5",
            ApplicationType::Url => "URL",
            ApplicationType::Wda => "WDA",
            ApplicationType::Tr => "TR",
            ApplicationType::Wcf => "WCF",
            ApplicationType::Nwbc => "NWBC",
            ApplicationType::Other(s) => s,
        }
    }

    /// Technology name used by `sap-ui-tech-hint`
    pub fn tech_hint(&self) -> Option<&'static str> {
        match self {
            ApplicationType::Sapui5 => Some("UI5"),
            ApplicationType::Wda => Some("WDA"),
            ApplicationType::Tr | ApplicationType::Nwbc => Some("GUI"),
            ApplicationType::Wcf => Some("WCF"),
            ApplicationType::Url => Some("URL"),
            ApplicationType::Other(_) => None,
        }
    }
}

impl From<String> for ApplicationType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "SAPUI5" => ApplicationType::Sapui5,
            "URL" => ApplicationType::Url,
            "WDA" => ApplicationType::Wda,
            "TR" => ApplicationType::Tr,
            "WCF" => ApplicationType::Wcf,
            "NWBC" => ApplicationType::Nwbc,
            _ => ApplicationType::Other(s),
        }
    }
}

impl From<ApplicationType> for String {
    fn from(t: ApplicationType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the inbound's system alias relates to its template URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemAliasSemantics {
    /// The URL has not been interpolated yet; the alias must be spliced in
    Apply,
    /// The URL was already interpolated with the alias and must be stripped first
    Applied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WdaTarget {
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuiTarget {
    pub transaction: String,
}

/// Resolution template declared by an inbound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionTemplate {
    pub application_type: ApplicationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_dependencies: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui5_component_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_alias_semantics: Option<SystemAliasSemantics>,
    #[serde(rename = "sap.wda", default, skip_serializing_if = "Option::is_none")]
    pub sap_wda: Option<WdaTarget>,
    #[serde(rename = "sap.gui", default, skip_serializing_if = "Option::is_none")]
    pub sap_gui: Option<GuiTarget>,
    #[serde(rename = "sap.platform.runtime", default, skip_serializing_if = "Option::is_none")]
    pub platform_runtime: Option<Value>,
}

impl ResolutionTemplate {
    pub fn new(application_type: ApplicationType, url: Option<&str>) -> Self {
        Self {
            application_type,
            url: url.map(str::to_string),
            additional_information: None,
            application_dependencies: None,
            ui5_component_name: None,
            text: None,
            system_alias: None,
            system_alias_semantics: None,
            sap_wda: None,
            sap_gui: None,
            platform_runtime: None,
        }
    }

    pub fn url_str(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }
}

/// Tile-specific resolution data; everything except `isCustomTile` is passed through
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileResolutionResult {
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_custom_tile: bool,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, Value>,
}

/// A registered target descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    pub semantic_object: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hide_intent_link: bool,
    #[serde(default)]
    pub device_types: DeviceTypes,
    #[serde(default)]
    pub signature: Signature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_result: Option<ResolutionTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_resolution_result: Option<TileResolutionResult>,
}

impl Inbound {
    pub fn new(semantic_object: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            semantic_object: semantic_object.into(),
            action: action.into(),
            id: None,
            title: String::new(),
            sub_title: None,
            short_title: None,
            icon: None,
            tags: Vec::new(),
            hide_intent_link: false,
            device_types: DeviceTypes::default(),
            signature: Signature::default(),
            resolution_result: None,
            tile_resolution_result: None,
        }
    }

    pub fn application_type(&self) -> Option<&ApplicationType> {
        self.resolution_result.as_ref().map(|r| &r.application_type)
    }

    pub fn is_custom_tile(&self) -> bool {
        self.tile_resolution_result
            .as_ref()
            .map(|t| t.is_custom_tile)
            .unwrap_or(false)
    }

    /// Declared tags plus the plain default value of `sap-tag`
    pub fn tags(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        if let Some(spec) = self
            .signature
            .parameters
            .get(TAG_PARAMETER)
            .and_then(|p| p.default_value.as_ref())
        {
            if spec.format == ValueFormat::Plain && !spec.value.is_empty() && !tags.contains(&spec.value) {
                tags.push(spec.value.clone());
            }
        }
        tags
    }
}

impl fmt::Display for Inbound {
    /// Compact form used in logs: `#SO-action{A, [B:default]}`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .signature
            .parameters
            .iter()
            .map(|(name, spec)| {
                let default = spec
                    .default_value
                    .as_ref()
                    .map(|d| format!(":{}", d.value))
                    .unwrap_or_default();
                if spec.required {
                    format!("{}{}", name, default)
                } else {
                    format!("[{}{}]", name, default)
                }
            })
            .collect();
        let extra = match self.signature.additional_parameters {
            AdditionalParameters::Allowed => "<+>",
            AdditionalParameters::Ignored => "<o>",
            AdditionalParameters::NotAllowed => "<->",
        };
        write!(
            f,
            "#{}-{}{{{}{}}}",
            self.semantic_object,
            self.action,
            params.join(", "),
            extra
        )
    }
}

// ============================================================================
// Reference values
// ============================================================================

/// One range of a multi-value select option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOptionRange {
    #[serde(rename = "Sign")]
    pub sign: String,
    #[serde(rename = "Option")]
    pub option: String,
    #[serde(rename = "Low")]
    pub low: String,
    #[serde(rename = "High", default, skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
}

impl SelectOptionRange {
    pub fn eq_value(value: impl Into<String>) -> Self {
        Self {
            sign: "I".to_string(),
            option: "EQ".to_string(),
            low: value.into(),
            high: None,
        }
    }
}

/// Structured default value that travels through application state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedValue {
    #[serde(rename = "Ranges", default)]
    pub ranges: Vec<SelectOptionRange>,
}

/// Value of a resolved reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReferenceValue {
    Simple(String),
    Extended(ExtendedValue),
}

impl From<&str> for ReferenceValue {
    fn from(s: &str) -> Self {
        ReferenceValue::Simple(s.to_string())
    }
}

// ============================================================================
// Resolution Result
// ============================================================================

/// The launch descriptor produced for a resolved intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_type: Option<ApplicationType>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_dependencies: Option<Value>,
    #[serde(rename = "sap-system", default, skip_serializing_if = "Option::is_none")]
    pub sap_system: Option<String>,
    #[serde(rename = "sap-system-src", default, skip_serializing_if = "Option::is_none")]
    pub sap_system_src: Option<String>,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub reserved_parameters: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui5_component_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_mode: Option<NavigationMode>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub explicit_nav_mode: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub full_width: bool,
    #[serde(rename = "sap.platform.runtime", default, skip_serializing_if = "Option::is_none")]
    pub platform_runtime: Option<Value>,
}

/// Result of tile intent resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileResolution {
    #[serde(flatten)]
    pub tile: TileResolutionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_parameters: Option<Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_mode: Option<NavigationMode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_deserializes_catalogue_shape() {
        let inbound: Inbound = serde_json::from_str(
            r#"{
                "semanticObject": "Action",
                "action": "toappnav",
                "title": "App Navigation",
                "deviceTypes": {"phone": false},
                "signature": {
                    "parameters": {
                        "A": {"required": true},
                        "B": {"defaultValue": {"value": "default1"}, "renameTo": "BB"}
                    },
                    "additionalParameters": "notallowed"
                },
                "resolutionResult": {
                    "applicationType": "SAPUI5",
                    "url": "/sap/bc/ui5_ui5/app",
                    "sap.wda": {"applicationId": "WDR_TEST"}
                }
            }"#,
        )
        .unwrap();

        assert!(inbound.device_types.desktop);
        assert!(!inbound.device_types.supports(FormFactor::Phone));
        assert_eq!(inbound.signature.additional_parameters, AdditionalParameters::NotAllowed);
        assert_eq!(inbound.signature.renamed("B"), "BB");
        assert_eq!(inbound.application_type(), Some(&ApplicationType::Sapui5));
        assert_eq!(
            inbound.resolution_result.as_ref().unwrap().sap_wda.as_ref().unwrap().application_id,
            "WDR_TEST"
        );
    }

    #[test]
    fn test_unknown_application_type_round_trips() {
        let t: ApplicationType = serde_json::from_str("\"SAPSCRIPT\"").unwrap();
        assert_eq!(t, ApplicationType::Other("SAPSCRIPT".to_string()));
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"SAPSCRIPT\"");
    }

    #[test]
    fn test_tags_include_sap_tag_default() {
        let mut inbound = Inbound::new("Obj", "display");
        inbound.tags = vec!["primary".to_string()];
        inbound.signature.parameters.insert(
            TAG_PARAMETER.to_string(),
            ParameterSpec {
                default_value: Some(ValueSpec::plain("superior")),
                ..Default::default()
            },
        );
        assert_eq!(inbound.tags(), vec!["primary".to_string(), "superior".to_string()]);
    }

    #[test]
    fn test_reference_value_untagged() {
        let simple: ReferenceValue = serde_json::from_str("\"1000\"").unwrap();
        assert_eq!(simple, ReferenceValue::Simple("1000".to_string()));
        let extended: ReferenceValue =
            serde_json::from_str(r#"{"Ranges":[{"Sign":"I","Option":"EQ","Low":"A"}]}"#).unwrap();
        assert_eq!(
            extended,
            ReferenceValue::Extended(ExtendedValue {
                ranges: vec![SelectOptionRange::eq_value("A")]
            })
        );
    }

    #[test]
    fn test_inbound_display_is_compact() {
        let mut inbound = Inbound::new("Obj", "display");
        inbound.signature.parameters.insert(
            "A".to_string(),
            ParameterSpec {
                required: true,
                ..Default::default()
            },
        );
        assert_eq!(inbound.to_string(), "#Obj-display{A<+>}");
    }
}
