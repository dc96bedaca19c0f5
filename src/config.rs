//! Resolver configuration: feature flags gating local resolution strategies and
//! the environment the resolver runs in.

use crate::error::{ResolveError, Result};
use crate::model::FormFactor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// Constants
// ============================================================================

/// Language used for `sap-language` when neither the alias nor the user supply one
pub const DEFAULT_LANGUAGE: &str = "en";

/// Above this many candidates the matcher evaluates inbounds in parallel
const DEFAULT_PARALLEL_MATCH_THRESHOLD: usize = 256;

// ============================================================================
// Configuration
// ============================================================================

/// In-place navigation switches for classic UI technologies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InPlaceForClassicUis {
    #[serde(rename = "GUI", default)]
    pub gui: bool,
    #[serde(rename = "WDA", default)]
    pub wda: bool,
    #[serde(rename = "WCF", default)]
    pub wcf: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverConfig {
    /// Construct Web Dynpro URLs locally instead of asking the fallback
    pub enable_wda_local_resolution: bool,

    /// Construct gateway-wrapped transaction URLs locally
    pub enable_webgui_local_resolution: bool,

    /// Construct native transaction URLs locally
    pub enable_native_webgui_local_resolution: bool,

    #[serde(rename = "enableInPlaceForClassicUIs")]
    pub enable_in_place_for_classic_uis: InPlaceForClassicUis,

    /// Form factor of the running device; intents are matched against it
    pub form_factor: FormFactor,

    /// User language, used when a system alias does not carry one
    pub default_language: String,

    pub parallel_match_threshold: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enable_wda_local_resolution: true,
            enable_webgui_local_resolution: true,
            enable_native_webgui_local_resolution: true,
            enable_in_place_for_classic_uis: InPlaceForClassicUis::default(),
            form_factor: FormFactor::Desktop,
            default_language: DEFAULT_LANGUAGE.to_string(),
            parallel_match_threshold: DEFAULT_PARALLEL_MATCH_THRESHOLD,
        }
    }
}

impl ResolverConfig {
    /// Load a configuration file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ResolveError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}
