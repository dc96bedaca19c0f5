//! Navigation mode computation: how the shell should open a resolved target.

use crate::config::InPlaceForClassicUis;
use crate::model::ApplicationType;
use serde::{Deserialize, Serialize};

/// Parameter naming the navigation mode for the next navigation only
pub const NEXT_NAV_MODE_PARAM: &str = "sap-ushell-next-navmode";

/// Parameter carrying an external navigation mode (`inplace`, `explace`)
pub const NAV_MODE_PARAM: &str = "sap-ushell-navmode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationMode {
    Embedded,
    NewWindow,
    NewWindowThenEmbedded,
}

impl NavigationMode {
    fn from_internal(s: &str) -> Option<Self> {
        match s {
            "embedded" => Some(NavigationMode::Embedded),
            "newWindow" => Some(NavigationMode::NewWindow),
            "newWindowThenEmbedded" => Some(NavigationMode::NewWindowThenEmbedded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationModeProperties {
    pub navigation_mode: Option<NavigationMode>,
    pub explicit_nav_mode: bool,
}

/// Navigation mode implied by an application type alone
pub fn default_navigation_mode(
    application_type: Option<&ApplicationType>,
    in_place: &InPlaceForClassicUis,
) -> Option<NavigationMode> {
    let classic = |enabled: bool| {
        if enabled {
            NavigationMode::Embedded
        } else {
            NavigationMode::NewWindowThenEmbedded
        }
    };
    match application_type? {
        ApplicationType::Sapui5 => Some(NavigationMode::Embedded),
        ApplicationType::Url => Some(NavigationMode::NewWindow),
        ApplicationType::Wda => Some(classic(in_place.wda)),
        ApplicationType::Tr | ApplicationType::Nwbc => Some(classic(in_place.gui)),
        ApplicationType::Wcf => Some(classic(in_place.wcf)),
        ApplicationType::Other(_) => None,
    }
}

/// Compute the navigation mode of a target.
///
/// `next_nav_mode` must name an internal mode to take effect; `nav_mode` accepts
/// the external values `inplace` and `explace`. Both mark the result as explicit.
pub fn compute(
    application_type: Option<&ApplicationType>,
    next_nav_mode: Option<&str>,
    nav_mode: Option<&str>,
    in_place: &InPlaceForClassicUis,
) -> NavigationModeProperties {
    if let Some(mode) = next_nav_mode.and_then(NavigationMode::from_internal) {
        return NavigationModeProperties {
            navigation_mode: Some(mode),
            explicit_nav_mode: true,
        };
    }

    let implicit = default_navigation_mode(application_type, in_place);
    let explicit = match (nav_mode, application_type) {
        (Some("inplace"), Some(ApplicationType::Url)) => None,
        (Some("inplace"), Some(_)) => Some(NavigationMode::Embedded),
        (Some("explace"), Some(ApplicationType::Url)) => Some(NavigationMode::NewWindow),
        (Some("explace"), Some(ApplicationType::Other(_))) => None,
        (Some("explace"), Some(_)) => Some(NavigationMode::NewWindowThenEmbedded),
        _ => None,
    };

    match explicit {
        Some(mode) => NavigationModeProperties {
            navigation_mode: Some(mode),
            explicit_nav_mode: true,
        },
        None => NavigationModeProperties {
            navigation_mode: implicit,
            explicit_nav_mode: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_technology() {
        let flags = InPlaceForClassicUis::default();
        let ui5 = compute(Some(&ApplicationType::Sapui5), None, None, &flags);
        assert_eq!(ui5.navigation_mode, Some(NavigationMode::Embedded));
        assert!(!ui5.explicit_nav_mode);

        let gui = compute(Some(&ApplicationType::Tr), None, None, &flags);
        assert_eq!(gui.navigation_mode, Some(NavigationMode::NewWindowThenEmbedded));

        let url = compute(Some(&ApplicationType::Url), None, None, &flags);
        assert_eq!(url.navigation_mode, Some(NavigationMode::NewWindow));
    }

    #[test]
    fn test_in_place_flag_embeds_classic_ui() {
        let flags = InPlaceForClassicUis {
            wda: true,
            ..Default::default()
        };
        let wda = compute(Some(&ApplicationType::Wda), None, None, &flags);
        assert_eq!(wda.navigation_mode, Some(NavigationMode::Embedded));
    }

    #[test]
    fn test_explicit_modes() {
        let flags = InPlaceForClassicUis::default();
        let explace = compute(Some(&ApplicationType::Sapui5), None, Some("explace"), &flags);
        assert_eq!(explace.navigation_mode, Some(NavigationMode::NewWindowThenEmbedded));
        assert!(explace.explicit_nav_mode);

        let next = compute(Some(&ApplicationType::Sapui5), Some("newWindow"), Some("inplace"), &flags);
        assert_eq!(next.navigation_mode, Some(NavigationMode::NewWindow));

        let ignored = compute(Some(&ApplicationType::Sapui5), Some("bogus"), None, &flags);
        assert_eq!(ignored.navigation_mode, Some(NavigationMode::Embedded));
        assert!(!ignored.explicit_nav_mode);
    }
}
