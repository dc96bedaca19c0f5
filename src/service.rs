//! Entry points of the resolver.
//!
//! Every entry point runs the same matching pipeline: find matching inbounds,
//! resolve the references the first pass asked for, rematch with their values
//! and sort the survivors best first.

use crate::app_state::AppStateStore;
use crate::catalogue::{InboundCatalogue, InboundProvider, Segment};
use crate::config::ResolverConfig;
use crate::construct::fallback::FallbackResolver;
use crate::construct::{native_webgui, sapui5, wda, ConstructContext};
use crate::dispatch::{self, ResolutionKind};
use crate::error::{ResolveError, Result};
use crate::hash::{fix_hash_fragment, parse_shell_hash};
use crate::index::{InboundIndex, SHELL_SEMANTIC_OBJECT, START_GUI_ACTION, START_URL_ACTION, START_WDA_ACTION};
use crate::mapper::{map_and_merge, MatchingTarget};
use crate::matcher::{match_inbounds, MatchOptions, MatchResult};
use crate::model::{
    AdditionalParameters, ApplicationType, Inbound, Intent, ResolutionResult, TileResolution, TAG_PARAMETER, WILDCARD,
};
use crate::navigation::{self, NAV_MODE_PARAM, NEXT_NAV_MODE_PARAM};
use crate::params::Params;
use crate::ranker::{serialize_match_result, sort_match_results};
use crate::references::{resolve_missing, user_default_parameter_names, ReferenceResolver, UserDefaultParameterNames};
use crate::system_alias::SystemAliasBridge;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// System parameter of easy access menu inbounds
const SAP_SYSTEM_PARAM: &str = "sap-system";

/// Prefix of platform parameters; they never count as used link parameters
const PLATFORM_PARAM_PREFIX: &str = "sap-";

// ============================================================================
// Link Queries
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSort {
    #[default]
    Intent,
    Text,
    /// Ranker order
    Priority,
}

/// Constraint on a signature parameter a link target must declare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamOption {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkQuery {
    /// `None` or empty matches every semantic object
    pub semantic_object: Option<String>,
    pub action: Option<String>,
    pub params: Params,
    pub ignore_form_factor: bool,
    /// Restrict candidates to inbounds carrying one of these tags
    pub tags: Option<Vec<String>>,
    pub params_options: Vec<ParamOption>,
    pub with_at_least_one_used_param: bool,
    pub treat_tech_hint_as_filter: bool,
    pub sort_results_by: LinkSort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub intent: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Supported {
    pub supported: bool,
}

// ============================================================================
// Easy Access Menus
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EasyAccessMenu {
    #[default]
    SapMenu,
    UserMenu,
}

impl EasyAccessMenu {
    /// Title priority and application type of the actions shown in this menu
    fn action(&self, action: &str) -> Option<(u8, &'static str)> {
        match (self, action) {
            (_, START_GUI_ACTION) => Some((3, "TR")),
            (_, START_WDA_ACTION) => Some((2, "WDA")),
            (EasyAccessMenu::UserMenu, START_URL_ACTION) => Some((1, "URL")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EasyAccessSystem {
    pub text: String,
    pub app_type: BTreeMap<String, bool>,
}

// ============================================================================
// Service
// ============================================================================

/// Candidates and options for one run of the matching pipeline
struct MatchScope<'a> {
    tags: Option<&'a [String]>,
    options: MatchOptions,
}

pub struct TargetResolutionService {
    config: ResolverConfig,
    provider: InboundProvider,
    bridge: SystemAliasBridge,
    references: Option<Arc<dyn ReferenceResolver>>,
    app_state: Option<Arc<dyn AppStateStore>>,
    fallback: Option<Arc<dyn FallbackResolver>>,
    log_id: AtomicU64,
}

impl TargetResolutionService {
    pub fn new(config: ResolverConfig, catalogue: Arc<dyn InboundCatalogue>, bridge: SystemAliasBridge) -> Self {
        Self {
            config,
            provider: InboundProvider::new(catalogue),
            bridge,
            references: None,
            app_state: None,
            fallback: None,
            log_id: AtomicU64::new(0),
        }
    }

    pub fn with_reference_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.references = Some(resolver);
        self
    }

    pub fn with_app_state_store(mut self, store: Arc<dyn AppStateStore>) -> Self {
        self.app_state = Some(store);
        self
    }

    pub fn with_fallback_resolver(mut self, fallback: Arc<dyn FallbackResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn match_options(&self, treat_tech_hint_as_filter: bool, include_custom_tiles: bool) -> MatchOptions {
        MatchOptions {
            treat_tech_hint_as_filter,
            include_custom_tiles,
            parallel_threshold: self.config.parallel_match_threshold,
        }
    }

    async fn index_for(&self, intents: &[&Intent]) -> Result<Arc<InboundIndex>> {
        if intents.iter().any(|i| i.has_wildcard_semantic_object()) {
            return self.provider.get_index(None).await;
        }
        let segments: Vec<Segment> = intents
            .iter()
            .map(|i| Segment {
                semantic_object: i.semantic_object.clone(),
                action: if i.has_wildcard_action() {
                    WILDCARD.to_string()
                } else {
                    i.action.clone()
                },
            })
            .collect();
        self.provider.get_index(Some(&segments)).await
    }

    // ========================================================================
    // Matching Pipeline
    // ========================================================================

    /// Sorted match results for `intent`; empty when nothing matches or the
    /// references cannot be resolved.
    async fn get_matching_targets(&self, intent: &Intent, index: &InboundIndex, scope: MatchScope<'_>) -> Vec<MatchResult> {
        let log_id = self.log_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.run_stages(intent, index, scope)
            .instrument(info_span!("match_intent", log_id))
            .await
    }

    async fn run_stages(&self, intent: &Intent, index: &InboundIndex, scope: MatchScope<'_>) -> Vec<MatchResult> {
        info!(
            "Matching #{}-{} (form factor {})",
            intent.semantic_object,
            intent.action,
            intent.form_factor.map(|f| f.as_str()).unwrap_or("<any>")
        );
        let candidates = match scope.tags {
            Some(tags) => index.segment_by_tags(tags),
            None => index.segment(&intent.semantic_object, &intent.action),
        };

        debug!("STAGE1: Find matching inbounds among {} candidates", candidates.len());
        let first = match_inbounds(intent, &candidates, None, &scope.options);
        for (inbound, reason) in &first.no_match_reasons {
            debug!("No match {}: {}", inbound, reason);
        }
        for result in &first.match_results {
            debug!("Matched {}", result.inbound);
        }

        let results = if first.missing_references.is_empty() {
            debug!("STAGE2: Resolve references (nothing to resolve)");
            first.match_results
        } else {
            debug!("STAGE2: Resolve references {:?}", first.missing_references);
            let known = match resolve_missing(self.references.as_deref(), &first.missing_references).await {
                Ok(known) => known,
                Err(e) => {
                    warn!("Giving up on #{}-{}: {}", intent.semantic_object, intent.action, e);
                    return Vec::new();
                }
            };

            let rematch: Vec<Arc<Inbound>> = first
                .match_results
                .iter()
                .map(|r| Arc::clone(&r.inbound))
                .chain(first.pending.iter().cloned())
                .collect();
            debug!("STAGE3: Rematch with references ({} inbounds)", rematch.len());
            let second = match_inbounds(intent, &rematch, Some(&known), &scope.options);
            for (inbound, reason) in &second.no_match_reasons {
                debug!("No match after rematch {}: {}", inbound, reason);
            }
            second.match_results
        };

        debug!("STAGE4: Sort matched targets ({})", results.len());
        let sorted = sort_match_results(results);
        for result in &sorted {
            debug!(
                "sap-priority {} | {} | {}",
                result.sap_priority,
                result.priority_string,
                serialize_match_result(result)
            );
        }
        sorted
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    fn parse_for_device(&self, fixed_hash: &str) -> Result<Intent> {
        Ok(parse_shell_hash(fixed_hash)?.with_form_factor(Some(self.config.form_factor)))
    }

    /// Resolve a hash fragment to the launch descriptor of its best target.
    pub async fn resolve_hash_fragment(&self, hash: &str) -> Result<ResolutionResult> {
        let fixed = fix_hash_fragment(hash);
        let intent = self.parse_for_device(&fixed)?;
        let index = self.index_for(&[&intent]).await?;

        let scope = MatchScope {
            tags: None,
            options: self.match_options(false, false),
        };
        let Some(best) = self.get_matching_targets(&intent, &index, scope).await.into_iter().next() else {
            warn!("Could not resolve {}", fixed);
            return Err(ResolveError::NoMatch);
        };
        let target = map_and_merge(best, self.app_state.as_deref()).await?;
        debug!("Resolving {} with {}", fixed, target.inbound);

        self.construct_result(&intent, &target, &fixed).await
    }

    /// Resolve a tile intent. Custom tiles take part in matching.
    pub async fn resolve_tile_intent(&self, hash: &str) -> Result<TileResolution> {
        let fixed = fix_hash_fragment(hash);
        let intent = self.parse_for_device(&fixed)?;
        let index = self.index_for(&[&intent]).await?;

        let scope = MatchScope {
            tags: None,
            options: self.match_options(false, true),
        };
        let Some(best) = self.get_matching_targets(&intent, &index, scope).await.into_iter().next() else {
            warn!("Could not resolve tile {}", fixed);
            return Err(ResolveError::NoTileMatch);
        };
        let mut target = map_and_merge(best, self.app_state.as_deref()).await?;
        target.intent_params_plus_all_defaults.remove(TAG_PARAMETER);
        target.mapped_intent_params_plus_simple_defaults.remove(TAG_PARAMETER);
        target.mapped_defaulted_param_names.retain(|name| name != TAG_PARAMETER);

        let result = self.construct_result(&intent, &target, &fixed).await?;
        let startup_parameters = (target.inbound.application_type() == Some(&ApplicationType::Sapui5))
            .then(|| sapui5::effective_parameters(&target).0);

        Ok(TileResolution {
            tile: target.inbound.tile_resolution_result.clone().unwrap_or_default(),
            startup_parameters,
            navigation_mode: result.navigation_mode,
        })
    }

    async fn construct_result(&self, intent: &Intent, target: &MatchingTarget, fixed_hash: &str) -> Result<ResolutionResult> {
        let inbound = &target.inbound;
        let mut result = if inbound.semantic_object == SHELL_SEMANTIC_OBJECT
            && (inbound.action == START_GUI_ACTION || inbound.action == START_WDA_ACTION)
        {
            self.resolve_easy_access_intent(intent, target).await?
        } else {
            let ctx = ConstructContext {
                bridge: &self.bridge,
                fallback: self.fallback.as_deref(),
                hash_fragment: fixed_hash,
            };
            dispatch::construct(ResolutionKind::of(inbound, &self.config), target, &ctx).await?
        };

        let params = &target.intent_params_plus_all_defaults;
        let mode = navigation::compute(
            result.application_type.as_ref(),
            params.first(NEXT_NAV_MODE_PARAM),
            params.first(NAV_MODE_PARAM),
            &self.config.enable_in_place_for_classic_uis,
        );
        result.navigation_mode = mode.navigation_mode;
        result.explicit_nav_mode = mode.explicit_nav_mode;
        Ok(result)
    }

    async fn resolve_easy_access_intent(&self, intent: &Intent, target: &MatchingTarget) -> Result<ResolutionResult> {
        match intent.action.as_str() {
            START_GUI_ACTION => native_webgui::resolve_start_gui(intent, target, &self.bridge).await,
            START_WDA_ACTION => wda::resolve_start_wda(intent, target, &self.bridge).await,
            other => Err(ResolveError::EasyAccess(format!("{}-{}", intent.semantic_object, other))),
        }
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Distinct, visible intents matching `query`.
    pub async fn get_links(&self, query: &LinkQuery) -> Result<Vec<Link>> {
        if query.semantic_object.as_deref() == Some("") {
            return Err(ResolveError::InvalidArguments("invalid semantic object".to_string()));
        }
        if query.action.as_deref() == Some("") {
            return Err(ResolveError::InvalidArguments("invalid action".to_string()));
        }
        if query.semantic_object.as_deref() == Some(WILDCARD) {
            return Ok(Vec::new());
        }

        let form_factor = (!query.ignore_form_factor).then_some(self.config.form_factor);
        let intent = Intent::new(
            query.semantic_object.clone().unwrap_or_default(),
            query.action.clone().unwrap_or_default(),
            query.params.clone(),
        )
        .with_form_factor(form_factor);

        let index = match query.tags {
            Some(_) => self.provider.get_index(None).await?,
            None => self.index_for(&[&intent]).await?,
        };
        let scope = MatchScope {
            tags: query.tags.as_deref(),
            options: self.match_options(query.treat_tech_hint_as_filter, false),
        };
        let results = self.get_matching_targets(&intent, &index, scope).await;

        let mut seen = BTreeSet::new();
        let mut links = Vec::new();
        for result in &results {
            let inbound = &result.inbound;
            let semantic_object = match query.semantic_object.as_deref() {
                Some(so) => so,
                None => inbound.semantic_object.as_str(),
            };
            if semantic_object == WILDCARD || inbound.action == WILDCARD || inbound.hide_intent_link {
                continue;
            }
            let intent_name = format!("#{}-{}", semantic_object, inbound.action);
            if !seen.insert(intent_name.clone()) {
                continue;
            }
            if let Some(link) = link_for(inbound, intent_name, query) {
                links.push(link);
            }
        }

        match query.sort_results_by {
            LinkSort::Intent => links.sort_by(|a, b| a.intent.cmp(&b.intent)),
            LinkSort::Text => links.sort_by(|a, b| a.text.cmp(&b.text)),
            LinkSort::Priority => {}
        }
        debug!("{} links found", links.len());
        Ok(links)
    }

    /// Whether each intent resolves. Any unparsable intent fails the call.
    pub async fn is_intent_supported(&self, intents: &[String]) -> Result<BTreeMap<String, Supported>> {
        let mut parsed = Vec::new();
        let mut errors = Vec::new();
        let mut supported = BTreeMap::new();
        for raw in intents {
            if raw == "#" {
                supported.insert(raw.clone(), Supported { supported: true });
                continue;
            }
            match self.parse_for_device(&fix_hash_fragment(raw)) {
                Ok(intent) => parsed.push((raw, intent)),
                Err(e) => errors.push(e.to_string()),
            }
        }
        if !errors.is_empty() {
            return Err(ResolveError::InvalidArguments(format!(
                "One or more input intents contain errors: {}",
                errors.join(", ")
            )));
        }
        if parsed.is_empty() {
            return Ok(supported);
        }

        let all: Vec<&Intent> = parsed.iter().map(|(_, intent)| intent).collect();
        let index = self.index_for(&all).await?;
        for (raw, intent) in &parsed {
            let scope = MatchScope {
                tags: None,
                options: self.match_options(false, false),
            };
            let matched = !self.get_matching_targets(intent, &index, scope).await.is_empty();
            supported.insert((*raw).clone(), Supported { supported: matched });
        }
        Ok(supported)
    }

    // ========================================================================
    // Catalogue Queries
    // ========================================================================

    pub async fn get_distinct_semantic_objects(&self) -> Result<Vec<String>> {
        let index = self.provider.get_index(None).await?;
        let objects: BTreeSet<String> = index
            .all()
            .iter()
            .filter(|i| !i.semantic_object.is_empty() && i.semantic_object != WILDCARD && !i.hide_intent_link)
            .map(|i| i.semantic_object.clone())
            .collect();
        Ok(objects.into_iter().collect())
    }

    pub async fn get_user_default_parameter_names(&self) -> Result<UserDefaultParameterNames> {
        let index = self.provider.get_index(None).await?;
        Ok(user_default_parameter_names(&index))
    }

    /// Systems offered by an easy access menu, keyed by system name.
    pub async fn get_easy_access_systems(&self, menu: EasyAccessMenu) -> Result<BTreeMap<String, EasyAccessSystem>> {
        let index = self.provider.get_index(None).await?;
        let mut systems: BTreeMap<String, EasyAccessSystem> = BTreeMap::new();
        let mut priorities: BTreeMap<String, u8> = BTreeMap::new();

        for inbound in index.all() {
            if inbound.semantic_object != SHELL_SEMANTIC_OBJECT
                || !inbound.device_types.supports(self.config.form_factor)
            {
                continue;
            }
            let Some((priority, app_type)) = menu.action(&inbound.action) else {
                continue;
            };
            let system = inbound
                .signature
                .parameters
                .get(SAP_SYSTEM_PARAM)
                .and_then(|p| p.filter.as_ref())
                .map(|f| f.value.clone());
            let Some(system) = system else {
                warn!("Cannot extract sap-system from easy access menu inbound {}", inbound);
                continue;
            };

            let entry = systems.entry(system.clone()).or_default();
            if priorities.get(&system).map_or(true, |&p| p < priority) {
                entry.text = inbound.title.clone();
                priorities.insert(system, priority);
            }
            entry.app_type.insert(app_type.to_string(), true);
        }
        Ok(systems)
    }
}

/// Link for a matched inbound, or `None` when the query's parameter
/// constraints reject it
fn link_for(inbound: &Inbound, intent_name: String, query: &LinkQuery) -> Option<Link> {
    let signature = &inbound.signature;
    let mut needed = query.params.clone();
    if signature.additional_parameters == AdditionalParameters::Ignored {
        needed.retain(|name, _| name.starts_with(PLATFORM_PARAM_PREFIX) || signature.parameters.contains_key(name));
    }

    if query.with_at_least_one_used_param && !needed.names().any(|n| !n.starts_with(PLATFORM_PARAM_PREFIX)) {
        return None;
    }
    let options_met = query.params_options.iter().all(|option| {
        signature
            .parameters
            .get(&option.name)
            .is_some_and(|spec| spec.required == option.required)
    });
    if !options_met {
        return None;
    }

    let query_string = needed.to_query_string();
    let tag = signature
        .parameters
        .get(TAG_PARAMETER)
        .and_then(|p| p.default_value.as_ref())
        .map(|d| vec![d.value.clone()]);
    Some(Link {
        intent: if query_string.is_empty() {
            intent_name
        } else {
            format!("{}?{}", intent_name, query_string)
        },
        text: inbound.title.clone(),
        icon: inbound.icon.clone(),
        sub_title: inbound.sub_title.clone(),
        short_title: inbound.short_title.clone(),
        tags: tag,
    })
}
