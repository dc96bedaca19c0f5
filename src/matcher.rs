//! Intent-to-inbound matching.
//!
//! Matching is total over the candidate set: every inbound either produces a
//! `MatchResult`, a no-match reason, or is parked as pending because a required
//! parameter depends on a reference that has not been resolved yet.

use crate::model::{
    AdditionalParameters, ExtendedValue, Inbound, Intent, ParameterSpec, ReferenceValue, ValueFormat, ValueSpec,
    WILDCARD,
};
use crate::params::Params;
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// Intent parameter naming the preferred UI technology
pub const TECH_HINT_PARAM: &str = "sap-ui-tech-hint";

/// Parameter carrying an explicit numeric priority
pub const PRIORITY_PARAM: &str = "sap-priority";

/// Upper bound of every counter encoded in the priority string
const PRIORITY_FIELD_MAX: usize = 999;

/// Resolved reference values by reference name
pub type KnownReferences = BTreeMap<String, ReferenceValue>;

lazy_static! {
    /// Compiled `regexp` filters by pattern; `None` marks an invalid pattern
    static ref FILTER_PATTERNS: RwLock<HashMap<String, Option<Regex>>> = RwLock::new(HashMap::new());
}

// ============================================================================
// Match Types
// ============================================================================

/// One inbound matched against an intent
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub inbound: Arc<Inbound>,
    /// Intent parameters plus every applied default
    pub intent_params_plus_all_defaults: Params,
    /// Names whose value came purely from a default, sorted
    pub defaulted_param_names: Vec<String>,
    /// Extended defaults that travel through application state
    pub complex_defaults: BTreeMap<String, ExtendedValue>,
    /// Higher compares better
    pub priority_string: String,
    pub sap_priority: i64,
}

/// Outcome of one matching pass
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub match_results: Vec<MatchResult>,
    pub no_match_reasons: BTreeMap<String, String>,
    pub missing_references: BTreeSet<String>,
    /// Inbounds excluded only because a required parameter awaits a reference
    pub pending: Vec<Arc<Inbound>>,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    /// Exclude inbounds whose technology differs from `sap-ui-tech-hint`
    pub treat_tech_hint_as_filter: bool,
    /// Custom tiles only take part in tile resolution
    pub include_custom_tiles: bool,
    /// Candidate count above which inbounds are evaluated in parallel
    pub parallel_threshold: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            treat_tech_hint_as_filter: false,
            include_custom_tiles: false,
            parallel_threshold: usize::MAX,
        }
    }
}

enum Verdict {
    Match(MatchResult),
    NoMatch(String),
    Pending(String),
}

struct Evaluation {
    verdict: Verdict,
    missing: BTreeSet<String>,
}

/// Counters feeding the priority string
#[derive(Default)]
struct MatchCounts {
    matched: usize,
    matched_required: usize,
    matched_filters: usize,
    defaulted: usize,
    free: usize,
}

// ============================================================================
// Matching Logic
// ============================================================================

/// Match `intent` against every candidate.
///
/// With `known` unset this is the best-effort first pass: reference-typed
/// defaults and filters are recorded in `missing_references` instead of being
/// evaluated. With `known` set, references absent from the map are unresolvable.
pub fn match_inbounds(
    intent: &Intent,
    inbounds: &[Arc<Inbound>],
    known: Option<&KnownReferences>,
    options: &MatchOptions,
) -> MatchOutcome {
    let evaluations: Vec<Evaluation> = if inbounds.len() > options.parallel_threshold {
        inbounds
            .par_iter()
            .map(|inbound| match_one(intent, inbound, known, options))
            .collect()
    } else {
        inbounds
            .iter()
            .map(|inbound| match_one(intent, inbound, known, options))
            .collect()
    };

    let mut outcome = MatchOutcome::default();
    for (pos, (inbound, evaluation)) in inbounds.iter().zip(evaluations).enumerate() {
        outcome.missing_references.extend(evaluation.missing);
        match evaluation.verdict {
            Verdict::Match(result) => outcome.match_results.push(result),
            Verdict::NoMatch(reason) => {
                outcome
                    .no_match_reasons
                    .insert(format!("{:03} {}", pos, inbound), reason);
            }
            Verdict::Pending(reason) => {
                outcome
                    .no_match_reasons
                    .insert(format!("{:03} {}", pos, inbound), reason);
                outcome.pending.push(Arc::clone(inbound));
            }
        }
    }
    outcome
}

fn no_match(reason: String, missing: BTreeSet<String>) -> Evaluation {
    Evaluation {
        verdict: Verdict::NoMatch(reason),
        missing,
    }
}

fn match_one(
    intent: &Intent,
    inbound: &Arc<Inbound>,
    known: Option<&KnownReferences>,
    options: &MatchOptions,
) -> Evaluation {
    let mut missing = BTreeSet::new();

    if !options.include_custom_tiles && inbound.is_custom_tile() {
        return no_match("Inbound is a custom tile".to_string(), missing);
    }

    let wildcard_so = inbound.semantic_object == WILDCARD;
    if !intent.has_wildcard_semantic_object() && !wildcard_so && inbound.semantic_object != intent.semantic_object {
        return no_match(
            format!(
                "Semantic object \"{}\" did not match \"{}\"",
                inbound.semantic_object, intent.semantic_object
            ),
            missing,
        );
    }

    let wildcard_action = inbound.action == WILDCARD;
    if !intent.has_wildcard_action() && !wildcard_action && inbound.action != intent.action {
        return no_match(
            format!("Action \"{}\" did not match \"{}\"", inbound.action, intent.action),
            missing,
        );
    }

    if let Some(form_factor) = intent.form_factor {
        if !inbound.device_types.supports(form_factor) {
            return no_match(
                format!("Form factor \"{}\" is not supported", form_factor.as_str()),
                missing,
            );
        }
    }

    let tech_hint = intent.params.first(TECH_HINT_PARAM);
    let inbound_tech = inbound.application_type().and_then(|t| t.tech_hint());
    let tech_matches = tech_hint.map(|hint| Some(hint) == inbound_tech).unwrap_or(true);
    if options.treat_tech_hint_as_filter && !tech_matches {
        return no_match(
            format!(
                "Technology \"{}\" did not match tech hint \"{}\"",
                inbound_tech.unwrap_or("<none>"),
                tech_hint.unwrap_or_default()
            ),
            missing,
        );
    }

    let signature = &inbound.signature;
    let mut params = Params::new();
    let mut defaulted_param_names = Vec::new();
    let mut complex_defaults = BTreeMap::new();
    let mut counts = MatchCounts::default();

    for (name, spec) in &signature.parameters {
        match intent.params.get(name) {
            Some(values) => {
                if let Some(filter) = &spec.filter {
                    let value = values.first().map(String::as_str).unwrap_or("");
                    match check_filter(name, filter, value, known, &mut missing) {
                        Ok(()) => counts.matched_filters += 1,
                        Err(reason) => return no_match(reason, missing),
                    }
                }
                counts.matched += 1;
                if spec.required {
                    counts.matched_required += 1;
                }
                params.insert(name.clone(), values.clone());
            }
            None => match apply_default(name, spec, known, &mut missing) {
                DefaultOutcome::Simple(value) => {
                    params.set(name.clone(), value);
                    defaulted_param_names.push(name.clone());
                    counts.defaulted += 1;
                }
                DefaultOutcome::Extended(value) => {
                    complex_defaults.insert(name.clone(), value);
                    defaulted_param_names.push(name.clone());
                    counts.defaulted += 1;
                }
                DefaultOutcome::Pending(reference) if spec.required => {
                    return Evaluation {
                        verdict: Verdict::Pending(format!(
                            "Required parameter \"{}\" depends on unresolved reference \"{}\"",
                            name, reference
                        )),
                        missing,
                    };
                }
                DefaultOutcome::Pending(_) => {}
                DefaultOutcome::Absent if spec.required => {
                    return no_match(format!("Missing required parameter \"{}\"", name), missing);
                }
                DefaultOutcome::Absent => {}
            },
        }
    }

    for (name, values) in &intent.params {
        if signature.parameters.contains_key(name) {
            continue;
        }
        let technical = name.starts_with("sap-");
        match signature.additional_parameters {
            AdditionalParameters::Allowed => {
                params.insert(name.clone(), values.clone());
                counts.free += 1;
            }
            AdditionalParameters::Ignored if technical => {
                params.insert(name.clone(), values.clone());
            }
            AdditionalParameters::Ignored => {}
            AdditionalParameters::NotAllowed if technical => {
                params.insert(name.clone(), values.clone());
            }
            AdditionalParameters::NotAllowed => {
                return no_match(
                    format!("Additional parameter \"{}\" is not allowed", name),
                    missing,
                );
            }
        }
    }

    defaulted_param_names.sort();
    let sap_priority = match params.first(PRIORITY_PARAM).map(str::trim) {
        None | Some("") => 0,
        Some(v) => v.parse::<i64>().unwrap_or_else(|_| {
            debug!(
                "Ignoring non-numeric {} \"{}\" for {}-{}",
                PRIORITY_PARAM, v, inbound.semantic_object, inbound.action
            );
            0
        }),
    };
    let priority_string = priority_string(tech_matches, !wildcard_so, !wildcard_action, &counts);

    Evaluation {
        verdict: Verdict::Match(MatchResult {
            inbound: Arc::clone(inbound),
            intent_params_plus_all_defaults: params,
            defaulted_param_names,
            complex_defaults,
            priority_string,
            sap_priority,
        }),
        missing,
    }
}

/// Priority string: every field is fixed-width so lexicographic order equals
/// field-wise numeric order, and higher is better.
fn priority_string(tech_matches: bool, specific_so: bool, specific_action: bool, counts: &MatchCounts) -> String {
    let cap = |n: usize| n.min(PRIORITY_FIELD_MAX);
    format!(
        "x TECM={} SO={} ACT={} MTCH={:03} MREQ={:03} NFIL={:03} NDEF={:03} RFRE={:03}",
        u8::from(tech_matches),
        u8::from(specific_so),
        u8::from(specific_action),
        cap(counts.matched),
        cap(counts.matched_required),
        cap(counts.matched_filters),
        PRIORITY_FIELD_MAX - cap(counts.defaulted),
        PRIORITY_FIELD_MAX - cap(counts.free),
    )
}

/// Anchored regex for a `regexp` filter, compiled once per pattern
fn filter_pattern(pattern: &str) -> Option<Regex> {
    if let Some(cached) = FILTER_PATTERNS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(pattern)
    {
        return cached.clone();
    }

    let compiled = match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Invalid filter pattern \"{}\": {}", pattern, e);
            None
        }
    };
    FILTER_PATTERNS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(pattern.to_string())
        .or_insert(compiled)
        .clone()
}

fn check_filter(
    name: &str,
    filter: &ValueSpec,
    value: &str,
    known: Option<&KnownReferences>,
    missing: &mut BTreeSet<String>,
) -> Result<(), String> {
    match filter.format {
        ValueFormat::Plain => {
            if value == filter.value {
                Ok(())
            } else {
                Err(format!(
                    "Parameter \"{}\" value \"{}\" did not match filter \"{}\"",
                    name, value, filter.value
                ))
            }
        }
        ValueFormat::Regexp => match filter_pattern(&filter.value) {
            Some(re) if re.is_match(value) => Ok(()),
            Some(_) => Err(format!(
                "Parameter \"{}\" value \"{}\" did not match pattern \"{}\"",
                name, value, filter.value
            )),
            None => Err(format!("Parameter \"{}\" has an invalid filter pattern", name)),
        },
        ValueFormat::Reference => match known {
            None => {
                missing.insert(filter.value.clone());
                Ok(())
            }
            Some(known) => match known.get(&filter.value) {
                Some(ReferenceValue::Simple(expected)) if expected == value => Ok(()),
                Some(_) => Err(format!(
                    "Parameter \"{}\" value \"{}\" did not match reference \"{}\"",
                    name, value, filter.value
                )),
                None => Err(format!(
                    "Filter reference \"{}\" of parameter \"{}\" could not be resolved",
                    filter.value, name
                )),
            },
        },
    }
}

enum DefaultOutcome {
    Simple(String),
    Extended(ExtendedValue),
    /// Waiting for the named reference
    Pending(String),
    Absent,
}

fn apply_default(
    name: &str,
    spec: &ParameterSpec,
    known: Option<&KnownReferences>,
    missing: &mut BTreeSet<String>,
) -> DefaultOutcome {
    let Some(default) = &spec.default_value else {
        return DefaultOutcome::Absent;
    };
    match default.format {
        ValueFormat::Plain => DefaultOutcome::Simple(default.value.clone()),
        ValueFormat::Regexp => {
            warn!("Ignoring regexp default value of parameter {}", name);
            DefaultOutcome::Absent
        }
        ValueFormat::Reference => match known {
            None => {
                missing.insert(default.value.clone());
                DefaultOutcome::Pending(default.value.clone())
            }
            Some(known) => match known.get(&default.value) {
                Some(ReferenceValue::Simple(v)) if !v.is_empty() => DefaultOutcome::Simple(v.clone()),
                Some(ReferenceValue::Extended(ev)) if !ev.ranges.is_empty() => DefaultOutcome::Extended(ev.clone()),
                _ => DefaultOutcome::Absent,
            },
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
