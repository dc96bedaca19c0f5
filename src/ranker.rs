//! Deterministic ordering of match results.
//!
//! Order: `sap-priority` descending, then priority string descending, then the
//! canonical serialization ascending so equal-priority results never reorder.

use crate::matcher::MatchResult;
use crate::model::Inbound;
use crate::params::Params;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalMatch<'a> {
    inbound: &'a Inbound,
    intent_params_plus_all_defaults: &'a Params,
    defaulted_param_names: &'a [String],
}

/// Canonical JSON form of a match result used as the last tie-breaker
pub fn serialize_match_result(result: &MatchResult) -> String {
    serde_json::to_string(&CanonicalMatch {
        inbound: &result.inbound,
        intent_params_plus_all_defaults: &result.intent_params_plus_all_defaults,
        defaulted_param_names: &result.defaulted_param_names,
    })
    .unwrap_or_default()
}

fn compare(a: &(MatchResult, String), b: &(MatchResult, String)) -> Ordering {
    b.0.sap_priority
        .cmp(&a.0.sap_priority)
        .then_with(|| b.0.priority_string.cmp(&a.0.priority_string))
        .then_with(|| a.1.cmp(&b.1))
}

/// Sort match results best first.
pub fn sort_match_results(results: Vec<MatchResult>) -> Vec<MatchResult> {
    let mut keyed: Vec<(MatchResult, String)> = results
        .into_iter()
        .map(|r| {
            let key = serialize_match_result(&r);
            (r, key)
        })
        .collect();
    keyed.sort_by(compare);
    keyed.into_iter().map(|(r, _)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn result(title: &str, priority: &str, sap_priority: i64) -> MatchResult {
        let mut inbound = Inbound::new("Obj", "display");
        inbound.title = title.to_string();
        MatchResult {
            inbound: Arc::new(inbound),
            intent_params_plus_all_defaults: Params::new(),
            defaulted_param_names: vec![],
            complex_defaults: BTreeMap::new(),
            priority_string: priority.to_string(),
            sap_priority,
        }
    }

    fn titles(results: &[MatchResult]) -> Vec<&str> {
        results.iter().map(|r| r.inbound.title.as_str()).collect()
    }

    #[test]
    fn test_sap_priority_dominates_priority_string() {
        let sorted = sort_match_results(vec![
            result("high-string", "x TECM=1", 0),
            result("explicit", "x TECM=0", 5),
            result("negative", "x TECM=1", -1),
        ]);
        assert_eq!(titles(&sorted), vec!["explicit", "high-string", "negative"]);
    }

    #[test]
    fn test_ties_break_on_serialization() {
        let a = vec![result("b", "x", 0), result("a", "x", 0)];
        let b = vec![result("a", "x", 0), result("b", "x", 0)];
        assert_eq!(titles(&sort_match_results(a)), titles(&sort_match_results(b)));
    }
}
