//! Inbound index: candidate retrieval by semantic object, action and tag.
//!
//! The index is immutable after construction and shared read-only through `Arc`.
//! Virtual inbounds for the easy access menu intents are always included.

use crate::model::{
    AdditionalParameters, ApplicationType, Inbound, ParameterSpec, ResolutionTemplate, Signature, WILDCARD,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Semantic object of the shell's own intents
pub const SHELL_SEMANTIC_OBJECT: &str = "Shell";

/// Easy access actions served locally
pub const START_GUI_ACTION: &str = "startGUI";
pub const START_WDA_ACTION: &str = "startWDA";
pub const START_URL_ACTION: &str = "startURL";

#[derive(Debug, Default)]
pub struct InboundIndex {
    inbounds: Vec<Arc<Inbound>>,
    /// Semantic object -> positions in `inbounds`, wildcard inbounds under "*"
    by_semantic_object: HashMap<String, Vec<usize>>,
    /// Tag -> positions in `inbounds`
    by_tag: HashMap<String, Vec<usize>>,
}

impl InboundIndex {
    /// Build an index over `inbounds` plus the virtual inbounds.
    pub fn new(inbounds: Vec<Inbound>) -> Self {
        let mut all: Vec<Arc<Inbound>> = inbounds.into_iter().map(Arc::new).collect();
        all.extend(virtual_inbounds().into_iter().map(Arc::new));

        let mut by_semantic_object: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_tag: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, inbound) in all.iter().enumerate() {
            by_semantic_object
                .entry(inbound.semantic_object.clone())
                .or_default()
                .push(pos);
            for tag in inbound.tags() {
                by_tag.entry(tag).or_default().push(pos);
            }
        }

        Self {
            inbounds: all,
            by_semantic_object,
            by_tag,
        }
    }

    pub fn all(&self) -> &[Arc<Inbound>] {
        &self.inbounds
    }

    pub fn len(&self) -> usize {
        self.inbounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inbounds.is_empty()
    }

    /// Candidates for a semantic object and action, in catalogue order.
    ///
    /// A wildcard semantic object returns every inbound; otherwise inbounds
    /// declaring exactly that semantic object or the wildcard are returned.
    pub fn segment(&self, semantic_object: &str, action: &str) -> Vec<Arc<Inbound>> {
        if semantic_object.is_empty() || semantic_object == WILDCARD {
            return self.filter_action(self.inbounds.iter(), action);
        }

        let mut positions: Vec<usize> = self
            .by_semantic_object
            .get(semantic_object)
            .into_iter()
            .chain(self.by_semantic_object.get(WILDCARD))
            .flatten()
            .copied()
            .collect();
        positions.sort_unstable();

        self.filter_action(positions.iter().map(|&p| &self.inbounds[p]), action)
    }

    fn filter_action<'a>(
        &self,
        inbounds: impl Iterator<Item = &'a Arc<Inbound>>,
        action: &str,
    ) -> Vec<Arc<Inbound>> {
        let any_action = action.is_empty() || action == WILDCARD;
        inbounds
            .filter(|i| any_action || i.action == action || i.action == WILDCARD)
            .cloned()
            .collect()
    }

    /// Inbounds carrying at least one of `tags`, in catalogue order
    pub fn segment_by_tags(&self, tags: &[String]) -> Vec<Arc<Inbound>> {
        let positions: BTreeSet<usize> = tags
            .iter()
            .filter_map(|t| self.by_tag.get(t))
            .flatten()
            .copied()
            .collect();
        positions.into_iter().map(|p| Arc::clone(&self.inbounds[p])).collect()
    }
}

fn required() -> ParameterSpec {
    ParameterSpec {
        required: true,
        ..Default::default()
    }
}

fn optional() -> ParameterSpec {
    ParameterSpec::default()
}

/// Inbounds synthesized for the easy access menu intents
pub fn virtual_inbounds() -> Vec<Inbound> {
    let mut start_gui = Inbound::new(SHELL_SEMANTIC_OBJECT, START_GUI_ACTION);
    start_gui.title = "Start transaction".to_string();
    start_gui.hide_intent_link = true;
    start_gui.signature = Signature {
        parameters: [
            ("sap-system".to_string(), required()),
            ("sap-ui2-tcode".to_string(), required()),
        ]
        .into_iter()
        .collect(),
        additional_parameters: AdditionalParameters::Allowed,
    };
    start_gui.resolution_result = Some(ResolutionTemplate::new(ApplicationType::Tr, None));

    let mut start_wda = Inbound::new(SHELL_SEMANTIC_OBJECT, START_WDA_ACTION);
    start_wda.title = "Start Web Dynpro application".to_string();
    start_wda.hide_intent_link = true;
    start_wda.signature = Signature {
        parameters: [
            ("sap-system".to_string(), required()),
            ("sap-ui2-wd-app-id".to_string(), required()),
            ("sap-ui2-wd-conf-id".to_string(), optional()),
        ]
        .into_iter()
        .collect(),
        additional_parameters: AdditionalParameters::Allowed,
    };
    start_wda.resolution_result = Some(ResolutionTemplate::new(ApplicationType::Wda, None));

    vec![start_gui, start_wda]
}
