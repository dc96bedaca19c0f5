//! In-memory and file-backed collaborators.
//!
//! The command-line tool runs the resolver against JSON files with these;
//! tests use them as fixtures.

use crate::app_state::{AppState, AppStateStore};
use crate::catalogue::{InboundCatalogue, Segment};
use crate::error::{ResolveError, Result};
use crate::matcher::KnownReferences;
use crate::model::{Inbound, WILDCARD};
use crate::references::ReferenceResolver;
use crate::system_alias::SystemAliasAdapter;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| ResolveError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}

// ============================================================================
// Catalogue
// ============================================================================

/// Catalogue over a fixed inbound list
pub struct StaticCatalogue {
    inbounds: Vec<Inbound>,
    segmented: bool,
}

impl StaticCatalogue {
    pub fn new(inbounds: Vec<Inbound>) -> Self {
        Self {
            inbounds,
            segmented: false,
        }
    }

    /// Serve segment restrictions instead of always returning everything
    pub fn with_segmented_access(mut self) -> Self {
        self.segmented = true;
        self
    }

    /// Load a JSON array of inbounds, or an object with an `inbounds` array.
    pub fn load(path: &Path) -> Result<Self> {
        let value = read_json(path)?;
        let list = match value {
            Value::Object(mut object) => object.remove("inbounds").unwrap_or(Value::Array(Vec::new())),
            other => other,
        };
        let inbounds: Vec<Inbound> = serde_json::from_value(list)?;
        debug!("Read {} inbounds from {}", inbounds.len(), path.display());
        Ok(Self::new(inbounds))
    }
}

fn in_segment(inbound: &Inbound, segment: &Segment) -> bool {
    let field_matches = |declared: &str, wanted: &str| declared == wanted || declared == WILDCARD || wanted == WILDCARD;
    field_matches(&inbound.semantic_object, &segment.semantic_object) && field_matches(&inbound.action, &segment.action)
}

#[async_trait]
impl InboundCatalogue for StaticCatalogue {
    async fn get_inbounds(&self, segments: Option<&[Segment]>) -> Result<Vec<Inbound>> {
        match segments.filter(|_| self.segmented) {
            Some(segments) => Ok(self
                .inbounds
                .iter()
                .filter(|inbound| segments.iter().any(|s| in_segment(inbound, s)))
                .cloned()
                .collect()),
            None => Ok(self.inbounds.clone()),
        }
    }

    fn has_segmented_access(&self) -> bool {
        self.segmented
    }
}

// ============================================================================
// System Aliases
// ============================================================================

/// System alias data keyed by alias name
#[derive(Debug, Clone, Default)]
pub struct StaticSystemAliases {
    aliases: HashMap<String, Value>,
}

impl StaticSystemAliases {
    /// Aliases from a JSON object `{alias: data}`. Data is validated on use.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Ok(Self {
                aliases: object.into_iter().collect(),
            }),
            other => Err(ResolveError::InvalidArguments(format!(
                "System alias file must hold an object keyed by alias, found {}",
                other
            ))),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_value(read_json(path)?)
    }
}

#[async_trait]
impl SystemAliasAdapter for StaticSystemAliases {
    async fn resolve_system_alias(&self, alias: &str) -> Result<Value> {
        self.aliases
            .get(alias)
            .cloned()
            .ok_or_else(|| ResolveError::SystemAlias(format!("Cannot resolve system alias '{}'", alias)))
    }
}

// ============================================================================
// References
// ============================================================================

/// Reference values known up front, e.g. the user defaults of one user
#[derive(Debug, Clone, Default)]
pub struct StaticReferenceResolver {
    values: KnownReferences,
}

impl StaticReferenceResolver {
    pub fn new(values: KnownReferences) -> Self {
        Self { values }
    }

    /// Load `{"UserDefault.X": "value", "UserDefault.extended.Y": {"Ranges": [...]}}`
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(serde_json::from_value(read_json(path)?)?))
    }
}

#[async_trait]
impl ReferenceResolver for StaticReferenceResolver {
    async fn resolve_references(&self, names: &[String]) -> Result<KnownReferences> {
        Ok(names
            .iter()
            .filter_map(|name| self.values.get(name).map(|value| (name.clone(), value.clone())))
            .collect())
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Process-local application state store
#[derive(Debug, Default)]
pub struct InMemoryAppStateStore {
    states: RwLock<HashMap<String, AppState>>,
    sequence: AtomicU64,
}

impl InMemoryAppStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_key(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("AS{}{:04}", Utc::now().format("%Y%m%d%H%M%S%3f"), sequence)
    }
}

#[async_trait]
impl AppStateStore for InMemoryAppStateStore {
    async fn get_app_state(&self, key: &str) -> Result<AppState> {
        match self.states.read().await.get(key) {
            Some(state) => Ok(state.clone()),
            None => {
                warn!("Application state {} not found", key);
                Ok(AppState::new(key))
            }
        }
    }

    async fn create_empty_app_state(&self) -> Result<AppState> {
        Ok(AppState::new(self.next_key()))
    }

    async fn save(&self, state: &AppState) -> Result<()> {
        self.states.write().await.insert(state.key.clone(), state.clone());
        Ok(())
    }
}
