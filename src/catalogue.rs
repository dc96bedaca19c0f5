//! Inbound catalogue access. The provider fetches inbounds from the catalogue
//! collaborator once and keeps the built index until `refresh` is called.

use crate::error::Result;
use crate::index::InboundIndex;
use crate::model::Inbound;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A `(semanticObject, action)` restriction for segmented catalogue access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub semantic_object: String,
    pub action: String,
}

/// Source of raw inbound records
#[async_trait]
pub trait InboundCatalogue: Send + Sync {
    /// Fetch inbounds, restricted to `segments` when the catalogue supports it.
    async fn get_inbounds(&self, segments: Option<&[Segment]>) -> Result<Vec<Inbound>>;

    /// Whether `get_inbounds` honours segment restrictions
    fn has_segmented_access(&self) -> bool {
        false
    }
}

pub struct InboundProvider {
    catalogue: Arc<dyn InboundCatalogue>,
    full_index: RwLock<Option<Arc<InboundIndex>>>,
}

impl InboundProvider {
    pub fn new(catalogue: Arc<dyn InboundCatalogue>) -> Self {
        Self {
            catalogue,
            full_index: RwLock::new(None),
        }
    }

    pub fn has_segmented_access(&self) -> bool {
        self.catalogue.has_segmented_access()
    }

    /// Index for one resolution call.
    ///
    /// With segmented access and a segment list, a small per-call index is built;
    /// otherwise the cached full index is returned, fetching it on first use.
    pub async fn get_index(&self, segments: Option<&[Segment]>) -> Result<Arc<InboundIndex>> {
        if let Some(segments) = segments.filter(|_| self.catalogue.has_segmented_access()) {
            let inbounds = self.catalogue.get_inbounds(Some(segments)).await?;
            debug!("Built segment index over {} inbounds", inbounds.len());
            return Ok(Arc::new(InboundIndex::new(inbounds)));
        }

        if let Some(index) = self.full_index.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }

        let mut slot = self.full_index.write().await;
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }
        let inbounds = self.catalogue.get_inbounds(None).await?;
        info!("Loaded {} inbounds from catalogue", inbounds.len());
        let index = Arc::new(InboundIndex::new(inbounds));
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Drop the cached index; the next call refetches the catalogue.
    pub async fn refresh(&self) {
        *self.full_index.write().await = None;
    }
}
