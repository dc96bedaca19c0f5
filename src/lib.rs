//! Client-side target resolution.
//!
//! Turns navigation intents (`#SemanticObject-action?params`) into launch
//! descriptors: intents are matched against a catalogue of inbounds, ranked
//! deterministically, their parameters mapped, and a technology-specific URL
//! constructed for the best target.
//!
//! # Pipeline
//! 1. Match the intent against the inbound index
//! 2. Resolve references (user defaults) the first pass asked for
//! 3. Rematch with the resolved values
//! 4. Sort, map parameters and construct the result

pub mod adapters;
pub mod app_state;
pub mod catalogue;
pub mod config;
pub mod construct;
pub mod dispatch;
pub mod error;
pub mod hash;
pub mod index;
pub mod mapper;
pub mod matcher;
pub mod model;
pub mod navigation;
pub mod params;
pub mod ranker;
pub mod references;
pub mod service;
pub mod system_alias;
pub mod uri;

pub use config::ResolverConfig;
pub use error::{ResolveError, Result};
pub use model::{Inbound, Intent, ResolutionResult, TileResolution};
pub use params::Params;
pub use service::{EasyAccessMenu, Link, LinkQuery, LinkSort, TargetResolutionService};
