//! Error taxonomy shared by every stage of the resolution pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Prefix carried by messages that ask the dispatcher to switch to the fallback strategy.
pub const FALLBACK_PREFIX: &str = "fallback:";

#[derive(Error, Debug)]
pub enum ResolveError {
    /// Malformed hash fragment or intent string.
    #[error("Could not parse shell hash '{0}'")]
    Parse(String),

    /// Zero inbounds satisfied the intent.
    #[error("Could not resolve navigation target")]
    NoMatch,

    /// Like `NoMatch`, but raised by tile resolution.
    #[error("No matching targets found")]
    NoTileMatch,

    #[error("Failed to resolve references: {0}")]
    ReferenceResolution(String),

    #[error("{0}")]
    SystemAlias(String),

    #[error("Invalid system alias definition '{alias}': {}", errors.join("; "))]
    InvalidSystemAlias { alias: String, errors: Vec<String> },

    #[error("Cannot resolve hash fragment: no fallback provided.")]
    NoFallback,

    /// A constructor lacks collaborator data and defers to the fallback strategy.
    #[error("fallback: {0}")]
    FallbackRequired(String),

    #[error("Fallback resolution failed: {0}")]
    Fallback(String),

    #[error("Failed to load inbounds: {0}")]
    Catalogue(String),

    #[error("Application state error: {0}")]
    AppState(String),

    #[error("{0}")]
    InvalidArguments(String),

    #[error("Cannot resolve intent: url was not specified in matched inbound")]
    MissingUrl,

    #[error("The easy access menu intent {0} could not be resolved: Intent must be either #Shell-startGUI or #Shell-startWDA")]
    EasyAccess(String),

    #[error("Failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResolveError {
    /// Whether this error requests a switch to the fallback strategy.
    pub fn requests_fallback(&self) -> bool {
        matches!(self, ResolveError::FallbackRequired(_)) || self.to_string().starts_with(FALLBACK_PREFIX)
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
