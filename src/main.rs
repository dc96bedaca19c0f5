//! `ctr` - resolve navigation intents against a JSON inbound catalogue
//!
//! # Usage
//!
//! ```bash
//! # Resolve one intent
//! ctr --catalogue inbounds.json --systems systems.json resolve '#Action-toappnav?A=1'
//!
//! # List the links of a semantic object
//! ctr links --semantic-object SalesOrder --param Customer=42
//!
//! # Check intents
//! ctr supported '#SalesOrder-display' '#Nothing-here'
//! ```
//!
//! Results are printed as JSON on stdout; diagnostics go to stderr and are
//! controlled by `RUST_LOG`.

use clap::{Parser, Subcommand, ValueEnum};
use client_target_resolver::adapters::{
    InMemoryAppStateStore, StaticCatalogue, StaticReferenceResolver, StaticSystemAliases,
};
use client_target_resolver::system_alias::{InMemoryAliasCache, SystemAliasAdapter, SystemAliasBridge};
use client_target_resolver::{
    EasyAccessMenu, LinkQuery, LinkSort, Params, ResolveError, ResolverConfig, Result, TargetResolutionService,
};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

// ============================================================================
// Constants
// ============================================================================

/// Directory under the platform cache and config directories
const APP_DIR: &str = "target-resolver";

/// Default inbound catalogue file name
const CATALOGUE_FILE: &str = "inbounds.json";

/// Default configuration file name
const CONFIG_FILE: &str = "config.json";

// ============================================================================
// Command Line
// ============================================================================

#[derive(Parser)]
#[command(name = "ctr")]
#[command(version)]
#[command(about = "Resolve navigation intents to launch URLs")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Inbound catalogue (JSON array, or object with an `inbounds` array)
    #[arg(long, global = true)]
    catalogue: Option<PathBuf>,

    /// System alias definitions keyed by alias name
    #[arg(long, global = true)]
    systems: Option<PathBuf>,

    /// Known reference values, e.g. user defaults
    #[arg(long, global = true)]
    references: Option<PathBuf>,

    /// Resolver configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SortArg {
    Intent,
    Text,
    Priority,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MenuArg {
    Sap,
    User,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a hash fragment to its launch descriptor
    Resolve {
        /// Hash fragment, with or without the leading `#`
        hash: String,
    },

    /// Resolve a tile intent
    Tile { hash: String },

    /// List the distinct links matching a filter
    Links {
        #[arg(long)]
        semantic_object: Option<String>,

        #[arg(long)]
        action: Option<String>,

        /// Intent parameter as name=value (repeatable)
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Only inbounds carrying this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        ignore_form_factor: bool,

        #[arg(long, value_enum, default_value = "intent")]
        sort: SortArg,
    },

    /// Check whether intents can be resolved
    Supported {
        #[arg(required = true)]
        intents: Vec<String>,
    },

    /// List the semantic objects of visible inbounds
    SemanticObjects,

    /// List the user default parameters referenced by the catalogue
    UserDefaults,

    /// List the systems of an easy access menu
    EasyAccess {
        #[arg(long, value_enum, default_value = "sap")]
        menu: MenuArg,
    },
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", s))
}

// ============================================================================
// Setup
// ============================================================================

fn default_path(base: Option<PathBuf>, file: &str) -> Option<PathBuf> {
    base.map(|dir| dir.join(APP_DIR).join(file))
}

fn load_config(path: Option<PathBuf>) -> Result<ResolverConfig> {
    if let Some(path) = path {
        return ResolverConfig::load(&path);
    }
    match default_path(dirs::config_dir(), CONFIG_FILE) {
        Some(path) if path.exists() => {
            debug!("Loading configuration from {}", path.display());
            ResolverConfig::load(&path)
        }
        _ => Ok(ResolverConfig::default()),
    }
}

fn build_service(cli: &Cli) -> Result<TargetResolutionService> {
    let config = load_config(cli.config.clone())?;

    let catalogue_path = cli
        .catalogue
        .clone()
        .or_else(|| default_path(dirs::cache_dir(), CATALOGUE_FILE))
        .ok_or_else(|| ResolveError::InvalidArguments("no catalogue given and no cache directory found".to_string()))?;
    let catalogue = StaticCatalogue::load(&catalogue_path)?;

    let aliases: Option<Arc<dyn SystemAliasAdapter>> = match &cli.systems {
        Some(path) => Some(Arc::new(StaticSystemAliases::load(path)?)),
        None => None,
    };
    let bridge = SystemAliasBridge::new(
        aliases,
        Arc::new(InMemoryAliasCache::new()),
        config.default_language.clone(),
    );

    let mut service = TargetResolutionService::new(config, Arc::new(catalogue), bridge)
        .with_app_state_store(Arc::new(InMemoryAppStateStore::new()));
    if let Some(path) = &cli.references {
        service = service.with_reference_resolver(Arc::new(StaticReferenceResolver::load(path)?));
    }
    Ok(service)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let service = build_service(&cli)?;

    match cli.command {
        Commands::Resolve { hash } => {
            let result = service.resolve_hash_fragment(&hash).await?;
            info!("{} {} -> {}", "resolved".green(), hash.bold(), result.url);
            print_json(&result)
        }
        Commands::Tile { hash } => {
            let tile = service.resolve_tile_intent(&hash).await?;
            info!("{} tile {}", "resolved".green(), hash.bold());
            print_json(&tile)
        }
        Commands::Links {
            semantic_object,
            action,
            params,
            tags,
            ignore_form_factor,
            sort,
        } => {
            let mut intent_params = Params::new();
            for (name, value) in params {
                intent_params.push(name, value);
            }
            let query = LinkQuery {
                semantic_object,
                action,
                params: intent_params,
                ignore_form_factor,
                tags: (!tags.is_empty()).then_some(tags),
                sort_results_by: match sort {
                    SortArg::Intent => LinkSort::Intent,
                    SortArg::Text => LinkSort::Text,
                    SortArg::Priority => LinkSort::Priority,
                },
                ..Default::default()
            };
            let links = service.get_links(&query).await?;
            info!("{} links", links.len().to_string().bold());
            print_json(&links)
        }
        Commands::Supported { intents } => {
            let supported = service.is_intent_supported(&intents).await?;
            for (intent, s) in &supported {
                let mark = if s.supported { "yes".green() } else { "no".red() };
                info!("{} {}", mark, intent);
            }
            print_json(&supported)
        }
        Commands::SemanticObjects => print_json(&service.get_distinct_semantic_objects().await?),
        Commands::UserDefaults => print_json(&service.get_user_default_parameter_names().await?),
        Commands::EasyAccess { menu } => {
            let menu = match menu {
                MenuArg::Sap => EasyAccessMenu::SapMenu,
                MenuArg::User => EasyAccessMenu::UserMenu,
            };
            print_json(&service.get_easy_access_systems(menu).await?)
        }
    }
}
