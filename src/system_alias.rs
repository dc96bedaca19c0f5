//! System alias bridge: resolves alias names to connection data and splices
//! that data into (or strips it from) target URIs.
//!
//! Resolved aliases are kept in an injected key/value cache holding the raw
//! JSON; a cache hit never reaches the adapter.

use crate::error::{ResolveError, Result};
use crate::model::SystemAliasSemantics;
use crate::params::encode_component;
use crate::uri::Uri;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// Alias naming the system the shell itself runs on
pub const LOCAL_SYSTEM_ALIAS: &str = "";

/// Cache key prefix for resolved system data
pub const CACHE_KEY_PREFIX: &str = "sap-system-data";

/// Path segments the native transaction rfc parameters occupy
const RFC_PATH_PARAMS: [&str; 8] = [
    "~sysid=",
    "~service=",
    "~loginGroup=",
    "~messageServer=",
    "~sncNameR3=",
    "~sncQoPR3=",
    "~rfcHostName=",
    "~connectString=",
];

lazy_static! {
    static ref RE_CONNECT_STRING: Regex = Regex::new(r"^/[HGMR]/").unwrap();
    static ref RE_UPPER_HEX_ESCAPE: Regex = Regex::new(r"%[A-F0-9]{2}").unwrap();
    static ref RE_MULTI_SLASH: Regex = Regex::new(r"/+").unwrap();
}

// ============================================================================
// Collaborators
// ============================================================================

#[async_trait]
pub trait SystemAliasAdapter: Send + Sync {
    /// Raw alias data: `{http?, https?, rfc?, client?, language?, id?}`
    async fn resolve_system_alias(&self, alias: &str) -> Result<Value>;
}

/// Process-wide string cache in the manner of browser local storage
pub trait AliasCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
}

#[derive(Debug, Default)]
pub struct InMemoryAliasCache {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryAliasCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AliasCache for InMemoryAliasCache {
    fn get(&self, key: &str) -> Option<String> {
        // entries are whole strings, a panicking writer cannot leave one half written
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}

/// Which construction rules apply while splicing an alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriType {
    Url,
    Wda,
    Webgui,
    NativeWebgui,
    Wcf,
}

// ============================================================================
// Alias Data
// ============================================================================

/// Rfc destination used by native transaction URLs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RfcDestination {
    pub system_id: String,
    pub host: String,
    pub service: String,
    pub login_group: String,
    pub message_server: String,
    pub snc_name_r3: String,
    pub snc_qop_r3: String,
}

/// Validated alias data with the web endpoint already selected (https preferred)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAliasData {
    pub protocol: &'static str,
    pub host: String,
    pub port: String,
    pub path_prefix: String,
    pub client: String,
    pub language: String,
    pub rfc: Option<RfcDestination>,
}

fn scalar_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn validate_endpoint(section: &str, value: &Value, errors: &mut Vec<String>) {
    let field = |name: &str| value.get(name);
    if !matches!(field("host"), Some(Value::String(_))) {
        errors.push(format!("{}>host field must be a string", section));
    }
    if !matches!(field("port"), Some(Value::String(_)) | Some(Value::Number(_))) {
        errors.push(format!("{}>port field must be a number or a string", section));
    }
    if !matches!(field("pathPrefix"), Some(Value::String(_))) {
        errors.push(format!("{}>pathPrefix field must be a string", section));
    }
}

impl SystemAliasData {
    /// Validate raw alias data and select the web endpoint.
    pub fn from_value(alias: &str, value: &Value) -> Result<Self> {
        let empty = Map::new();
        let object = value.as_object().unwrap_or(&empty);
        let mut errors = Vec::new();

        let https = object.get("https");
        let http = object.get("http");
        let selected = https.map(|e| ("https", e)).or_else(|| http.map(|e| ("http", e)));
        if selected.is_none() {
            errors.push("at least one of 'http' or 'https' fields must be defined".to_string());
        }
        if let Some(section) = https {
            validate_endpoint("https", section, &mut errors);
        }
        if let Some(section) = http {
            validate_endpoint("http", section, &mut errors);
        }

        let (protocol, endpoint) = match selected {
            Some(selected) if errors.is_empty() => selected,
            _ => {
                error!(
                    "Invalid system alias definition: {}\nERRORS:{}",
                    value,
                    errors.iter().map(|e| format!("\n - {}", e)).collect::<String>()
                );
                return Err(ResolveError::InvalidSystemAlias {
                    alias: alias.to_string(),
                    errors,
                });
            }
        };
        let mut port = scalar_to_string(endpoint.get("port"));
        if port == "0" {
            port.clear();
        }

        let rfc = object.get("rfc").map(|rfc| RfcDestination {
            system_id: scalar_to_string(rfc.get("systemId")),
            host: scalar_to_string(rfc.get("host")),
            service: scalar_to_string(rfc.get("service")),
            login_group: scalar_to_string(rfc.get("loginGroup")),
            message_server: scalar_to_string(rfc.get("messageServer")),
            snc_name_r3: scalar_to_string(rfc.get("sncNameR3")),
            snc_qop_r3: scalar_to_string(rfc.get("sncQoPR3")),
        });

        Ok(Self {
            protocol,
            host: scalar_to_string(endpoint.get("host")),
            port,
            path_prefix: scalar_to_string(endpoint.get("pathPrefix")),
            client: scalar_to_string(object.get("client")),
            language: scalar_to_string(object.get("language")),
            rfc,
        })
    }
}

/// Rfc parameters appended to a native transaction path, `;`-separated with
/// lowercase hex escapes.
pub fn native_webgui_parameters(rfc: &RfcDestination, http_host: &str) -> String {
    let non_empty = |name: &str, value: &str| (!value.is_empty()).then(|| format!("{}={}", name, value));

    let params: Vec<Option<String>> = if !rfc.system_id.is_empty() {
        vec![
            non_empty("~sysid", &rfc.system_id),
            non_empty("~loginGroup", &rfc.login_group),
            non_empty("~messageServer", &encode_component(&rfc.message_server)),
            non_empty("~sncNameR3", &encode_component(&rfc.snc_name_r3)),
            non_empty("~sncQoPR3", &rfc.snc_qop_r3),
        ]
    } else {
        let host = rfc.host.as_str();
        let same_as_http_host = host.to_lowercase() == http_host.to_lowercase();
        let is_connect_string = RE_CONNECT_STRING.is_match(host);
        if !host.is_empty() && !same_as_http_host && !is_connect_string {
            error!("Invalid connect string provided in 'host' field of system alias: {}", host);
        }
        vec![
            (!host.is_empty() && !is_connect_string && !same_as_http_host)
                .then(|| format!("~rfcHostName={}", host)),
            is_connect_string.then(|| format!("~connectString={}", encode_component(host))),
            non_empty("~service", &rfc.service),
            non_empty("~sncNameR3", &encode_component(&rfc.snc_name_r3)),
            non_empty("~sncQoPR3", &rfc.snc_qop_r3),
        ]
    };

    let joined = params.into_iter().flatten().collect::<Vec<_>>().join(";");
    RE_UPPER_HEX_ESCAPE
        .replace_all(&joined, |caps: &regex::Captures| caps[0].to_lowercase())
        .into_owned()
}

// ============================================================================
// Bridge
// ============================================================================

pub struct SystemAliasBridge {
    adapter: Option<Arc<dyn SystemAliasAdapter>>,
    cache: Arc<dyn AliasCache>,
    default_language: String,
}

impl SystemAliasBridge {
    pub fn new(
        adapter: Option<Arc<dyn SystemAliasAdapter>>,
        cache: Arc<dyn AliasCache>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            cache,
            default_language: default_language.into(),
        }
    }

    pub fn cache_key(alias: &str, system_data_src: Option<&str>) -> String {
        let ids: Vec<&str> = system_data_src.into_iter().chain(std::iter::once(alias)).collect();
        format!("{}#{}", CACHE_KEY_PREFIX, ids.join(":"))
    }

    /// Resolve and validate an alias.
    ///
    /// With a source system the data must already be cached: navigation has to
    /// happen in the context of that source system.
    pub async fn resolve(&self, alias: &str, system_data_src: Option<&str>) -> Result<SystemAliasData> {
        let key = Self::cache_key(alias, system_data_src);
        if let Some(serialized) = self.cache.get(&key) {
            let value: Value = serde_json::from_str(&serialized).map_err(|_| {
                ResolveError::SystemAlias(format!(
                    "Cannot parse system data from local storage at key '{}'. Data: {}",
                    key, serialized
                ))
            })?;
            debug!("System alias '{}' served from cache", alias);
            return SystemAliasData::from_value(alias, &value);
        }

        if system_data_src.is_some() {
            return Err(ResolveError::SystemAlias(format!(
                "Cannot find data for system '{}' in local storage using key '{}'",
                alias, key
            )));
        }

        let adapter = self.adapter.as_ref().ok_or_else(|| {
            ResolveError::FallbackRequired("the adapter does not implement resolveSystemAlias".to_string())
        })?;
        let value = adapter.resolve_system_alias(alias).await?;
        let data = SystemAliasData::from_value(alias, &value)?;
        self.cache.put(&key, value.to_string());
        Ok(data)
    }

    async fn local_path_prefix(&self) -> Result<String> {
        Ok(self.resolve(LOCAL_SYSTEM_ALIAS, None).await?.path_prefix)
    }

    async fn interpolate_path_prefix(&self, mut uri: Uri, uri_type: UriType, path_prefix: &str) -> Result<Uri> {
        // an empty prefix on a URL target is not the local prefix
        if uri_type == UriType::Url && path_prefix.is_empty() {
            return Ok(uri);
        }

        let prefix = if path_prefix.is_empty() {
            self.local_path_prefix().await?
        } else {
            if matches!(uri_type, UriType::Wda | UriType::Webgui) {
                if let Some((_, rest)) = uri.path.split_once("~canvas") {
                    uri.path = format!("/~canvas{}", rest);
                }
            }
            path_prefix.to_string()
        };

        let joined = format!("{}{}", prefix, uri.path);
        uri.path = RE_MULTI_SLASH.replace_all(&joined, "/").into_owned();
        Ok(uri)
    }

    /// Interpolate `alias` into `uri`: protocol, host, port, path prefix,
    /// `sap-client`, `sap-language` and, for native transactions, rfc data.
    pub async fn apply(
        &self,
        alias: &str,
        system_data_src: Option<&str>,
        uri: Uri,
        uri_type: UriType,
    ) -> Result<Uri> {
        let data = self.resolve(alias, system_data_src).await?;

        let relative = alias == LOCAL_SYSTEM_ALIAS && data.host.is_empty() && data.port.is_empty();
        let mut uri = uri;
        uri.protocol = if relative { String::new() } else { data.protocol.to_string() };
        uri.set_authority(data.host.clone(), data.port.clone());

        let mut uri = self.interpolate_path_prefix(uri, uri_type, &data.path_prefix).await?;

        if !data.client.is_empty() {
            uri.append_query(&format!("sap-client={}", data.client));
        }
        let language = if data.language.is_empty() {
            self.default_language.as_str()
        } else {
            data.language.as_str()
        };
        uri.append_query(&format!("sap-language={}", language));

        if uri_type == UriType::NativeWebgui {
            if let Some(rfc) = &data.rfc {
                let params = native_webgui_parameters(rfc, &data.host);
                if !params.is_empty() {
                    uri.path = format!("{};{}", uri.path, params);
                }
            }
        }
        Ok(uri)
    }

    /// Remove everything `system` interpolated into `uri`. Without a system only
    /// the web parts and `sap-client`/`sap-language` are removed.
    pub async fn strip(&self, mut uri: Uri, system: Option<&str>, uri_type: UriType) -> Result<Uri> {
        uri.clear_authority();
        uri.remove_query_params(&["sap-client", "sap-language"]);

        let Some(system) = system else {
            return Ok(uri);
        };
        let data = self.resolve(system, None).await?;

        let prefix = if data.path_prefix.is_empty() {
            self.local_path_prefix().await?
        } else {
            data.path_prefix.clone()
        };
        if !prefix.is_empty() {
            let path = uri.path.replacen(&prefix, "", 1);
            uri.path = if path.starts_with('/') { path } else { format!("/{}", path) };
        }

        if uri_type == UriType::NativeWebgui && data.rfc.is_some() {
            uri.path = uri
                .path
                .split(';')
                .filter(|segment| !RFC_PATH_PARAMS.iter().any(|p| segment.starts_with(p)))
                .collect::<Vec<_>>()
                .join(";");
        }
        Ok(uri)
    }

    /// Bring a URL target onto `sap_system` when it was built for `system_alias`
    async fn splice_url(
        &self,
        uri: Uri,
        system_alias: Option<&str>,
        sap_system: &str,
        system_data_src: Option<&str>,
    ) -> Result<Uri> {
        let system_alias = match system_alias {
            None | Some(LOCAL_SYSTEM_ALIAS) => {
                if uri.is_absolute() {
                    return Ok(uri);
                }
                return self.apply(sap_system, system_data_src, uri, UriType::Url).await;
            }
            Some(alias) => alias,
        };

        let data = self.resolve(system_alias, None).await?;
        let interpolated = uri.protocol.to_lowercase() == data.protocol
            && uri.host == data.host
            && uri.path.starts_with(&data.path_prefix);
        if !interpolated {
            return Ok(uri);
        }

        let mut uri = uri;
        uri.clear_authority();
        uri.path = uri.path.replacen(&data.path_prefix, "", 1);
        uri.remove_query_params(&["sap-language", "sap-client"]);
        self.apply(sap_system, system_data_src, uri, UriType::Url).await
    }

    /// Splice `sap_system` into a URI built for `system_alias` under the given semantics.
    pub async fn splice(
        &self,
        uri: Uri,
        system_alias: Option<&str>,
        sap_system: Option<&str>,
        system_data_src: Option<&str>,
        uri_type: UriType,
        semantics: SystemAliasSemantics,
    ) -> Result<Uri> {
        match semantics {
            SystemAliasSemantics::Applied => {
                let Some(sap_system) = sap_system.filter(|s| Some(*s) != system_alias) else {
                    return Ok(uri);
                };
                if uri_type == UriType::Url {
                    return self.splice_url(uri, system_alias, sap_system, system_data_src).await;
                }
                let stripped = self.strip(uri, system_alias, uri_type).await?;
                self.apply(sap_system, None, stripped, uri_type).await
            }
            SystemAliasSemantics::Apply => {
                let (alias, src) = match (sap_system, system_alias) {
                    (Some(sap_system), _) => (sap_system, system_data_src),
                    (None, Some(alias)) => (alias, None),
                    (None, None) => return Ok(uri),
                };
                self.apply(alias, src, uri, uri_type).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedAliases(HashMap<String, Value>);

    #[async_trait]
    impl SystemAliasAdapter for FixedAliases {
        async fn resolve_system_alias(&self, alias: &str) -> Result<Value> {
            self.0
                .get(alias)
                .cloned()
                .ok_or_else(|| ResolveError::SystemAlias(format!("Cannot resolve system alias {}", alias)))
        }
    }

    fn create_test_bridge() -> SystemAliasBridge {
        let mut aliases = HashMap::new();
        aliases.insert(
            "".to_string(),
            json!({"http": {"host": "", "port": 0, "pathPrefix": "/sap/bc/ui2/nwbc/"},
                   "https": {"host": "", "port": 0, "pathPrefix": "/sap/bc/ui2/nwbc/"}}),
        );
        aliases.insert(
            "UR3CLNT120".to_string(),
            json!({
                "https": {"host": "example.corp", "port": 44355, "pathPrefix": "/abc/def/"},
                "rfc": {"systemId": "", "host": "example.corp", "service": 3255, "sncNameR3": "p/secude:CN=UR3"},
                "client": "120",
                "language": "EN"
            }),
        );
        aliases.insert(
            "NOPREFIX".to_string(),
            json!({"http": {"host": "plain.corp", "port": "8080", "pathPrefix": ""}, "client": "200"}),
        );
        aliases.insert("BROKEN".to_string(), json!({"https": {"host": 1, "pathPrefix": "/"}}));
        SystemAliasBridge::new(
            Some(Arc::new(FixedAliases(aliases))),
            Arc::new(InMemoryAliasCache::new()),
            "de",
        )
    }

    #[tokio::test]
    async fn test_apply_interpolates_alias() {
        let bridge = create_test_bridge();
        let uri = bridge
            .apply("UR3CLNT120", None, Uri::parse("/sap/bc/ui5_ui5/app?x=1"), UriType::Url)
            .await
            .unwrap();
        assert_eq!(
            uri.to_string(),
            "https://example.corp:44355/abc/def/sap/bc/ui5_ui5/app?x=1&sap-client=120&sap-language=EN"
        );
    }

    #[tokio::test]
    async fn test_apply_local_alias_stays_relative() {
        let bridge = create_test_bridge();
        let uri = bridge
            .apply("", None, Uri::parse("/ui2/nwbc/~canvas;window=app/wda/X/"), UriType::Wda)
            .await
            .unwrap();
        assert_eq!(uri.to_string(), "/sap/bc/ui2/nwbc/~canvas;window=app/wda/X/?sap-language=de");
    }

    #[tokio::test]
    async fn test_empty_prefix_uses_local_prefix_except_for_urls() {
        let bridge = create_test_bridge();
        let wda = bridge
            .apply("NOPREFIX", None, Uri::parse("/~canvas;window=app/wda/X/"), UriType::Wda)
            .await
            .unwrap();
        assert_eq!(
            wda.to_string(),
            "http://plain.corp:8080/sap/bc/ui2/nwbc/~canvas;window=app/wda/X/?sap-client=200&sap-language=de"
        );
        let url = bridge
            .apply("NOPREFIX", None, Uri::parse("/app"), UriType::Url)
            .await
            .unwrap();
        assert_eq!(url.path, "/app");
    }

    #[tokio::test]
    async fn test_applied_round_trip_is_exact() {
        let bridge = create_test_bridge();
        for uri_type in [UriType::Url, UriType::Wda, UriType::NativeWebgui] {
            let original = bridge
                .apply("UR3CLNT120", None, Uri::parse("/gui/sap/its/webgui?%7etransaction=SU01"), uri_type)
                .await
                .unwrap();
            let stripped = bridge.strip(original.clone(), Some("UR3CLNT120"), uri_type).await.unwrap();
            let reapplied = bridge.apply("UR3CLNT120", None, stripped, uri_type).await.unwrap();
            assert_eq!(reapplied.to_string(), original.to_string());
        }
    }

    #[tokio::test]
    async fn test_native_webgui_rfc_parameters() {
        let bridge = create_test_bridge();
        let uri = bridge
            .apply("UR3CLNT120", None, Uri::parse("/gui/sap/its/webgui"), UriType::NativeWebgui)
            .await
            .unwrap();
        assert_eq!(uri.path, "/abc/def/gui/sap/its/webgui;~service=3255;~sncNameR3=p%2fsecude%3aCN%3dUR3");
    }

    #[test]
    fn test_load_balancing_parameters() {
        let rfc = RfcDestination {
            system_id: "UR3".to_string(),
            login_group: "PUBLIC".to_string(),
            message_server: "ms.corp".to_string(),
            snc_qop_r3: "8".to_string(),
            ..Default::default()
        };
        assert_eq!(
            native_webgui_parameters(&rfc, "example.corp"),
            "~sysid=UR3;~loginGroup=PUBLIC;~messageServer=ms.corp;~sncQoPR3=8"
        );

        let routed = RfcDestination {
            host: "/H/router/S/3299/H/backend".to_string(),
            ..Default::default()
        };
        assert_eq!(
            native_webgui_parameters(&routed, "example.corp"),
            "~connectString=%2fH%2frouter%2fS%2f3299%2fH%2fbackend"
        );
    }

    #[tokio::test]
    async fn test_invalid_alias_is_rejected() {
        let bridge = create_test_bridge();
        let err = bridge.resolve("BROKEN", None).await.unwrap_err();
        match err {
            ResolveError::InvalidSystemAlias { errors, .. } => {
                assert_eq!(
                    errors,
                    vec![
                        "https>host field must be a string".to_string(),
                        "https>port field must be a number or a string".to_string(),
                    ]
                );
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_alias_cache_survives_poisoned_lock() {
        let cache = Arc::new(InMemoryAliasCache::new());
        cache.put("A", "1".to_string());

        let poisoner = Arc::clone(&cache);
        let outcome = std::thread::spawn(move || {
            let _guard = poisoner.entries.write().unwrap();
            panic!("writer died");
        })
        .join();
        assert!(outcome.is_err());
        assert!(cache.entries.is_poisoned());

        assert_eq!(cache.get("A").as_deref(), Some("1"));
        cache.put("B", "2".to_string());
        assert_eq!(cache.get("B").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_cache_rules() {
        let bridge = create_test_bridge();
        let err = bridge.resolve("UR3CLNT120", Some("SRC")).await.unwrap_err();
        assert!(err.to_string().contains("sap-system-data#SRC:UR3CLNT120"));

        bridge.resolve("UR3CLNT120", None).await.unwrap();
        assert!(bridge.cache.get("sap-system-data#UR3CLNT120").is_some());

        bridge.cache.put("sap-system-data#SRC:X", "{not json".to_string());
        let err = bridge.resolve("X", Some("SRC")).await.unwrap_err();
        assert!(err.to_string().starts_with("Cannot parse system data from local storage"));

        let no_adapter = SystemAliasBridge::new(None, Arc::new(InMemoryAliasCache::new()), "en");
        assert!(no_adapter.resolve("X", None).await.unwrap_err().requests_fallback());
    }

    #[tokio::test]
    async fn test_splice_semantics() {
        let bridge = create_test_bridge();
        let relative = Uri::parse("/app");

        let unchanged = bridge
            .splice(relative.clone(), Some("UR3CLNT120"), Some("UR3CLNT120"), None, UriType::Wda, SystemAliasSemantics::Applied)
            .await
            .unwrap();
        assert_eq!(unchanged, relative);

        let nothing = bridge
            .splice(relative.clone(), None, None, None, UriType::Wda, SystemAliasSemantics::Apply)
            .await
            .unwrap();
        assert_eq!(nothing, relative);

        let absolute = Uri::parse("https://elsewhere/app");
        let kept = bridge
            .splice(absolute.clone(), None, Some("UR3CLNT120"), None, UriType::Url, SystemAliasSemantics::Applied)
            .await
            .unwrap();
        assert_eq!(kept, absolute);

        let built = bridge
            .apply("NOPREFIX", None, Uri::parse("/app"), UriType::Url)
            .await
            .unwrap();
        let moved = bridge
            .splice(built, Some("NOPREFIX"), Some("UR3CLNT120"), None, UriType::Url, SystemAliasSemantics::Applied)
            .await
            .unwrap();
        assert_eq!(moved.to_string(), "https://example.corp:44355/abc/def/app?sap-client=120&sap-language=EN");
    }
}
