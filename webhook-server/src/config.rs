//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup. Each store (tenant) gets its own
//! LINE channel credentials, looked up by a `LINE_<STORE>_` prefix.

use std::collections::HashMap;
use std::env;

use serde::Serialize;
use tracing::warn;

/// Store key used when `STORES` is not set.
pub const DEFAULT_STORE: &str = "default";

/// Manual links split by the context the user opens them from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManualUrls {
    pub line: String,
    pub todo: String,
    pub default: String,
}

/// Credentials and URLs for one deployed bot instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TenantConfig {
    /// Long-lived channel access token used for reply calls
    pub channel_access_token: String,

    /// Channel secret used to verify `X-Line-Signature`
    pub channel_secret: String,

    /// LIFF app identifier for the store's front-end
    pub liff_id: String,

    pub manual_url: Option<String>,

    /// Rich menu shown before approval
    pub richmenu_before: Option<String>,

    /// Rich menu shown after approval
    pub richmenu_after: Option<String>,

    pub manual_urls: ManualUrls,
}

impl TenantConfig {
    /// Load one store's configuration. Missing variables never fail.
    pub fn from_env(store: &str) -> Self {
        let prefix = env_prefix(store);
        let var = |name: &str| env::var(format!("{prefix}{name}")).unwrap_or_default();
        let opt = |name: &str| env::var(format!("{prefix}{name}")).ok();

        TenantConfig {
            channel_access_token: var("CHANNEL_ACCESS_TOKEN"),
            channel_secret: var("CHANNEL_SECRET"),
            liff_id: var("LIFF_ID"),
            manual_url: opt("MANUAL_URL"),
            richmenu_before: opt("RICHMENU_BEFORE"),
            richmenu_after: opt("RICHMENU_AFTER"),
            manual_urls: ManualUrls {
                line: var("MANUAL_URL_LINE"),
                todo: var("MANUAL_URL_TODO"),
                default: var("MANUAL_URL_DEFAULT"),
            },
        }
    }

    /// Resolve the manual link for a context (`line`, `todo`, or anything else).
    ///
    /// Falls back to the `default` link, then to the legacy single `manual_url`.
    pub fn manual_url_for(&self, context: &str) -> Option<&str> {
        let specific = match context {
            "line" => self.manual_urls.line.as_str(),
            "todo" => self.manual_urls.todo.as_str(),
            _ => "",
        };

        [specific, self.manual_urls.default.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .or_else(|| self.manual_url.as_deref().filter(|s| !s.is_empty()))
    }

    /// The non-secret part of the tenant, safe to hand to the LIFF front-end.
    pub fn public_view(&self) -> PublicTenantConfig {
        PublicTenantConfig {
            liff_id: self.liff_id.clone(),
            manual_urls: self.manual_urls.clone(),
            richmenu_before: self.richmenu_before.clone(),
            richmenu_after: self.richmenu_after.clone(),
        }
    }
}

/// Tenant fields exposed over HTTP. Never carries the token or secret.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTenantConfig {
    pub liff_id: String,
    pub manual_urls: ManualUrls,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub richmenu_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub richmenu_after: Option<String>,
}

/// Default host of the GCE / Cloud Run metadata server.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Where the Firestore client gets its bearer token from.
#[derive(Debug, Clone, PartialEq)]
pub enum FirestoreAuth {
    /// Local emulator. A fixed token (often `owner`) or none at all.
    Emulator { token: Option<String> },

    /// Service account JSON key; short-lived tokens are minted from it.
    ServiceAccount { key_path: String },

    /// Metadata server of the host the service runs on.
    Metadata { host: String },
}

impl FirestoreAuth {
    pub fn kind(&self) -> &'static str {
        match self {
            FirestoreAuth::Emulator { .. } => "emulator",
            FirestoreAuth::ServiceAccount { .. } => "service_account",
            FirestoreAuth::Metadata { .. } => "metadata",
        }
    }
}

/// Firestore connection settings for the permission store.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,

    pub auth: FirestoreAuth,

    /// REST endpoint root, e.g. `https://firestore.googleapis.com`
    pub base_url: String,

    pub collection: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// HTTP request timeout in milliseconds for outbound calls
    pub request_timeout_ms: u64,

    /// LINE Messaging API root
    pub line_api_base_url: String,

    pub firestore: FirestoreConfig,

    /// Store key → tenant configuration
    pub tenants: HashMap<String, TenantConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stores = parse_csv("STORES")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_STORE.to_string()]);

        let tenants = stores
            .into_iter()
            .map(|store| {
                let tenant = TenantConfig::from_env(&store);
                (store, tenant)
            })
            .collect();

        // The emulator speaks plain HTTP and wins over any explicit base URL.
        // A static token is only honoured there; real Firestore tokens expire.
        let (firestore_base_url, firestore_auth) = match non_empty_var("FIRESTORE_EMULATOR_HOST") {
            Some(host) => (
                format!("http://{host}"),
                FirestoreAuth::Emulator {
                    token: non_empty_var("FIRESTORE_ACCESS_TOKEN"),
                },
            ),
            None => {
                let base_url = env::var("FIRESTORE_BASE_URL")
                    .unwrap_or_else(|_| "https://firestore.googleapis.com".to_string());
                let auth = match non_empty_var("GOOGLE_APPLICATION_CREDENTIALS") {
                    Some(key_path) => FirestoreAuth::ServiceAccount { key_path },
                    None => FirestoreAuth::Metadata {
                        host: non_empty_var("GCE_METADATA_HOST")
                            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string()),
                    },
                };
                (base_url, auth)
            }
        };

        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),

            line_api_base_url: env::var("LINE_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.line.me".to_string()),

            firestore: FirestoreConfig {
                project_id: env::var("FIRESTORE_PROJECT_ID").unwrap_or_default(),
                auth: firestore_auth,
                base_url: firestore_base_url,
                collection: env::var("PERMISSION_COLLECTION")
                    .unwrap_or_else(|_| "permissionRequests".to_string()),
            },

            tenants,
        }
    }

    /// Look up a store's configuration.
    pub fn tenant(&self, store: &str) -> Option<&TenantConfig> {
        self.tenants.get(store)
    }
}

/// Environment prefix for a store key: `shibuya-1` → `LINE_SHIBUYA_1_`.
fn env_prefix(store: &str) -> String {
    let key: String = store
        .trim()
        .chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect();
    if key.is_empty() {
        warn!(store = %store, "store_key_empty");
    }
    format!("LINE_{key}_")
}

/// Read a variable, treating blank values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
