//! Configuration Management
//!
//! Tunables come from built-in defaults, an optional config file, then CLI
//! flags. Connection details and credentials come from the environment and
//! are validated before any remote call is made.

use crate::api::auth::Credentials;
use crate::api::http::RetryPolicy;
use crate::error::ConfigError;
use crate::resource::filter::Thresholds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://cloud.mongodb.com/api/atlas/v2";
pub const DEFAULT_ACCEPT: &str = "application/vnd.atlas.2025-03-12+json";

pub const ENV_ORG_ID: &str = "ATLAS_ORG_ID";
pub const ENV_BASE_URL: &str = "ATLAS_API_BASE_URL";
pub const ENV_ACCESS_TOKEN: &str = "ATLAS_ACCESS_TOKEN";
pub const ENV_CLIENT_ID: &str = "ATLAS_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "ATLAS_CLIENT_SECRET";

const MAX_CONCURRENCY: usize = 32;
const MAX_PAGE_SIZE: u32 = 500;

/// Engine tunables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Concurrent workers for mutating calls and per-project listings
    pub concurrency: usize,
    /// Records requested per page (the API caps this at 500)
    pub page_size: u32,
    /// Safety bound on pages fetched per collection
    pub max_pages: u32,
    /// Per-request network timeout
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Pause applied to further dispatch after a target is rate limited
    pub rate_limit_cooldown_ms: u64,
    pub thresholds: Thresholds,
    /// Media type sent in the Accept header
    pub accept: String,
    /// Database users that cleanup never removes
    pub protected_database_users: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            page_size: MAX_PAGE_SIZE,
            max_pages: 100,
            request_timeout_secs: 30,
            retry: RetryPolicy::default(),
            rate_limit_cooldown_ms: 2_000,
            thresholds: Thresholds::default(),
            accept: DEFAULT_ACCEPT.to_string(),
            protected_database_users: vec!["admin".to_string(), "__onprem_monitoring".to_string()],
        }
    }
}

impl Settings {
    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("atlas-sweep").join("config.json"))
    }

    /// Load settings from `path`, or from the default path when it exists.
    ///
    /// A missing default file yields defaults; an explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let settings: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
            }
            _ => serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                reason: e.to_string(),
            })?,
        };

        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings.normalized())
    }

    /// Clamp tunables into the ranges the API tolerates
    pub fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.clamp(1, MAX_CONCURRENCY);
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.max_pages = self.max_pages.max(1);
        self.retry.max_attempts = self.retry.max_attempts.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }
}

/// Where and as whom to connect
#[derive(Debug, Clone)]
pub struct Connection {
    pub org_id: String,
    pub base_url: Url,
    pub credentials: Credentials,
}

impl Connection {
    /// Read connection details from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read connection details through `lookup`, failing fast on anything absent.
    ///
    /// Every missing variable is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let org_id = get(ENV_ORG_ID);
        let token = get(ENV_ACCESS_TOKEN);
        let client_id = get(ENV_CLIENT_ID);
        let client_secret = get(ENV_CLIENT_SECRET);

        let mut missing = Vec::new();
        if org_id.is_none() {
            missing.push(ENV_ORG_ID.to_string());
        }

        let credentials = match (token, client_id, client_secret) {
            (Some(token), _, _) => Some(Credentials::Token(token)),
            (None, Some(client_id), Some(client_secret)) => Some(Credentials::ServiceAccount {
                client_id,
                client_secret,
            }),
            (None, client_id, client_secret) => {
                if client_id.is_none() {
                    missing.push(ENV_CLIENT_ID.to_string());
                }
                if client_secret.is_none() {
                    missing.push(ENV_CLIENT_SECRET.to_string());
                }
                None
            }
        };

        let (Some(org_id), Some(credentials)) = (org_id, credentials) else {
            return Err(ConfigError::Missing(missing));
        };

        let raw_url = get(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&raw_url).map_err(|e| ConfigError::Invalid {
            key: ENV_BASE_URL.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.host_str().is_none() {
            return Err(ConfigError::Invalid {
                key: ENV_BASE_URL.to_string(),
                reason: "must be an absolute http(s) URL".to_string(),
            });
        }

        Ok(Self {
            org_id,
            base_url,
            credentials,
        })
    }
}
