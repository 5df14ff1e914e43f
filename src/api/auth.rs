//! API Authentication
//!
//! Supports a static bearer token or a service account whose client
//! credentials are exchanged for short-lived access tokens.

use crate::error::TransportError;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if the token endpoint does not report one
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Path of the client-credentials token endpoint, relative to the API host
const TOKEN_PATH: &str = "/api/oauth/token";

/// Authentication material for the management API
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Pre-issued bearer token
    Token(String),
    /// Service account client credentials
    ServiceAccount {
        client_id: String,
        client_secret: String,
    },
}

// Security: never print secrets
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Credentials::Token(***)"),
            Self::ServiceAccount { client_id, .. } => f
                .debug_struct("Credentials::ServiceAccount")
                .field("client_id", client_id)
                .field("client_secret", &"***")
                .finish(),
        }
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Hands out access tokens, caching exchanged ones until shortly before expiry
#[derive(Clone)]
pub struct TokenSource {
    credentials: Credentials,
    token_url: String,
    http: Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl TokenSource {
    pub fn new(credentials: Credentials, base_url: &Url, http: Client) -> Self {
        let token_url = base_url
            .join(TOKEN_PATH)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", base_url.as_str().trim_end_matches('/'), TOKEN_PATH));

        Self {
            credentials,
            token_url,
            http,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn token(&self) -> Result<String, TransportError> {
        let (client_id, client_secret) = match &self.credentials {
            Credentials::Token(token) => return Ok(token.clone()),
            Credentials::ServiceAccount {
                client_id,
                client_secret,
            } => (client_id, client_secret),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let mut cache = self.token_cache.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref() {
            if cached.is_valid() {
                return Ok(cached.token.clone());
            }
        }

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| TransportError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Auth(format!("token endpoint returned {}", status)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Auth(format!("invalid token response: {}", e)))?;

        let ttl = body
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        *cache = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at,
        });

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(body.access_token)
    }

    /// Drop the cached token so the next call re-authenticates
    pub async fn invalidate(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::ServiceAccount {
            client_id: "mdb_sa_id".to_string(),
            client_secret: "hunter2".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("mdb_sa_id"));
        assert!(!printed.contains("hunter2"));
        assert!(!format!("{:?}", Credentials::Token("abc".into())).contains("abc"));
    }

    #[test]
    fn test_token_url_uses_api_host() {
        let base = Url::parse("https://cloud.example.com/api/atlas/v2").unwrap();
        let source = TokenSource::new(Credentials::Token("t".into()), &base, Client::new());
        assert_eq!(source.token_url, "https://cloud.example.com/api/oauth/token");
    }

    #[tokio::test]
    async fn test_static_token_is_returned_as_is() {
        let base = Url::parse("https://cloud.example.com/api/atlas/v2").unwrap();
        let source = TokenSource::new(Credentials::Token("static".into()), &base, Client::new());
        assert_eq!(source.token().await.unwrap(), "static");
    }
}
