//! Error taxonomy
//!
//! Configuration problems are fatal and surface before any remote call.
//! Transport failures are retried inside [`crate::api::http::Transport`] and
//! only reach callers once retries are exhausted or the status is not
//! retryable. Listing failures for a single project are isolated by the
//! inventory and never abort sibling projects.

use std::path::PathBuf;
use thiserror::Error;

/// Missing or invalid input detected before the engine starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
}

/// Failure of a single logical API call (after the transport's own retries).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("service unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl TransportError {
    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// Short machine-friendly reason used in reports
    pub fn reason(&self) -> String {
        match self {
            Self::RateLimited { .. } => "rate-limited".to_string(),
            Self::Unavailable { reason, .. } => format!("unavailable: {}", reason),
            Self::Api { status, body } if body.is_empty() => format!("api-error {}", status),
            Self::Api { status, body } => format!("api-error {}: {}", status, body),
            Self::Decode(msg) => format!("decode: {}", msg),
            Self::Auth(msg) => format!("auth: {}", msg),
        }
    }
}

/// Run-level failures. Only these abort a whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("organization {org_id} is not accessible: {source}")]
    OrganizationUnavailable {
        org_id: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to list projects: {0}")]
    Listing(#[source] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Format an API error for operator display without echoing raw response bodies.
pub fn format_api_error(error: &TransportError) -> String {
    match error {
        TransportError::RateLimited { attempts } => {
            format!("Rate limit exceeded ({} attempts). Try again later or lower --concurrency.", attempts)
        }
        TransportError::Unavailable { .. } => {
            "Service temporarily unavailable. Check your network connection and try again.".to_string()
        }
        TransportError::Auth(_) => {
            "Authentication failed. Check ATLAS_CLIENT_ID/ATLAS_CLIENT_SECRET or ATLAS_ACCESS_TOKEN.".to_string()
        }
        TransportError::Decode(_) => "Unexpected response from the API.".to_string(),
        TransportError::Api { status, .. } => match status {
            400 => "Invalid request. Check your parameters.".to_string(),
            401 => "Authentication failed. Check your API credentials.".to_string(),
            403 => "Permission denied. Check the API key's organization roles.".to_string(),
            404 => "Resource not found.".to_string(),
            409 => "Resource conflict. The resource may already exist or be in use.".to_string(),
            s if *s >= 500 => "Service temporarily unavailable. Please try again.".to_string(),
            s => format!("Request failed with status {}.", s),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_every_variable() {
        let err = ConfigError::Missing(vec!["ATLAS_ORG_ID".into(), "ATLAS_CLIENT_ID".into()]);
        assert_eq!(
            err.to_string(),
            "missing required environment variables: ATLAS_ORG_ID, ATLAS_CLIENT_ID"
        );
    }

    #[test]
    fn test_status_helpers() {
        let not_found = TransportError::Api { status: 404, body: String::new() };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());
        assert_eq!(TransportError::RateLimited { attempts: 3 }.status(), Some(429));
        assert_eq!(
            TransportError::Unavailable { attempts: 1, reason: "timeout".into() }.status(),
            None
        );
    }

    #[test]
    fn test_format_api_error_hides_body() {
        let err = TransportError::Api {
            status: 403,
            body: "{\"detail\":\"secret internals\"}".into(),
        };
        let msg = format_api_error(&err);
        assert!(msg.contains("Permission denied"));
        assert!(!msg.contains("secret"));
    }
}
