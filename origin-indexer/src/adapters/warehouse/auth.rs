//! Warehouse credentials
//!
//! `GOOGLE_APPLICATION_CREDENTIALS` may point at a service-account key or at
//! a file holding a bare access token kept fresh by an external agent. Keys
//! are exchanged for short-lived OAuth tokens through the JWT bearer grant;
//! token files are re-read on every request.

use crate::core::{IndexerError, IndexerResult};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Scope needed for streaming inserts
pub const BIGQUERY_INSERT_SCOPE: &str = "https://www.googleapis.com/auth/bigquery.insertdata";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are replaced this long before they expire
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Fields of a service-account key file the token exchange needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Claims of the signed assertion sent to the token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Service-account token minting with a cached, self-refreshing token
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, client: reqwest::Client) -> IndexerResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| IndexerError::Configuration(format!("service account private key: {}", e)))?;

        Ok(Self {
            key,
            encoding_key,
            client,
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn assertion(&self, now: DateTime<Utc>) -> IndexerResult<String> {
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: BIGQUERY_INSERT_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| IndexerError::Configuration(format!("signing token assertion: {}", e)))
    }

    async fn exchange(&self) -> IndexerResult<CachedToken> {
        let now = Utc::now();
        let assertion = self.assertion(now)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| IndexerError::TransientFetch(format!("token endpoint: {}", e)))?;

        // A refused grant is usually clock skew or a rotated key, retry with backoff
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexerError::TransientFetch(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        debug!(account = %self.key.client_email, expires_in = token.expires_in, "Minted access token");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }

    /// Current token, minting a new one when the cached one is near expiry
    pub async fn access_token(&self) -> IndexerResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = self.exchange().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

/// Where warehouse requests get their bearer token
pub enum TokenSource {
    ServiceAccount(ServiceAccountAuth),
    /// File holding a raw access token, rotated externally
    TokenFile(PathBuf),
    Anonymous,
}

impl TokenSource {
    /// Pick a token source from the configured credentials file
    pub fn from_credentials(path: Option<&Path>, client: reqwest::Client) -> IndexerResult<Self> {
        let Some(path) = path else {
            warn!("No warehouse credentials configured, sending unauthenticated requests");
            return Ok(TokenSource::Anonymous);
        };

        let contents = std::fs::read_to_string(path)
            .map_err(|e| IndexerError::Configuration(format!("credentials {}: {}", path.display(), e)))?;

        let document = match serde_json::from_str::<Value>(&contents) {
            Ok(document @ Value::Object(_)) => document,
            _ => {
                info!(path = %path.display(), "Using access token file for warehouse requests");
                return Ok(TokenSource::TokenFile(path.to_path_buf()));
            }
        };

        match document.get("type").and_then(Value::as_str) {
            Some("service_account") => {
                let key: ServiceAccountKey = serde_json::from_value(document).map_err(|e| {
                    IndexerError::Configuration(format!("service account key {}: {}", path.display(), e))
                })?;
                let auth = ServiceAccountAuth::new(key, client)?;
                info!(account = %auth.client_email(), "Using service account for warehouse requests");
                Ok(TokenSource::ServiceAccount(auth))
            }
            other => Err(IndexerError::Configuration(format!(
                "credentials {}: unsupported credential type {}",
                path.display(),
                other.unwrap_or("(missing)")
            ))),
        }
    }

    /// Bearer token for the next request, if any
    pub async fn token(&self) -> IndexerResult<Option<String>> {
        match self {
            TokenSource::ServiceAccount(auth) => auth.access_token().await.map(Some),
            TokenSource::TokenFile(path) => {
                let token = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| IndexerError::TransientFetch(format!("token file {}: {}", path.display(), e)))?;
                let token = token.trim();
                if token.is_empty() {
                    return Err(IndexerError::TransientFetch(format!(
                        "token file {} is empty",
                        path.display()
                    )));
                }
                Ok(Some(token.to_string()))
            }
            TokenSource::Anonymous => Ok(None),
        }
    }

    /// Drop a token the warehouse refused so the next call fetches a new one
    pub async fn invalidate(&self) {
        if let TokenSource::ServiceAccount(auth) = self {
            auth.invalidate().await;
        }
    }
}
