//! Bearer-token acquisition for the registry API
//!
//! Two OAuth2 client-credentials flows:
//! - `DEV`: Basic-authenticated POST to `{aud}/v1/token`
//! - `PROD`: RS256-signed client assertion posted to
//!   `https://{auth_domain}/op/v1/token`
//!
//! Tokens are cached until shortly before they expire. The outcome of every
//! acquisition attempt is recorded in an [`AuthHealth`] owned by the
//! authenticator and served by `/health`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::RwLock;
use reqwest::header;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::{AuthConfig, AuthEnvironment};

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Client assertions are valid for nine minutes
const ASSERTION_LIFETIME_SECS: i64 = 9 * 60;
/// Tokens are refreshed this long before the issuer says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization key is required for the DEV token flow")]
    MissingAuthorizationKey,

    #[error("no *.pem signing key in {0}")]
    KeyNotFound(PathBuf),

    #[error("failed to read signing key: {0}")]
    KeyRead(String),

    #[error("failed to sign client assertion: {0}")]
    Signing(String),

    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    #[error("token endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthStatus {
    Unknown,
    Ok,
    Error,
}

/// Outcome of the most recent token acquisition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthHealth {
    pub status: AuthStatus,
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Default for AuthHealth {
    fn default() -> Self {
        Self {
            status: AuthStatus::Unknown,
            last_checked: None,
            details: None,
        }
    }
}

impl AuthHealth {
    fn now(status: AuthStatus, details: Option<String>) -> Self {
        Self {
            status,
            last_checked: Some(Utc::now()),
            details,
        }
    }
}

/// Source of registry bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;

    fn health(&self) -> AuthHealth;
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    jti: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Client-credentials token source for both environments
pub struct ClientCredentialsAuthenticator {
    config: AuthConfig,
    http: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
    health: RwLock<AuthHealth>,
}

impl ClientCredentialsAuthenticator {
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(Self {
            config,
            http,
            cache: Mutex::new(None),
            health: RwLock::new(AuthHealth::default()),
        })
    }

    pub fn token_endpoint(&self) -> String {
        if let Some(url) = &self.config.token_url {
            return url.clone();
        }
        match self.config.environment {
            AuthEnvironment::Dev => format!("{}/v1/token", self.config.aud.trim_end_matches('/')),
            AuthEnvironment::Prod => format!("https://{}/op/v1/token", self.config.auth_domain),
        }
    }

    /// Drop the cached token so the next call fetches a fresh one
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    fn record(&self, result: &Result<TokenResponse, AuthError>) {
        let health = match result {
            Ok(_) => AuthHealth::now(AuthStatus::Ok, None),
            Err(e) => {
                error!("Token acquisition failed ({:?}): {}", self.config.environment, e);
                AuthHealth::now(AuthStatus::Error, Some(e.to_string()))
            },
        };
        *self.health.write() = health;
    }

    async fn request_token(&self) -> Result<TokenResponse, AuthError> {
        let url = self.token_endpoint();
        debug!("Requesting token from {}", url);

        let request = match self.config.environment {
            AuthEnvironment::Dev => {
                let key = self
                    .config
                    .authorization_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or(AuthError::MissingAuthorizationKey)?;
                self.http
                    .post(&url)
                    .header(header::AUTHORIZATION, format!("Basic {}", key))
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("scope", self.config.scope.as_str()),
                    ])
            },
            AuthEnvironment::Prod => {
                let assertion = self.client_assertion()?;
                self.http
                    .post(&url)
                    .header(header::ACCEPT, "application/json")
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                        ("scope", self.config.scope.as_str()),
                        ("client_assertion", assertion.as_str()),
                    ])
            },
        };

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }

    /// Signed JWT identifying this client to the PROD token endpoint
    pub fn client_assertion(&self) -> Result<String, AuthError> {
        let pem = read_signing_key(&self.config.key_dir)?;
        let key = EncodingKey::from_rsa_pem(&pem).map_err(|e| AuthError::KeyRead(e.to_string()))?;

        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.config.client_id,
            sub: &self.config.client_id,
            aud: &self.config.aud,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsAuthenticator {
    async fn access_token(&self) -> Result<String, AuthError> {
        // Held across the request so concurrent callers share one fetch
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        let result = self.request_token().await;
        self.record(&result);
        let response = result?;

        let lifetime = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or_default()
            .saturating_sub(EXPIRY_MARGIN);
        if lifetime.is_zero() {
            *cache = None;
        } else {
            info!("Access token acquired, valid for {}s", lifetime.as_secs());
            *cache = Some(CachedToken {
                token: response.access_token.clone(),
                expires_at: Instant::now() + lifetime,
            });
        }

        Ok(response.access_token)
    }

    fn health(&self) -> AuthHealth {
        self.health.read().clone()
    }
}

/// First `*.pem` file in `dir`, by file name
fn read_signing_key(dir: &Path) -> Result<Vec<u8>, AuthError> {
    let entries = std::fs::read_dir(dir).map_err(|_| AuthError::KeyNotFound(dir.to_path_buf()))?;

    let mut keys: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "pem"))
        .collect();
    keys.sort();

    let key = keys
        .first()
        .ok_or_else(|| AuthError::KeyNotFound(dir.to_path_buf()))?;
    debug!("Using signing key {:?}", key);
    std::fs::read(key).map_err(|e| AuthError::KeyRead(e.to_string()))
}
