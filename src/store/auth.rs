//! Google Cloud credentials shared by the report repository and the
//! document archive.
//!
//! A service-account key file is exchanged for a short-lived OAuth access
//! token (JWT bearer grant, RS256). Tokens are cached until shortly before
//! expiry. When a Firestore emulator is configured no exchange happens and
//! the emulator's fixed `owner` token is used instead.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};

use super::StoreError;
use crate::config::StoreConfig;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Relevant subset of a service-account key file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccount {
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Credentials(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| StoreError::Credentials(format!("{}: {e}", path.display())))
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

pub struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Source of bearer tokens for Google REST APIs.
pub enum TokenProvider {
    /// Always the same token (emulators, pre-minted tokens).
    Fixed(String),
    /// Service-account JWT exchange with caching.
    ServiceAccount {
        account: ServiceAccount,
        http: reqwest::Client,
        cached: Mutex<Option<CachedToken>>,
    },
}

impl TokenProvider {
    pub fn service_account(account: ServiceAccount, http: reqwest::Client) -> Self {
        Self::ServiceAccount {
            account,
            http,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, exchanging a fresh one when the cache is stale.
    pub async fn bearer(&self) -> Result<String, StoreError> {
        match self {
            Self::Fixed(token) => Ok(token.clone()),
            Self::ServiceAccount {
                account,
                http,
                cached,
            } => {
                let mut cached = cached.lock().await;
                let now = Utc::now();
                if let Some(token) = cached.as_ref() {
                    if token.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
                        return Ok(token.value.clone());
                    }
                }

                let fresh = exchange_token(http, account, now).await?;
                let value = fresh.value.clone();
                *cached = Some(fresh);
                Ok(value)
            }
        }
    }
}

/// Sign the assertion for a service account. Split out for testing.
fn sign_assertion(account: &ServiceAccount, now: DateTime<Utc>) -> Result<String, StoreError> {
    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
        .map_err(|e| StoreError::Credentials(format!("invalid private key: {e}")))?;
    let claims = Claims {
        iss: &account.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: &account.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + 3600,
    };
    encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| StoreError::Credentials(format!("cannot sign assertion: {e}")))
}

async fn exchange_token(
    http: &reqwest::Client,
    account: &ServiceAccount,
    now: DateTime<Utc>,
) -> Result<CachedToken, StoreError> {
    let assertion = sign_assertion(account, now)?;

    let response = http
        .post(&account.token_uri)
        .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| StoreError::Auth(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Auth(format!("status {}: {body}", status.as_u16())));
    }

    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| StoreError::Auth(e.to_string()))?;

    tracing::debug!(expires_in = parsed.expires_in, "Exchanged service-account token");

    Ok(CachedToken {
        value: parsed.access_token,
        expires_at: now + Duration::seconds(parsed.expires_in),
    })
}

// ═══════════════════════════════════════════════════════════
// Session: project + tokens, built once per process
// ═══════════════════════════════════════════════════════════

/// Resolved connection parameters for the Google project.
pub struct CloudSession {
    pub project_id: String,
    /// Base URL of the Firestore documents resource.
    pub firestore_base: String,
    pub tokens: TokenProvider,
    pub http: reqwest::Client,
}

/// Lazily-initialized `CloudSession`, shared by every component that talks
/// to the project. Credentials are read on first use, never again.
pub struct LazyCloudSession {
    config: StoreConfig,
    http: reqwest::Client,
    cell: OnceCell<Arc<CloudSession>>,
}

impl LazyCloudSession {
    pub fn new(config: StoreConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            cell: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> Result<Arc<CloudSession>, StoreError> {
        self.cell
            .get_or_try_init(|| async { self.connect().map(Arc::new) })
            .await
            .cloned()
    }

    fn connect(&self) -> Result<CloudSession, StoreError> {
        if let Some(host) = &self.config.emulator_host {
            let project_id = self
                .config
                .project_id
                .clone()
                .unwrap_or_else(|| "demo-publiceye".to_string());
            tracing::info!(%host, project = %project_id, "Using Firestore emulator");
            return Ok(CloudSession {
                firestore_base: firestore_base(&format!("http://{host}"), &project_id),
                project_id,
                tokens: TokenProvider::Fixed("owner".to_string()),
                http: self.http.clone(),
            });
        }

        let account = ServiceAccount::from_file(&self.config.service_account_path)?;
        let project_id = self
            .config
            .project_id
            .clone()
            .unwrap_or_else(|| account.project_id.clone());
        tracing::info!(project = %project_id, client = %account.client_email, "Document store session initialized");

        Ok(CloudSession {
            firestore_base: firestore_base("https://firestore.googleapis.com", &project_id),
            project_id,
            tokens: TokenProvider::service_account(account, self.http.clone()),
            http: self.http.clone(),
        })
    }
}

fn firestore_base(origin: &str, project_id: &str) -> String {
    format!("{origin}/v1/projects/{project_id}/databases/(default)/documents")
}
