//! Access token acquisition for Google APIs.
//!
//! Three strategies are supported: no authentication (emulators and tests), a service account
//! key that signs its own JWT assertion, and the metadata server available on Cloud Run and
//! GCE. Tokens are cached until shortly before they expire.

use crate::config::ServiceAccountKey;
use crate::google::CLOUD_PLATFORM_SCOPE;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;

const DEFAULT_METADATA_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Errors raised while obtaining an access token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The service account private key could not be used for signing.
    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    /// The token endpoint could not be reached.
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The token endpoint answered with a non-success status.
    #[error("token endpoint returned {status}: {body}")]
    Rejected {
        /// HTTP status returned by the endpoint.
        status: reqwest::StatusCode,
        /// Response body for diagnostics.
        body: String,
    },
}

enum Strategy {
    Anonymous,
    ServiceAccount(ServiceAccountKey),
    MetadataServer(String),
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
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
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Produces bearer tokens for outgoing Google API requests.
pub struct TokenSource {
    strategy: Strategy,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    /// Source that never attaches credentials, for emulators and local mocks.
    pub fn anonymous() -> Self {
        Self::with_strategy(Strategy::Anonymous)
    }

    /// Source that signs assertions with an explicit service account key.
    pub fn service_account(key: ServiceAccountKey) -> Self {
        Self::with_strategy(Strategy::ServiceAccount(key))
    }

    /// Source that asks the instance metadata server for the default account token.
    pub fn metadata_server() -> Self {
        Self::with_strategy(Strategy::MetadataServer(DEFAULT_METADATA_URL.to_string()))
    }

    /// Pick the explicit key when configured, otherwise ambient credentials.
    pub fn from_credentials(key: Option<ServiceAccountKey>) -> Self {
        match key {
            Some(key) => Self::service_account(key),
            None => Self::metadata_server(),
        }
    }

    fn with_strategy(strategy: Strategy) -> Self {
        let http = Client::builder()
            .user_agent("mining-analysis/auth")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            strategy,
            http,
            cached: Mutex::new(None),
        }
    }

    /// Return a bearer token, or `None` when the source is anonymous.
    pub async fn bearer(&self) -> Result<Option<String>, AuthError> {
        if matches!(self.strategy, Strategy::Anonymous) {
            return Ok(None);
        }

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() + EXPIRY_MARGIN < token.expires_at
        {
            return Ok(Some(token.value.clone()));
        }

        let response = match &self.strategy {
            Strategy::Anonymous => return Ok(None),
            Strategy::ServiceAccount(key) => self.exchange_assertion(key).await?,
            Strategy::MetadataServer(url) => self.fetch_from_metadata(url).await?,
        };
        tracing::debug!(expires_in = response.expires_in, "Obtained access token");

        let value = response.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        });
        Ok(Some(value))
    }

    async fn exchange_assertion(&self, key: &ServiceAccountKey) -> Result<TokenResponse, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        parse_token_response(response).await
    }

    async fn fetch_from_metadata(&self, url: &str) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        parse_token_response(response).await
    }
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse, AuthError> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = AuthError::Rejected { status, body };
        tracing::error!(error = %error, "Token request rejected");
        Err(error)
    }
}
