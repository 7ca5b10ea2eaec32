use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Upper bound applied when `ANALYSIS_MAX_CONCURRENCY` is not provided.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
/// Port used when neither `PORT` nor `SERVER_PORT` is set.
pub const DEFAULT_SERVER_PORT: u16 = 8080;
/// Public Google Maps endpoint used for geocoding lookups.
pub const DEFAULT_GEOCODING_BASE_URL: &str = "https://maps.googleapis.com";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Service account credential could not be read or parsed.
    #[error("Invalid service account credential: {0}")]
    InvalidCredential(String),
}

/// Parsed Google service account key, as downloaded from the cloud console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Project owning the service account.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Identity used as the JWT issuer.
    pub client_email: String,
    /// PEM encoded RSA private key.
    pub private_key: String,
    /// OAuth token endpoint the signed assertion is exchanged at.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Runtime configuration for the analysis service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage bucket holding uploaded project documents.
    pub storage_bucket: String,
    /// Firestore project that owns the `projects` and `history` collections.
    pub firestore_project_id: String,
    /// Explicit service account; `None` falls back to the metadata server.
    pub service_account: Option<ServiceAccountKey>,
    /// Google Maps key; geocoding is skipped when absent.
    pub geocoding_api_key: Option<String>,
    /// Base URL of the geocoding API.
    pub geocoding_base_url: String,
    /// Optional remote NER model server; the lexical recognizer is used otherwise.
    pub ner_service_url: Option<String>,
    /// `host:port` of a Firestore emulator, disabling authentication.
    pub firestore_emulator_host: Option<String>,
    /// Base URL of a storage emulator, disabling authentication.
    pub storage_emulator_host: Option<String>,
    /// Maximum number of pipeline executions running at once.
    pub max_concurrency: usize,
    /// Port the HTTP server listens on.
    pub server_port: u16,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_account = load_env_optional("FIREBASE_SERVICE_ACCOUNT")
            .map(|value| parse_service_account(&value))
            .transpose()?;

        let firestore_project_id = load_env_optional("FIREBASE_PROJECT_ID")
            .or_else(|| load_env_optional("GOOGLE_CLOUD_PROJECT"))
            .or_else(|| {
                service_account
                    .as_ref()
                    .and_then(|account| account.project_id.clone())
            })
            .ok_or_else(|| ConfigError::MissingVariable("FIREBASE_PROJECT_ID".to_string()))?;

        let max_concurrency = load_env_optional("ANALYSIS_MAX_CONCURRENCY")
            .map(|value| {
                value
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue("ANALYSIS_MAX_CONCURRENCY".into()))
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1);

        let server_port = load_env_optional("PORT")
            .or_else(|| load_env_optional("SERVER_PORT"))
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".into()))
            })
            .transpose()?
            .unwrap_or(DEFAULT_SERVER_PORT);

        Ok(Self {
            storage_bucket: load_env("FIREBASE_STORAGE_BUCKET")?,
            firestore_project_id,
            service_account,
            geocoding_api_key: load_env_optional("GOOGLE_MAPS_API_KEY"),
            geocoding_base_url: load_env_optional("GEOCODING_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEOCODING_BASE_URL.to_string()),
            ner_service_url: load_env_optional("NER_SERVICE_URL"),
            firestore_emulator_host: load_env_optional("FIRESTORE_EMULATOR_HOST"),
            storage_emulator_host: load_env_optional("STORAGE_EMULATOR_HOST"),
            max_concurrency,
            server_port,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Accept either inline JSON or a path to a key file.
fn parse_service_account(value: &str) -> Result<ServiceAccountKey, ConfigError> {
    let trimmed = value.trim();
    let raw = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        std::fs::read_to_string(trimmed)
            .map_err(|err| ConfigError::InvalidCredential(format!("{trimmed}: {err}")))?
    };
    serde_json::from_str(&raw).map_err(|err| ConfigError::InvalidCredential(err.to_string()))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}
