//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BOOKNOOK_BACKEND_URL` - Base URL of the backend (http or https)
//!
//! ## Optional
//! - `BOOKNOOK_REQUEST_TIMEOUT_SECS` - Whole-request timeout (default: 30)
//! - `BOOKNOOK_CONNECT_TIMEOUT_SECS` - Connect timeout (default: 10)
//! - `BOOKNOOK_REALTIME_TIMEOUT_SECS` - Lifetime of one realtime stream before it is recycled (default: 600)
//! - `BOOKNOOK_LOOKUP_RETRY_INITIAL_MS` - First delay before retrying a failed account lookup (default: 500)
//! - `BOOKNOOK_LOOKUP_RETRY_MAX_MS` - Upper bound of that delay (default: 30000)
//! - `BOOKNOOK_SESSION_TOKEN` - Token of a persisted session to resume at start-up

use std::time::Duration;

use thiserror::Error;

pub(crate) const DEFAULT_ACCOUNTS_COLLECTION: &str = "users";
pub(crate) const DEFAULT_REALTIME_TIMEOUT: Duration = Duration::from_secs(600);

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    /// A variable is set but unusable.
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    /// The HTTP client could not be built.
    #[error("Could not build the HTTP client: {0}")]
    HttpClient(String),
}

/// Everything the client needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// How to reach the backend.
    pub backend: BackendConfig,
    /// Session observer tuning.
    pub session: SessionConfig,
    /// Where each kind of document and blob lives.
    pub collections: Collections,
}

/// Connection settings of the REST collaborator.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL, without trailing slash.
    pub base_url: String,
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Lifetime of one realtime stream.
    pub realtime_timeout: Duration,
    /// Auth collection accounts sign in against.
    pub auth_collection: String,
    /// Persisted session token to resume.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("realtime_timeout", &self.realtime_timeout)
            .field("auth_collection", &self.auth_collection)
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Retry policy of the account lookup done for every new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay before the first retry.
    pub lookup_retry_initial: Duration,
    /// Cap of the doubling delay.
    pub lookup_retry_max: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lookup_retry_initial: Duration::from_millis(500),
            lookup_retry_max: Duration::from_secs(30),
        }
    }
}

/// Collection and bucket names of the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    /// Account profiles, keyed by account id.
    pub accounts: String,
    /// Book catalog.
    pub books: String,
    /// Borrow records.
    pub borrow_records: String,
    /// Member suggestions.
    pub suggestions: String,
    /// Bucket for identity documents submitted at sign-up.
    pub identity_documents: String,
    /// Bucket for profile pictures.
    pub profile_pictures: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            accounts: DEFAULT_ACCOUNTS_COLLECTION.to_owned(),
            books: "books".to_owned(),
            borrow_records: "borrowHistory".to_owned(),
            suggestions: "suggestions".to_owned(),
            identity_documents: "self_documents".to_owned(),
            profile_pictures: "profilePictures".to_owned(),
        }
    }
}

impl Collections {
    /// Blob path of an account's identity document.
    #[must_use]
    pub fn identity_document_path(&self, uid: &str) -> String {
        format!("{}/{uid}", self.identity_documents)
    }

    /// Blob path of an account's profile picture.
    #[must_use]
    pub fn profile_picture_path(&self, uid: &str) -> String {
        format!("{}/{uid}", self.profile_pictures)
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("BOOKNOOK_BACKEND_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("BOOKNOOK_BACKEND_URL".to_owned()))?;
        let base_url = base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidEnvVar(
                "BOOKNOOK_BACKEND_URL".to_owned(),
                "must start with http:// or https://".to_owned(),
            ));
        }

        let backend = BackendConfig {
            base_url,
            request_timeout: Duration::from_secs(parse_or(&lookup, "BOOKNOOK_REQUEST_TIMEOUT_SECS", 30)?),
            connect_timeout: Duration::from_secs(parse_or(&lookup, "BOOKNOOK_CONNECT_TIMEOUT_SECS", 10)?),
            realtime_timeout: Duration::from_secs(parse_or(
                &lookup,
                "BOOKNOOK_REALTIME_TIMEOUT_SECS",
                DEFAULT_REALTIME_TIMEOUT.as_secs(),
            )?),
            auth_collection: DEFAULT_ACCOUNTS_COLLECTION.to_owned(),
            session_token: lookup("BOOKNOOK_SESSION_TOKEN").filter(|token| !token.is_empty()),
        };

        let session = SessionConfig {
            lookup_retry_initial: Duration::from_millis(parse_or(
                &lookup,
                "BOOKNOOK_LOOKUP_RETRY_INITIAL_MS",
                500,
            )?),
            lookup_retry_max: Duration::from_millis(parse_or(
                &lookup,
                "BOOKNOOK_LOOKUP_RETRY_MAX_MS",
                30_000,
            )?),
        };

        if session.lookup_retry_initial.is_zero() || session.lookup_retry_initial > session.lookup_retry_max {
            return Err(ConfigError::InvalidEnvVar(
                "BOOKNOOK_LOOKUP_RETRY_INITIAL_MS".to_owned(),
                "must be positive and not above BOOKNOOK_LOOKUP_RETRY_MAX_MS".to_owned(),
            ));
        }

        Ok(Self {
            backend,
            session,
            collections: Collections::default(),
        })
    }
}

/// Collection names may only contain alphanumeric characters and underscores.
pub(crate) fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn parse_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar(key.to_owned(), format!("not a number: {raw}")))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_url_is_set() {
        let config = load(&[("BOOKNOOK_BACKEND_URL", "https://books.example.com/")]).unwrap();

        assert_eq!(config.backend.base_url, "https://books.example.com");
        assert_eq!(config.backend.request_timeout, Duration::from_secs(30));
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.collections.borrow_records, "borrowHistory");
        assert!(config.backend.session_token.is_none());
    }

    #[test]
    fn missing_url_is_reported() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnvVar(key)) if key == "BOOKNOOK_BACKEND_URL"));
    }

    #[test]
    fn rejects_non_http_urls_and_bad_numbers() {
        assert!(matches!(
            load(&[("BOOKNOOK_BACKEND_URL", "ftp://x")]),
            Err(ConfigError::InvalidEnvVar(..))
        ));
        assert!(matches!(
            load(&[
                ("BOOKNOOK_BACKEND_URL", "http://x"),
                ("BOOKNOOK_CONNECT_TIMEOUT_SECS", "ten"),
            ]),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "BOOKNOOK_CONNECT_TIMEOUT_SECS"
        ));
    }

    #[test]
    fn retry_floor_cannot_exceed_ceiling() {
        let result = load(&[
            ("BOOKNOOK_BACKEND_URL", "http://x"),
            ("BOOKNOOK_LOOKUP_RETRY_INITIAL_MS", "5000"),
            ("BOOKNOOK_LOOKUP_RETRY_MAX_MS", "100"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn blob_paths_use_bucket_names() {
        let collections = Collections::default();
        assert_eq!(collections.profile_picture_path("u1"), "profilePictures/u1");
        assert_eq!(collections.identity_document_path("u1"), "self_documents/u1");
        assert!(is_valid_collection_name(&collections.borrow_records));
        assert!(!is_valid_collection_name("borrow-history"));
    }
}
