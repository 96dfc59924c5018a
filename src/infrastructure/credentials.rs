// Warehouse credentials - resolution order, parsing and access-token refresh
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error(
        "no warehouse credentials: add a [credentials] section to config/secrets.toml \
         or point GOOGLE_APPLICATION_CREDENTIALS at a credentials file"
    )]
    Missing,
    #[error("cannot read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse credentials file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid service account key: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token endpoint rejected the credentials ({status}): {body}")]
    Rejected { status: u16, body: String },
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// OAuth client plus long-lived refresh token
#[derive(Clone, Deserialize, PartialEq)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Clone, Deserialize, PartialEq)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

// Secrets stay out of logs
impl std::fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    AuthorizedUser(AuthorizedUser),
    ServiceAccount(ServiceAccountKey),
}

impl Credentials {
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::AuthorizedUser(_) => "authorized_user",
            Credentials::ServiceAccount(_) => "service_account",
        }
    }

    /// JSON by default, TOML when the file extension says so
    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            toml::from_str(&contents).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&contents).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| CredentialsError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// Inline secrets win over the credentials file named by the environment
pub fn resolve_credentials(
    inline: Option<AuthorizedUser>,
    env_path: Option<PathBuf>,
) -> Result<Credentials, CredentialsError> {
    if let Some(user) = inline {
        tracing::info!(source = "config/secrets", "using inline warehouse credentials");
        return Ok(Credentials::AuthorizedUser(user));
    }
    match env_path {
        Some(path) if !path.as_os_str().is_empty() => {
            let credentials = Credentials::from_file(&path)?;
            tracing::info!(
                source = %path.display(),
                kind = credentials.kind(),
                "using warehouse credentials file"
            );
            Ok(credentials)
        }
        _ => Err(CredentialsError::Missing),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Hands out bearer tokens, exchanging credentials only when the cached
/// token is missing or about to expire
pub struct TokenProvider {
    credentials: Credentials,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(credentials: Credentials, http: reqwest::Client) -> Self {
        Self {
            credentials,
            http,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, CredentialsError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        let response = self.exchange().await?;
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        tracing::debug!(
            kind = self.credentials.kind(),
            expires_in_secs = lifetime.as_secs(),
            "access token refreshed"
        );
        *cached = Some(CachedToken {
            access_token: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        });
        Ok(response.access_token)
    }

    /// Forget the cached token, the next call exchanges again
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    async fn exchange(&self) -> Result<TokenResponse, CredentialsError> {
        let request = match &self.credentials {
            Credentials::AuthorizedUser(user) => self.http.post(&user.token_uri).form(&[
                ("grant_type", "refresh_token"),
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
            ]),
            Credentials::ServiceAccount(key) => {
                let assertion = sign_assertion(key, chrono::Utc::now().timestamp())?;
                self.http
                    .post(&key.token_uri)
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

fn sign_assertion(key: &ServiceAccountKey, now: i64) -> Result<String, CredentialsError> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: BIGQUERY_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(jsonwebtoken::encode(&header, &claims, &encoding_key)?)
}
