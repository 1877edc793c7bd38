//! OAuth2 client-credentials authentication for the Fabric and Power BI APIs.
//!
//! [`TokenStore`] owns the single cached bearer token of a client. The token
//! is acquired lazily, reused until it expires, and optionally persisted to a
//! JSON file so that a later process can start with a warm cache.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{FabricError, Result};

/// Scope requested for every token. Fabric and Power BI accept the same audience.
pub const FABRIC_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

/// Default identity provider host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Service principal credentials, fixed for the lifetime of a client.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub tenant_id: String,
    /// Carried for profiles that declare a user; the client-credentials grant ignores it.
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            tenant_id: tenant_id.into(),
            username: None,
            password: None,
        }
    }
}

/// On-disk shape of a persisted token, identical to the token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTokenRecord {
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_expires_in: Option<i64>,
    pub access_token: String,
}

/// A bearer token with its absolute expiry.
#[derive(Debug, Clone)]
pub struct Token {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Returns `None` when `expires_in` does not fit a timestamp.
    fn from_record(record: &PersistedTokenRecord, issued_at: DateTime<Utc>) -> Option<Self> {
        let expires_at = Duration::try_seconds(record.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))?;
        Some(Self {
            access_token: record.access_token.clone(),
            expires_at,
        })
    }

    /// Returns true while `now + grace < expires_at`.
    fn is_valid_at(&self, now: DateTime<Utc>, grace_period: Duration) -> bool {
        now + grace_period < self.expires_at
    }
}

/// Construction options for [`TokenStore`].
#[derive(Debug, Clone)]
pub struct TokenStoreOptions {
    /// Identity provider host, without tenant.
    pub authority_host: String,
    /// Where to persist the token endpoint response, if anywhere.
    pub token_file: Option<PathBuf>,
    /// Refresh this long before the real expiry. Zero by default.
    pub grace_period: Duration,
    /// HTTP client used for token requests.
    pub http_client: reqwest::Client,
}

impl Default for TokenStoreOptions {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            token_file: None,
            grace_period: Duration::zero(),
            http_client: reqwest::Client::new(),
        }
    }
}

/// Owns the cached token of one client.
///
/// The cache is behind an async mutex that stays locked across acquisition,
/// so concurrent callers holding an expired token trigger exactly one token
/// request and one file write.
#[derive(Debug)]
pub struct TokenStore {
    credentials: Credentials,
    authority_host: String,
    token_file: Option<PathBuf>,
    grace_period: Duration,
    http_client: reqwest::Client,
    cached_token: Mutex<Option<Token>>,
}

impl TokenStore {
    /// Creates the store and loads the persisted token, if configured.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Decode`] when the token file exists but is not a
    /// valid token record, and [`FabricError::TokenFile`] when it cannot be read.
    pub fn new(credentials: Credentials, options: TokenStoreOptions) -> Result<Self> {
        let cached = match options.token_file.as_deref() {
            Some(path) => Self::load_from_file(path)?,
            None => None,
        };

        Ok(Self {
            credentials,
            authority_host: options.authority_host.trim_end_matches('/').to_string(),
            token_file: options.token_file,
            grace_period: options.grace_period,
            http_client: options.http_client,
            cached_token: Mutex::new(cached),
        })
    }

    /// Reads a persisted token record.
    ///
    /// A missing file yields `Ok(None)`. The expiry is rebased on the load time
    /// (`now + expires_in`), not the original issue time.
    pub fn load_from_file(path: &Path) -> Result<Option<Token>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persisted token");
                return Ok(None);
            }
            Err(e) => {
                return Err(FabricError::TokenFile {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        let record: PersistedTokenRecord = serde_json::from_str(&content)
            .map_err(|e| FabricError::decode(path.display().to_string(), e))?;

        let token = Token::from_record(&record, Utc::now()).ok_or_else(|| {
            FabricError::decode(
                path.display().to_string(),
                serde::de::Error::custom(format!("expires_in out of range: {}", record.expires_in)),
            )
        })?;
        debug!(
            path = %path.display(),
            "loaded persisted token, expires at {}",
            token.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        Ok(Some(token))
    }

    /// Returns a usable bearer token, acquiring a new one if needed.
    ///
    /// No network call is made while the cached token is valid. On failure the
    /// previously cached token, if any, is left in place.
    #[instrument(skip(self), fields(tenant_id = %self.credentials.tenant_id))]
    pub async fn ensure_valid_token(&self) -> Result<String> {
        let mut cache = self.cached_token.lock().await;

        if let Some(ref token) = *cache
            && token.is_valid_at(Utc::now(), self.grace_period)
        {
            debug!("Using cached token");
            return Ok(token.access_token.clone());
        }

        debug!("Acquiring access token");
        let (token, raw) = self.acquire_token().await?;

        if let Some(ref path) = self.token_file
            && let Err(e) = persist(path, &raw)
        {
            warn!(path = %path.display(), error = %e, "failed to persist token");
        }

        let access_token = token.access_token.clone();
        *cache = Some(token);
        Ok(access_token)
    }

    /// Drops the cached token, forcing acquisition on next use.
    pub async fn invalidate(&self) {
        let mut cache = self.cached_token.lock().await;
        *cache = None;
    }

    /// Expiry of the cached token, if one is cached.
    pub async fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.cached_token.lock().await.as_ref().map(|t| t.expires_at)
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.credentials.tenant_id
        )
    }

    /// Performs the client-credentials grant. Returns the token and the raw response.
    async fn acquire_token(&self) -> Result<(Token, serde_json::Value)> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            (
                "client_secret",
                self.credentials.client_secret.expose_secret(),
            ),
            ("scope", FABRIC_SCOPE),
        ];
        let form = serde_urlencoded::to_string(params)
            .map_err(|e| FabricError::Auth(format!("Failed to encode token request: {e}")))?;

        let response = self
            .http_client
            .post(self.token_url())
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(form)
            .send()
            .await
            .map_err(|e| FabricError::Auth(format!("Token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FabricError::Auth(format!("Failed to read token response: {e}")))?;

        if !status.is_success() {
            return Err(FabricError::Auth(format!(
                "Token request failed with status {status}: {body}"
            )));
        }

        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| FabricError::Auth(format!("Failed to parse token response: {e}")))?;
        let record: PersistedTokenRecord = serde_json::from_value(raw.clone())
            .map_err(|e| FabricError::Auth(format!("Token response missing fields: {e}")))?;

        let token = Token::from_record(&record, Utc::now()).ok_or_else(|| {
            FabricError::Auth(format!(
                "Token response expires_in out of range: {}",
                record.expires_in
            ))
        })?;
        info!(
            "Acquired new token, expires at {}",
            token.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        Ok((token, raw))
    }
}

/// Writes the token response next to `path` and renames it into place.
fn persist(path: &Path, raw: &serde_json::Value) -> Result<()> {
    let io_err = |source| FabricError::TokenFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let content =
        serde_json::to_vec(raw).map_err(|e| FabricError::decode(path.display().to_string(), e))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    write_owner_only(&tmp_path, &content).map_err(io_err)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_err(e));
    }
    Ok(())
}

/// Creates or truncates `path` readable by the owner only (Unix).
fn write_owner_only(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)?;

    // mode only applies on creation; a leftover temp file keeps its old bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
