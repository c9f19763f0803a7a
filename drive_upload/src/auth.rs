//! Service account authentication for Google APIs.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{DriveError, Result};
use crate::models::{ServiceAccountCredentials, TokenResponse};

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested for the service account.
pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/drive.metadata.readonly",
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/drive",
];

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // Space separated OAuth scopes
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Load service account credentials from a `.json` file path or from a
/// base64 encoded JSON document.
///
/// A value is only treated as a path when it ends with `.json` and the file
/// exists; everything else is decoded as base64.
pub fn load_credentials(credentials_arg: &str) -> Result<ServiceAccountCredentials> {
    let path = Path::new(credentials_arg);
    if credentials_arg.ends_with(".json") && path.exists() {
        let content = fs::read_to_string(path).map_err(DriveError::CredentialsFileError)?;
        return Ok(serde_json::from_str(&content)?);
    }
    decode_credentials(credentials_arg)
}

/// Decode base64 encoded service account JSON.
pub fn decode_credentials(encoded: &str) -> Result<ServiceAccountCredentials> {
    let compact: String = encoded.split_whitespace().collect();
    let raw = STANDARD.decode(compact)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Authenticator for Google APIs using service account credentials.
#[derive(Clone)]
pub struct Authenticator {
    credentials: Arc<ServiceAccountCredentials>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl Authenticator {
    /// Create an authenticator from a CLI credentials argument
    /// (file path or base64 JSON, see [`load_credentials`]).
    pub fn from_arg(credentials_arg: &str) -> Result<Self> {
        Ok(Self::new(load_credentials(credentials_arg)?))
    }

    /// Create a new authenticator from credentials.
    pub fn new(credentials: ServiceAccountCredentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    /// The service account's email address.
    pub fn account_email(&self) -> &str {
        &self.credentials.client_email
    }

    fn token_uri(&self) -> &str {
        self.credentials.token_uri.as_deref().unwrap_or(TOKEN_URI)
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                // Add 60 second buffer before expiration
                let buffer = Duration::from_secs(60);
                if token.expires_at > SystemTime::now() + buffer {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = self.refresh_token().await?;

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    /// Refresh the access token using JWT assertion.
    async fn refresh_token(&self) -> Result<CachedToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DriveError::AuthenticationError(e.to_string()))?
            .as_secs();

        let claims = Claims {
            iss: self.credentials.client_email.clone(),
            scope: SCOPES.join(" "),
            aud: self.token_uri().to_string(),
            iat: now,
            exp: now + 3600, // 1 hour
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ];

        tracing::debug!(token_uri = self.token_uri(), "requesting access token");
        let response = self
            .client
            .post(self.token_uri())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;

        let expires_at = SystemTime::now() + Duration::from_secs(token_response.expires_in);

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at,
        })
    }
}
