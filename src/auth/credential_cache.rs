use std::fmt;

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// A cached token is not handed out once it is this close to expiry.
const REFRESH_MARGIN_SECS: i64 = 5 * 60;
/// Assumed validity when the login response carries no expiry hint.
const DEFAULT_VALIDITY_SECS: i64 = 24 * 60 * 60;
const MAX_VALIDITY_SECS: u64 = 365 * 24 * 60 * 60;

/// Fixed account the daemon logs in with.
#[derive(Clone, Serialize)]
pub struct SystemCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SystemCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: String,
    /// Seconds the token stays valid.
    #[serde(default, rename = "expiresIn", alias = "expires_in")]
    expires_in: Option<u64>,
}

/// Bearer token for the processing API plus its expiry.
///
/// Starts empty, is filled by the first `get_token` call and replaced on every successful
/// login. Refresh needs `&mut self`, so at most one login can be in flight per cache.
#[derive(Debug)]
pub struct CredentialCache {
    login_url: String,
    credentials: SystemCredentials,
    token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl CredentialCache {
    pub fn new(api_base_url: &str, credentials: SystemCredentials) -> Self {
        Self {
            login_url: format!("{}/api/auth/login", api_base_url.trim_end_matches('/')),
            credentials,
            token: None,
            expires_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Seed the cache with a token obtained elsewhere.
    pub fn with_token(mut self, token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        self.token = Some(token.into());
        self.expires_at = expires_at;
        self
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The cached token, if it is still outside the refresh margin at `now`.
    pub fn usable_token(&self, now: DateTime<Utc>) -> Option<&str> {
        self.token
            .as_deref()
            .filter(|_| now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at)
    }

    /// Returns a usable token, logging in first if the cached one is missing or stale.
    ///
    /// On failure the cache is left as it was.
    pub fn get_token(&mut self, http: &Client) -> Result<String, AuthError> {
        if let Some(token) = self.usable_token(Utc::now()) {
            return Ok(token.to_string());
        }

        let login = self.login(http).inspect_err(|e| {
            log::error!("login as {} failed: {e}", self.credentials.email);
        })?;

        let validity = login
            .expires_in
            .map(|secs| Duration::seconds(secs.min(MAX_VALIDITY_SECS) as i64))
            .unwrap_or_else(|| Duration::seconds(DEFAULT_VALIDITY_SECS));
        self.expires_at = Utc::now() + validity;
        self.token = Some(login.token.clone());

        log::info!("API token refreshed, valid until {}", self.expires_at);
        Ok(login.token)
    }

    fn login(&self, http: &Client) -> Result<LoginResponse, AuthError> {
        let response = http.post(&self.login_url).json(&self.credentials).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        let body = response.text()?;

        let login: LoginResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        if login.token.is_empty() {
            return Err(AuthError::InvalidResponse("no token field".to_string()));
        }
        Ok(login)
    }
}
