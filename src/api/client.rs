use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::auth::credential_cache::{CredentialCache, SystemCredentials};
use crate::domain::email::NormalizedEmail;
use crate::error::DeliveryError;

/// Everything needed to reach the processing API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub credentials: SystemCredentials,
    /// Sent as `X-Internal-Token` on submit when set.
    pub internal_token: Option<String>,
    pub timeout: Duration,
}

/// Successful reply from the processing endpoint. The body shape is not interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

pub struct DeliveryClient {
    http: Client,
    process_url: String,
    internal_token: Option<String>,
    credentials: CredentialCache,
}

impl DeliveryClient {
    pub fn new(cfg: ApiConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(cfg.timeout).build()?;
        let base = cfg.base_url.trim_end_matches('/');
        Ok(Self {
            http,
            process_url: format!("{base}/api/mail/process"),
            internal_token: cfg.internal_token,
            credentials: CredentialCache::new(base, cfg.credentials),
        })
    }

    /// Replace the credential cache, e.g. to reuse a token across restarts.
    pub fn with_credentials(mut self, credentials: CredentialCache) -> Self {
        self.credentials = credentials;
        self
    }

    /// POST one record to the processing endpoint. No retries happen here.
    pub fn deliver(&mut self, email: &NormalizedEmail) -> Result<ApiResponse, DeliveryError> {
        match self.submit(email) {
            Ok(response) => {
                log::info!("delivered {} (status {})", email.label(), response.status);
                log::debug!("API response: {}", response.body);
                Ok(response)
            }
            Err(e) => {
                log::error!("delivery of {} failed: {e}", email.label());
                Err(e)
            }
        }
    }

    fn submit(&mut self, email: &NormalizedEmail) -> Result<ApiResponse, DeliveryError> {
        let token = self.credentials.get_token(&self.http)?;

        let mut request = self.http.post(&self.process_url).bearer_auth(token).json(email);
        if let Some(internal) = &self.internal_token {
            request = request.header("X-Internal-Token", internal);
        }
        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        let text = response.text()?;

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }
}
