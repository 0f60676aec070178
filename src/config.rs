use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::client::ApiConfig;
use crate::auth::credential_cache::SystemCredentials;
use crate::auth::token_store;
use crate::daemon::retry::RetryPolicy;
use crate::mail::normalizer::BodyPreference;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_pipe_path")]
    pub pipe_path: PathBuf,
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    pub api_base_url: String,
    pub system_email: String,
    /// Falls back to the keyring, then `MAIL_INTAKE_PASSWORD`, when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub strip_html: bool,
    #[serde(default)]
    pub body_preference: BodyPreference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_dir: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connection settings for the processing API, with the system password resolved.
    pub fn api_config(&self) -> Result<ApiConfig> {
        let password = match &self.system_password {
            Some(p) => p.clone(),
            None => token_store::load_password(&self.system_email)?
                .or_else(|| std::env::var(PASSWORD_ENV).ok())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "no password for {}: set system_password, run set-password, or export {PASSWORD_ENV}",
                        self.system_email
                    )
                })?,
        };

        Ok(ApiConfig {
            base_url: self.api_base_url.clone(),
            credentials: SystemCredentials {
                email: self.system_email.clone(),
                password,
            },
            internal_token: self.internal_token.clone(),
            timeout: self.request_timeout(),
        })
    }
}

pub const PASSWORD_ENV: &str = "MAIL_INTAKE_PASSWORD";

fn default_pipe_path() -> PathBuf {
    PathBuf::from("/var/spool/email-processor")
}

fn default_output_file() -> PathBuf {
    PathBuf::from("/var/log/mail_intake/emails.json")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("mail_intake"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

fn template() -> Config {
    Config {
        pipe_path: default_pipe_path(),
        output_file: default_output_file(),
        api_base_url: "https://api.example.com".to_string(),
        system_email: "system@example.com".to_string(),
        system_password: None,
        internal_token: None,
        request_timeout_secs: default_request_timeout_secs(),
        strip_html: true,
        body_preference: BodyPreference::default(),
        dead_letter_dir: None,
        retry: RetryConfig::default(),
    }
}

/// Load the config from `path`, or from the default location when `None`.
///
/// A missing default config is replaced by a template and reported as an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = config_path()?;
            if !p.exists() {
                // create a template config for users to edit
                let tom = toml::to_string_pretty(&template())?;
                fs::write(&p, tom)?;
                return Err(anyhow::anyhow!(
                    "Created template config at {}; edit it and run again",
                    p.display()
                ));
            }
            p
        }
    };
    let s = fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}
