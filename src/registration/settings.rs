//! Registration read from the local settings file
//!
//! The registration flow stores the account id in a small TOML file. This
//! source reads it on every call and, when configured, asks the matching
//! service whether the id is still known.

use crate::config::{RegistrationSettings, ResolverSettings};
use crate::error::{LinkError, Result};
use crate::registration::RegistrationSource;
use crate::types::RegistrationStatus;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const AUTH_PATH: &str = "/auth";

#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(alias = "discord_id")]
    account_id: Option<String>,
}

/// Read the stored account id, `None` if the file or the id is missing
pub async fn read_account_id(path: &Path) -> Result<Option<String>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LinkError::SettingsError {
                message: format!("failed to read {}: {}", path.display(), e),
            }
            .into())
        }
    };

    let settings: SettingsFile = toml::from_str(&raw).map_err(|e| LinkError::SettingsError {
        message: format!("failed to parse {}: {}", path.display(), e),
    })?;

    Ok(settings
        .account_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty()))
}

/// Checks stored account ids against the matching service
pub struct AccountVerifier {
    http: reqwest::Client,
    base_url: String,
}

impl AccountVerifier {
    pub fn new(settings: &ResolverSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| LinkError::HttpClientError {
                message: format!("Failed to create registration client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `Some(known)` when the service gave a definite answer
    pub async fn is_known(&self, account_id: &str) -> Option<bool> {
        let url = format!("{}{}", self.base_url, AUTH_PATH);
        let response = match self
            .http
            .get(&url)
            .query(&[("discord_id", account_id)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Registration check failed: {}", e.without_url());
                return None;
            }
        };

        match response.status() {
            StatusCode::OK => Some(true),
            StatusCode::NOT_FOUND => Some(false),
            status => {
                warn!("Registration check returned {}", status);
                None
            }
        }
    }
}

/// Registration source backed by the settings file
pub struct SettingsFileRegistration {
    path: PathBuf,
    verifier: Option<AccountVerifier>,
}

impl SettingsFileRegistration {
    pub fn new(path: PathBuf, verifier: Option<AccountVerifier>) -> Self {
        Self { path, verifier }
    }

    /// Build from configuration
    pub fn from_settings(
        registration: &RegistrationSettings,
        resolver: &ResolverSettings,
    ) -> Result<Self> {
        let verifier = if registration.verify_with_service {
            Some(AccountVerifier::new(resolver)?)
        } else {
            None
        };
        Ok(Self::new(registration.settings_location(), verifier))
    }
}

#[async_trait]
impl RegistrationSource for SettingsFileRegistration {
    async fn registration_status(&self) -> RegistrationStatus {
        let account_id = match read_account_id(&self.path).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!("No registration stored at {}", self.path.display());
                return RegistrationStatus::unregistered();
            }
            Err(e) => {
                warn!("Unreadable registration settings: {}", e);
                return RegistrationStatus::unregistered();
            }
        };

        match &self.verifier {
            Some(verifier) => match verifier.is_known(&account_id).await {
                Some(false) => {
                    warn!("Stored account is not registered with the matching service");
                    RegistrationStatus::unregistered()
                }
                // No definite answer: the stored registration stands
                Some(true) | None => RegistrationStatus::registered(account_id),
            },
            None => RegistrationStatus::registered(account_id),
        }
    }
}
