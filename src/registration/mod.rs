//! Registration status lookup
//!
//! The registration subsystem decides whether this machine's account may use
//! the matching service. The join agent only reads it, once per join.

pub mod settings;

use crate::types::RegistrationStatus;
use async_trait::async_trait;

pub use settings::{AccountVerifier, SettingsFileRegistration};

/// Trait for registration status sources
#[async_trait]
pub trait RegistrationSource: Send + Sync {
    /// Current registration status, read fresh on every call
    async fn registration_status(&self) -> RegistrationStatus;
}

/// Fixed registration status
#[derive(Debug, Clone)]
pub struct StaticRegistration {
    status: RegistrationStatus,
}

impl StaticRegistration {
    pub fn new(status: RegistrationStatus) -> Self {
        Self { status }
    }

    /// A source that always reports `account` as registered
    pub fn registered(account: impl Into<String>) -> Self {
        Self::new(RegistrationStatus::registered(account))
    }

    /// A source that never reports a registration
    pub fn unregistered() -> Self {
        Self::new(RegistrationStatus::unregistered())
    }
}

#[async_trait]
impl RegistrationSource for StaticRegistration {
    async fn registration_status(&self) -> RegistrationStatus {
        self.status.clone()
    }
}
