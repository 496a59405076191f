//! League Link - join password-protected custom lobbies from a password
//!
//! This crate tracks the locally running game client, resolves lobby
//! passwords through the remote matching service and drives the client into
//! the resolved lobby, reporting a single outcome per join.

pub mod client;
pub mod config;
pub mod error;
pub mod join;
pub mod metrics;
pub mod orchestrator;
pub mod registration;
pub mod resolver;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{JoinErrorKind, Result};
pub use types::*;

// Re-export key components
pub use client::{ClientProbe, LocalClientApi};
pub use join::{JoinDriver, JoinState};
pub use orchestrator::JoinOrchestrator;
pub use registration::RegistrationSource;
pub use resolver::{MatchResolver, ResolveOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
