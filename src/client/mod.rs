//! Local game client integration
//!
//! This module covers everything that talks to the game client running on
//! this machine: lockfile discovery, the HTTP adapter for its local API, and
//! the read-only probe that turns its status into `ClientSession` snapshots.

pub mod api;
pub mod lcu;
pub mod lockfile;
pub mod probe;

// Re-export commonly used types
pub use api::LocalClientApi;
pub use lcu::LcuHttpClient;
pub use lockfile::LockfileInfo;
pub use probe::{ClientProbe, ProbeDecodeError, ProbeOutcome};
