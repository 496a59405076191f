//! Main application configuration
//!
//! This module defines the configuration structures for the league-link
//! agent, including environment variable loading, TOML files and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub client: ClientSettings,
    pub resolver: ResolverSettings,
    pub join: JoinSettings,
    pub registration: RegistrationSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Address the control server binds to
    pub control_host: String,
    /// Port for the local control endpoint
    pub control_port: u16,
    /// Passive status poll cadence in seconds
    pub status_poll_interval_seconds: u64,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Local game client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Client install directory holding the lockfile
    pub install_dir: Option<PathBuf>,
    /// Explicit lockfile path, wins over `install_dir`
    pub lockfile_path: Option<PathBuf>,
    /// Upper bound for one status poll in milliseconds
    pub probe_timeout_ms: u64,
    /// Upper bound for one client action in milliseconds
    pub action_timeout_ms: u64,
}

/// Remote matching service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Base URL of the matching service
    pub base_url: String,
    /// Timeout for a single request in milliseconds
    pub request_timeout_ms: u64,
    /// Backoff before each retry of an unreachable service
    pub retry_delays_ms: Vec<u64>,
    /// Lifetime given to descriptors from plain-text responses
    pub legacy_descriptor_ttl_seconds: u64,
}

/// Join driver retry budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinSettings {
    /// Retries of the join action while the client reports busy
    pub enter_retries: u32,
    pub enter_retry_delay_ms: u64,
    /// Total observations made while verifying
    pub verify_attempts: u32,
    pub verify_retry_delay_ms: u64,
}

/// Registration lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSettings {
    /// Settings file holding the registered account id
    pub settings_path: Option<PathBuf>,
    /// Confirm the stored account with the matching service
    pub verify_with_service: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "league-link".to_string(),
            log_level: "info".to_string(),
            control_host: "127.0.0.1".to_string(),
            control_port: 47291,
            status_poll_interval_seconds: 3,
            shutdown_timeout_seconds: 5,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            install_dir: None,
            lockfile_path: None,
            probe_timeout_ms: 1500,
            action_timeout_ms: 5000,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            base_url: "https://rust.gameras.gr".to_string(),
            request_timeout_ms: 10000,
            retry_delays_ms: vec![500, 1500],
            legacy_descriptor_ttl_seconds: 120,
        }
    }
}

impl Default for JoinSettings {
    fn default() -> Self {
        Self {
            enter_retries: 3,
            enter_retry_delay_ms: 500,
            verify_attempts: 2,
            verify_retry_delay_ms: 1000,
        }
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            settings_path: None,
            verify_with_service: true,
        }
    }
}

impl ClientSettings {
    /// Where the client's lockfile is expected
    pub fn lockfile_location(&self) -> PathBuf {
        if let Some(path) = &self.lockfile_path {
            return path.clone();
        }
        self.install_dir
            .clone()
            .unwrap_or_else(default_install_dir)
            .join("lockfile")
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

impl ResolverSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn legacy_descriptor_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.legacy_descriptor_ttl_seconds as i64)
    }
}

impl JoinSettings {
    pub fn enter_retry_delay(&self) -> Duration {
        Duration::from_millis(self.enter_retry_delay_ms)
    }

    pub fn verify_retry_delay(&self) -> Duration {
        Duration::from_millis(self.verify_retry_delay_ms)
    }
}

impl RegistrationSettings {
    /// Settings file location, falling back to the per-user data directory
    pub fn settings_location(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(default_settings_path)
    }
}

fn default_install_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/League of Legends.app/Contents/LoL")
    } else {
        PathBuf::from(r"C:\Riot Games\League of Legends")
    }
}

fn default_settings_path() -> PathBuf {
    let base = env::var_os("LOCALAPPDATA")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("LeagueOfLeagues").join("settings.toml")
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("CONTROL_PORT") {
            self.service.control_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid CONTROL_PORT value: {}", port))?;
        }
        if let Ok(interval) = env::var("STATUS_POLL_INTERVAL_SECONDS") {
            self.service.status_poll_interval_seconds = interval.parse().map_err(|_| {
                anyhow!("Invalid STATUS_POLL_INTERVAL_SECONDS value: {}", interval)
            })?;
        }

        // Client settings
        if let Ok(dir) = env::var("LEAGUE_INSTALL_DIR") {
            self.client.install_dir = Some(PathBuf::from(dir));
        }
        if let Ok(lockfile) = env::var("LEAGUE_LOCKFILE") {
            self.client.lockfile_path = Some(PathBuf::from(lockfile));
        }
        if let Ok(timeout) = env::var("PROBE_TIMEOUT_MS") {
            self.client.probe_timeout_ms = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid PROBE_TIMEOUT_MS value: {}", timeout))?;
        }
        if let Ok(timeout) = env::var("ACTION_TIMEOUT_MS") {
            self.client.action_timeout_ms = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid ACTION_TIMEOUT_MS value: {}", timeout))?;
        }

        // Resolver settings
        if let Ok(url) = env::var("MATCH_SERVICE_URL") {
            self.resolver.base_url = url;
        }
        if let Ok(timeout) = env::var("RESOLVER_TIMEOUT_MS") {
            self.resolver.request_timeout_ms = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid RESOLVER_TIMEOUT_MS value: {}", timeout))?;
        }
        if let Ok(delays) = env::var("RESOLVER_RETRY_DELAYS_MS") {
            self.resolver.retry_delays_ms = delays
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| part.trim().parse::<u64>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| anyhow!("Invalid RESOLVER_RETRY_DELAYS_MS value: {}", delays))?;
        }

        // Registration settings
        if let Ok(path) = env::var("SETTINGS_PATH") {
            self.registration.settings_path = Some(PathBuf::from(path));
        }
        if let Ok(verify) = env::var("VERIFY_REGISTRATION") {
            self.registration.verify_with_service = verify
                .parse()
                .map_err(|_| anyhow!("Invalid VERIFY_REGISTRATION value: {}", verify))?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get passive status poll interval as Duration
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.service.status_poll_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.control_port == 0 {
        return Err(anyhow!("Control port cannot be 0"));
    }
    if config.service.status_poll_interval_seconds == 0 {
        return Err(anyhow!("Status poll interval must be greater than 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Every network call needs a finite bound
    if config.client.probe_timeout_ms == 0 {
        return Err(anyhow!("Probe timeout must be greater than 0"));
    }
    if config.client.action_timeout_ms == 0 {
        return Err(anyhow!("Client action timeout must be greater than 0"));
    }
    if config.resolver.request_timeout_ms == 0 {
        return Err(anyhow!("Resolver timeout must be greater than 0"));
    }

    validate_service_url(&config.resolver.base_url)?;
    if config.resolver.retry_delays_ms.len() > 2 {
        return Err(anyhow!("Resolver allows at most 2 retries"));
    }

    if config.join.verify_attempts == 0 {
        return Err(anyhow!("Verification needs at least one attempt"));
    }

    Ok(())
}

/// The matching service carries account identity, so it must be encrypted
/// unless it lives on this machine.
fn validate_service_url(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(anyhow!("Matching service URL cannot be empty"));
    }
    let url = reqwest::Url::parse(raw)
        .map_err(|e| anyhow!("Invalid matching service URL {}: {}", raw, e))?;

    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback_host(url.host_str()) => Ok(()),
        scheme => Err(anyhow!(
            "Matching service URL must use https (got {})",
            scheme
        )),
    }
}

fn is_loopback_host(host: Option<&str>) -> bool {
    match host {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}
