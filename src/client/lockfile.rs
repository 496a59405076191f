//! Lockfile discovery for the local client
//!
//! While running, the client writes `name:pid:port:password:protocol` into a
//! lockfile in its install directory. The file disappears when it exits.

use crate::error::LinkError;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

/// Username the client expects for basic auth
pub const CLIENT_AUTH_USER: &str = "riot";

/// Connection details read from the lockfile
#[derive(Clone, PartialEq, Eq)]
pub struct LockfileInfo {
    pub process_name: String,
    pub pid: u32,
    pub port: u16,
    pub password: String,
    pub protocol: String,
}

impl LockfileInfo {
    /// Parse the lockfile contents
    pub fn parse(raw: &str) -> Result<Self, LinkError> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        if parts.len() != 5 {
            return Err(LinkError::LockfileError {
                message: format!("expected 5 fields, found {}", parts.len()),
            });
        }

        let pid = parts[1].parse().map_err(|_| LinkError::LockfileError {
            message: format!("invalid pid {:?}", parts[1]),
        })?;
        let port = parts[2].parse().map_err(|_| LinkError::LockfileError {
            message: format!("invalid port {:?}", parts[2]),
        })?;

        let protocol = parts[4].to_lowercase();
        if protocol != "https" && protocol != "http" {
            return Err(LinkError::LockfileError {
                message: format!("unsupported protocol {:?}", parts[4]),
            });
        }

        Ok(Self {
            process_name: parts[0].to_string(),
            pid,
            port,
            password: parts[3].to_string(),
            protocol,
        })
    }

    /// Read the lockfile, `Ok(None)` when the client is not running
    pub async fn read(path: &Path) -> Result<Option<Self>, LinkError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LinkError::LockfileError {
                message: format!("failed to read {}: {}", path.display(), e),
            }),
        }
    }

    /// Base URL of the client's local API
    pub fn base_url(&self) -> String {
        format!("{}://127.0.0.1:{}", self.protocol, self.port)
    }
}

impl fmt::Debug for LockfileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockfileInfo")
            .field("process_name", &self.process_name)
            .field("pid", &self.pid)
            .field("port", &self.port)
            .field("password", &"***")
            .field("protocol", &self.protocol)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lockfile() {
        let info = LockfileInfo::parse("LeagueClient:12345:54321:s3cr3t:https\n").unwrap();
        assert_eq!(info.process_name, "LeagueClient");
        assert_eq!(info.pid, 12345);
        assert_eq!(info.port, 54321);
        assert_eq!(info.password, "s3cr3t");
        assert_eq!(info.base_url(), "https://127.0.0.1:54321");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(LockfileInfo::parse("").is_err());
        assert!(LockfileInfo::parse("LeagueClient:1:notaport:pw:https").is_err());
        assert!(LockfileInfo::parse("LeagueClient:1:2:pw:ftp").is_err());
        assert!(LockfileInfo::parse("LeagueClient:1:2:pw").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let info = LockfileInfo::parse("LeagueClient:1:2:s3cr3t:https").unwrap();
        assert!(!format!("{:?}", info).contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_read_missing_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("lockfile");
        assert!(LockfileInfo::read(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_existing_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockfile");
        std::fs::write(&path, "LeagueClient:7:8080:pw:http").unwrap();

        let info = LockfileInfo::read(&path).await.unwrap().unwrap();
        assert_eq!(info.base_url(), "http://127.0.0.1:8080");
    }
}
