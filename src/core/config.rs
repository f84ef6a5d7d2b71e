//! Configuration parsing and validation.
//!
//! Keel configuration is loaded from a TOML file with CLI overrides. The
//! knobs cover the node's external surfaces only: addresses, directories,
//! and the replication log's durability/consistency levels. None of them
//! change command semantics.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the Redis listener binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Address of a cluster member to join, if any. A single-node deployment
    /// leaves this unset.
    #[serde(default)]
    pub join: Option<String>,

    /// Directory holding the embedded store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding the replication log.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Replication log durability level.
    #[serde(default)]
    pub durability: Durability,

    /// Read consistency level enforced by the replication adapter.
    #[serde(default)]
    pub consistency: Consistency,

    /// Replication log backend.
    #[serde(default)]
    pub log_backend: LogBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            join: None,
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
            durability: Durability::default(),
            consistency: Consistency::default(),
            log_backend: LogBackend::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values that serde cannot check.
    pub fn validate(&self) -> Result<()> {
        self.bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("invalid bind address '{}'", self.bind))?;
        if let Some(join) = &self.join {
            join.parse::<std::net::SocketAddr>()
                .with_context(|| format!("invalid join address '{}'", join))?;
        }
        Ok(())
    }
}

fn default_bind() -> String {
    "127.0.0.1:4920".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/node")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("data/log")
}

/// Durability level for the replication log.
///
/// The embedded store always runs with relaxed durability; the log is the
/// durability authority. Dropping the log from a deployment would require
/// flipping the store's sync policy as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Durability {
    /// No fsync; the OS decides when entries reach disk.
    Relaxed,
    /// Entries are fsynced in the background, batched.
    #[default]
    Background,
    /// Every entry is fsynced before the write is acknowledged.
    Strict,
}

/// Read consistency level enforced by the replication adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Consistency {
    /// Reads may be served from any replica without coordination.
    Stale,
    /// Reads are served by the leader under its lease.
    #[default]
    LeaderLease,
    /// Reads are linearized against the log.
    Linearizable,
}

/// Replication log backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogBackend {
    /// Segmented append-only files under `log_dir`.
    #[default]
    File,
    /// In-memory log; entries do not survive a restart. Intended for tests
    /// and throwaway nodes.
    Memory,
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relaxed => write!(f, "relaxed"),
            Self::Background => write!(f, "background"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale => write!(f, "stale"),
            Self::LeaderLease => write!(f, "leader-lease"),
            Self::Linearizable => write!(f, "linearizable"),
        }
    }
}

impl fmt::Display for LogBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for Durability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relaxed" => Ok(Self::Relaxed),
            "background" => Ok(Self::Background),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown durability level '{}'", other)),
        }
    }
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stale" => Ok(Self::Stale),
            "leader-lease" => Ok(Self::LeaderLease),
            "linearizable" => Ok(Self::Linearizable),
            other => Err(format!("unknown consistency level '{}'", other)),
        }
    }
}

impl FromStr for LogBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown log backend '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.durability, Durability::Background);
        assert_eq!(config.consistency, Consistency::LeaderLease);
        assert_eq!(config.log_backend, LogBackend::File);
    }

    #[test]
    fn parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.bind, "127.0.0.1:4920");
        assert!(config.join.is_none());
    }

    #[test]
    fn parse_full_toml() {
        let raw = r#"
bind = "0.0.0.0:6379"
join = "10.0.0.2:4920"
data_dir = "/var/lib/keel/node"
log_dir = "/var/lib/keel/log"
durability = "strict"
consistency = "linearizable"
log_backend = "memory"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.bind, "0.0.0.0:6379");
        assert_eq!(config.join.as_deref(), Some("10.0.0.2:4920"));
        assert_eq!(config.durability, Durability::Strict);
        assert_eq!(config.consistency, Consistency::Linearizable);
        assert_eq!(config.log_backend, LogBackend::Memory);
    }

    #[test]
    fn invalid_bind_rejected() {
        let config = Config {
            bind: "not-an-address".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn level_round_trips_through_str() {
        for level in ["relaxed", "background", "strict"] {
            assert_eq!(level.parse::<Durability>().unwrap().to_string(), level);
        }
        for level in ["stale", "leader-lease", "linearizable"] {
            assert_eq!(level.parse::<Consistency>().unwrap().to_string(), level);
        }
    }
}
