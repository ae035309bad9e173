//! Configuration for a Cask node.
//!
//! Loaded from a TOML file via [`Config::from_file`] and then overlaid with
//! `CASK_*` environment variables via [`Config::from_env`], mirroring the
//! original project's `envconfig`-driven `cask.go` startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub aae: AaeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            storage: StorageConfig::default(),
            cluster: ClusterConfig::default(),
            aae: AaeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay `CASK_*` environment variables onto `self`, in place.
    pub fn merge_env(&mut self) {
        if let Ok(uuid) = std::env::var("CASK_UUID") {
            self.node.uuid = uuid;
        }
        if let Ok(url) = std::env::var("CASK_BASE_URL") {
            self.node.base_url = url;
        }
        if let Ok(w) = std::env::var("CASK_WRITEABLE") {
            self.node.writeable = w.eq_ignore_ascii_case("true");
        }
        if let Ok(port) = std::env::var("CASK_PORT") {
            if let Ok(p) = port.parse() {
                self.node.port = p;
            }
        }
        if let Ok(root) = std::env::var("CASK_DISK_BACKEND_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Ok(neighbors) = std::env::var("CASK_NEIGHBORS") {
            self.cluster.neighbors = neighbors
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(secret) = std::env::var("CASK_CLUSTER_SECRET") {
            self.cluster.secret = secret;
        }
        if let Ok(r) = std::env::var("CASK_REPLICATION") {
            if let Ok(r) = r.parse() {
                self.cluster.replication = r;
            }
        }
        if let Ok(m) = std::env::var("CASK_MAX_REPLICATION") {
            if let Ok(m) = m.parse() {
                self.cluster.max_replication = m;
            }
        }
        if let Ok(h) = std::env::var("CASK_HEARTBEAT_INTERVAL") {
            if let Ok(h) = h.parse() {
                self.cluster.heartbeat_interval_secs = h;
            }
        }
        if let Ok(a) = std::env::var("CASK_AAE_INTERVAL") {
            if let Ok(a) = a.parse() {
                self.aae.interval_secs = a;
            }
        }
        if let Ok(level) = std::env::var("CASK_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.merge_env();
        config
    }

    /// Clamp out-of-range values: replication floor of 1, max_replication
    /// never below replication, a non-positive AAE interval falls back to
    /// 5 seconds.
    pub fn clamp(&mut self) {
        if self.cluster.replication < 1 {
            self.cluster.replication = 1;
        }
        if self.cluster.max_replication < self.cluster.replication {
            self.cluster.max_replication = self.cluster.replication;
        }
        if self.aae.interval_secs < 1 {
            self.aae.interval_secs = 5;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub uuid: String,
    pub base_url: String,
    pub writeable: bool,
    pub bind_address: String,
    pub port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            base_url: "http://localhost:8080".to_string(),
            writeable: true,
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind to construct, e.g. `"disk"`. Only `disk` is implemented;
    /// the field exists so the selection mechanism itself (config key ->
    /// constructor) has a real caller for future backend kinds.
    #[serde(default = "default_backend_kind")]
    pub backend: String,
    pub root: PathBuf,
}

fn default_backend_kind() -> String {
    "disk".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend_kind(),
            root: PathBuf::from("/var/lib/cask"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Seed neighbor base URLs, bootstrapped once at startup.
    pub neighbors: Vec<String>,
    pub secret: String,
    pub replication: usize,
    pub max_replication: usize,
    pub heartbeat_interval_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            neighbors: Vec::new(),
            secret: String::new(),
            replication: 2,
            max_replication: 3,
            heartbeat_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AaeConfig {
    pub interval_secs: u64,
}

impl Default for AaeConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_enforces_replication_floor() {
        let mut c = Config::default();
        c.cluster.replication = 0;
        c.clamp();
        assert_eq!(c.cluster.replication, 1);
    }

    #[test]
    fn clamp_raises_max_replication_to_replication() {
        let mut c = Config::default();
        c.cluster.replication = 5;
        c.cluster.max_replication = 2;
        c.clamp();
        assert_eq!(c.cluster.max_replication, 5);
    }

    #[test]
    fn clamp_defaults_non_positive_aae_interval() {
        let mut c = Config::default();
        c.aae.interval_secs = 0;
        c.clamp();
        assert_eq!(c.aae.interval_secs, 5);
    }

    #[test]
    fn from_file_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cask.toml");
        std::fs::write(
            &path,
            r#"
            [node]
            uuid = "11111111-1111-1111-1111-111111111111"
            base_url = "http://node1:8080"
            writeable = true
            bind_address = "0.0.0.0"
            port = 8080

            [cluster]
            neighbors = ["http://node2:8080"]
            secret = "s3cr3t"
            replication = 2
            max_replication = 3
            heartbeat_interval_secs = 10
            "#,
        )
        .unwrap();

        let cfg = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.node.base_url, "http://node1:8080");
        assert_eq!(cfg.cluster.neighbors, vec!["http://node2:8080"]);
    }
}
