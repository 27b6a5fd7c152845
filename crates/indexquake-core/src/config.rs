use crate::fuzzer::{ChaosCommand, CommandTable};
use indexquake_schema::{IndexName, Namespace};
use indexquake_store::{select_connector, Connector, PoolConfig, RedisConnector, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub index: IndexSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub chaos: ChaosSection,
    #[serde(default)]
    pub swarm: SwarmSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub url: String,
    pub pool_size: usize,
    /// Unset waits for a free connection indefinitely.
    pub acquire_timeout_ms: Option<u64>,
    pub connect_timeout_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_owned(),
            pool_size: 10,
            acquire_timeout_ms: None,
            connect_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSection {
    pub name: String,
    pub namespace: String,
    /// Defaults to `{name}_alias`.
    pub alias: Option<String>,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            name: "idx:books".to_owned(),
            namespace: "indexquake:books".to_owned(),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub documents: u64,
    pub id_range: u64,
    pub flush: bool,
    pub verify: bool,
    pub status_interval_ms: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            documents: 3000,
            id_range: 3000,
            flush: false,
            verify: true,
            status_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ChaosSection {
    pub enabled: bool,
    pub id_range: u64,
    pub expire_ttl_ms: u64,
    pub seed: Option<u64>,
    /// Command name to relative weight. Unlisted commands weigh 1.
    pub weights: BTreeMap<String, u32>,
}

impl Default for ChaosSection {
    fn default() -> Self {
        Self {
            enabled: false,
            id_range: 100,
            expire_ttl_ms: 2,
            seed: None,
            weights: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SwarmSection {
    pub workers: usize,
    pub connections: usize,
    pub duration_secs: u64,
}

impl Default for SwarmSection {
    fn default() -> Self {
        Self {
            workers: 50,
            connections: 500,
            duration_secs: 60,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_owned()));
        if self.store.url.trim().is_empty() {
            return invalid("store.url must not be empty");
        }
        if self.store.pool_size == 0 {
            return invalid("store.pool_size must be at least 1");
        }
        if self.index.name.trim().is_empty() {
            return invalid("index.name must not be empty");
        }
        if self.index.namespace.trim().is_empty() {
            return invalid("index.namespace must not be empty");
        }
        if self.run.id_range == 0 {
            return invalid("run.id_range must be at least 1");
        }
        if self.run.status_interval_ms == 0 {
            return invalid("run.status_interval_ms must be at least 1");
        }
        if self.chaos.id_range == 0 {
            return invalid("chaos.id_range must be at least 1");
        }
        for name in self.chaos.weights.keys() {
            name.parse::<ChaosCommand>()
                .map_err(|_| ConfigError::Invalid(format!("unknown chaos command '{name}'")))?;
        }
        if self.chaos.enabled {
            CommandTable::main(&self.chaos.weights)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.swarm.workers == 0 {
            return invalid("swarm.workers must be at least 1");
        }
        if self.swarm.connections == 0 {
            return invalid("swarm.connections must be at least 1");
        }
        if self.swarm.duration_secs == 0 {
            return invalid("swarm.duration_secs must be at least 1");
        }
        Ok(())
    }

    pub fn index_name(&self) -> IndexName {
        IndexName::new(self.index.name.clone())
    }

    pub fn alias_name(&self) -> IndexName {
        match &self.index.alias {
            Some(alias) => IndexName::new(alias.clone()),
            None => self.index_name().alias(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.index.namespace.clone())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.store.pool_size,
            acquire_timeout: self.store.acquire_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn swarm_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.swarm.connections,
            acquire_timeout: self.store.acquire_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.run.status_interval_ms)
    }

    /// Connector for `store.url`, applying the connect timeout to Redis URLs.
    pub fn connector(&self) -> Result<Box<dyn Connector>, StoreError> {
        let scheme = self.store.url.split("://").next().unwrap_or_default();
        if matches!(scheme, "redis" | "rediss" | "redis+unix" | "unix") {
            let connector = RedisConnector::open(&self.store.url)?
                .with_connect_timeout(Duration::from_millis(self.store.connect_timeout_ms));
            return Ok(Box::new(connector));
        }
        select_connector(&self.store.url)
    }
}

pub fn parse_config_str(input: &str) -> Result<RunConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<RunConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.store.pool_size, 10);
        assert_eq!(config.run.documents, 3000);
        assert_eq!(config.run.id_range, 3000);
        assert_eq!(config.chaos.id_range, 100);
        assert_eq!(config.swarm.workers, 50);
        assert_eq!(config.swarm.connections, 500);
        assert_eq!(config.swarm.duration_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_full_config() {
        let input = r#"
[store]
url = "memory://"
pool_size = 4
acquire_timeout_ms = 250

[index]
name = "idx:test"
namespace = "test:books"

[run]
documents = 100
id_range = 50
flush = true

[chaos]
enabled = true
seed = 7

[chaos.weights]
alter_random_field = 0
delete_random = 5

[swarm]
workers = 3
connections = 6
duration_secs = 2
"#;
        let config = parse_config_str(input).unwrap();
        config.validate().unwrap();
        assert_eq!(config.store.url, "memory://");
        assert_eq!(config.pool_config().max_size, 4);
        assert_eq!(
            config.pool_config().acquire_timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.index_name().as_str(), "idx:test");
        assert_eq!(config.alias_name().as_str(), "idx:test_alias");
        assert_eq!(config.namespace().index_prefix(), "test:books:");
        assert!(config.run.flush);
        assert_eq!(config.chaos.seed, Some(7));
        assert_eq!(config.chaos.weights["delete_random"], 5);
        assert_eq!(config.swarm_pool_config().max_size, 6);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(
            parse_config_str("[run]\ndocs = 5\n"),
            Err(ConfigError::ParseToml(_))
        ));
    }

    #[test]
    fn validation_errors() {
        let mut config = RunConfig::default();
        config.store.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.run.id_range = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.chaos.weights.insert("drop_index".to_owned(), 1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("drop_index"));
    }

    #[test]
    fn all_zero_weights_rejected_when_enabled() {
        let mut config = RunConfig::default();
        config.chaos.enabled = true;
        for command in ChaosCommand::MAIN {
            config.chaos.weights.insert(command.name().to_owned(), 0);
        }
        assert!(config.validate().is_err());
        config.chaos.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_alias_wins() {
        let mut config = RunConfig::default();
        config.index.alias = Some("books".to_owned());
        assert_eq!(config.alias_name().as_str(), "books");
    }

    #[test]
    fn parse_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexquake.toml");
        std::fs::write(&path, "[store]\nurl = \"memory://\"\n").unwrap();
        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.store.url, "memory://");
        assert!(config.connector().is_ok());
        assert!(matches!(
            parse_config_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
