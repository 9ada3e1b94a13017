use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::purge::SweepBudget;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PurgeConfig {
    /// Global cache status; when off the manager handles nothing.
    pub enabled: bool,
    /// Custom request method that marks a purge. Compared case-sensitively.
    pub purge_method: String,
    /// URI of the management entry points. A purge on any other URI
    /// targets the single key cached for that URI.
    pub manager_uri: String,
    pub bucket_count: usize,
    pub shard_count: usize,
    /// Budget for host/path copies owned by in-flight purges.
    pub memory_pool_bytes: usize,
    /// Largest body the server accepts on its cache-write route.
    pub max_store_bytes: usize,
    pub sweep: SweepBudget,
    pub scheduler: SchedulerConfig,
    pub proxies: Vec<ProxyConfig>,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            purge_method: "PURGE".to_string(),
            manager_uri: "/cache/manager".to_string(),
            bucket_count: 4096,
            shard_count: 16,
            memory_pool_bytes: 1024 * 1024,
            max_store_bytes: 1024 * 1024,
            sweep: SweepBudget::default(),
            scheduler: SchedulerConfig::default(),
            proxies: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_pending_tasks: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_pending_tasks: 64,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyConfig {
    pub id: String,
    pub uuid: u32,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    pub name: String,
    pub id: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub ttl_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse config failed: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("parse config failed: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl PurgeConfig {
    /// Loads JSON, or TOML when the file extension is `.toml`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config: Self = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&raw)?
        } else {
            serde_json::from_str(&raw)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.purge_method.trim().is_empty() {
            return Err(ConfigError::Invalid("purge_method must not be empty".into()));
        }
        if !self.manager_uri.starts_with('/') {
            return Err(ConfigError::Invalid("manager_uri must start with '/'".into()));
        }
        if self.bucket_count == 0 || self.shard_count == 0 {
            return Err(ConfigError::Invalid(
                "bucket_count and shard_count must be positive".into(),
            ));
        }
        if self.shard_count > self.bucket_count {
            return Err(ConfigError::Invalid(
                "shard_count must not exceed bucket_count".into(),
            ));
        }
        if self.sweep.max_buckets_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "sweep.max_buckets_per_tick must be positive".into(),
            ));
        }
        if self.max_store_bytes == 0 {
            return Err(ConfigError::Invalid("max_store_bytes must be positive".into()));
        }
        if self.scheduler.max_pending_tasks == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_pending_tasks must be positive".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for proxy in &self.proxies {
            if !seen.insert(proxy.uuid) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate proxy uuid {}",
                    proxy.uuid
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PurgeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sweep.max_buckets_per_tick, 1000);
        assert_eq!(config.purge_method, "PURGE");
    }

    #[test]
    fn loads_toml_with_partial_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
purge_method = "BAN"
bucket_count = 64
shard_count = 4

[sweep]
max_buckets_per_tick = 10

[[proxies]]
id = "web"
uuid = 1

[[proxies.rules]]
name = "static"
id = 7
ttl_seconds = 60
"#
        )
        .unwrap();

        let config = PurgeConfig::load(file.path()).unwrap();
        assert_eq!(config.purge_method, "BAN");
        assert_eq!(config.sweep.max_buckets_per_tick, 10);
        assert_eq!(config.sweep.tick_slice_micros, 1000);
        assert_eq!(config.proxies[0].rules[0].id, 7);
        assert!(config.proxies[0].rules[0].enabled);
    }

    #[test]
    fn loads_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"manager_uri": "/purge", "proxies": [{{"id": "a", "uuid": 2}}]}}"#)
            .unwrap();
        let config = PurgeConfig::load(file.path()).unwrap();
        assert_eq!(config.manager_uri, "/purge");
        assert!(config.proxies[0].rules.is_empty());
    }

    #[test]
    fn rejects_bad_geometry_and_duplicate_proxies() {
        let mut config = PurgeConfig {
            shard_count: 8,
            bucket_count: 4,
            ..PurgeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.shard_count = 2;
        config.proxies = vec![
            ProxyConfig {
                id: "a".into(),
                uuid: 1,
                rules: Vec::new(),
            },
            ProxyConfig {
                id: "b".into(),
                uuid: 1,
                rules: Vec::new(),
            },
        ];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
