use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use regex::bytes::Regex;

use crate::cache::{CacheEntry, MemoryPool, PoolBuffer, ProxyRegistry};
use crate::error::{PurgeError, Result};

/// Name token that selects every entry.
pub const WILDCARD_NAME: &[u8] = b"*";

/// Purge-identifying attributes of an inbound request.
#[derive(Clone, Debug, Default)]
pub struct PurgeAttributes {
    pub name: Option<Bytes>,
    pub host: Option<Bytes>,
    pub path: Option<Bytes>,
    pub regex: Option<Bytes>,
}

impl PurgeAttributes {
    pub fn name(name: impl Into<Bytes>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<Bytes>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<Bytes>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_regex(mut self, regex: impl Into<Bytes>) -> Self {
        self.regex = Some(regex.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PurgeMode {
    All,
    ByProxy,
    ByRule,
    ByPath,
    ByHost,
    ByPathAndHost,
    ByRegex,
    ByRegexAndHost,
}

impl PurgeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::ByProxy => "proxy",
            Self::ByRule => "rule",
            Self::ByPath => "path",
            Self::ByHost => "host",
            Self::ByPathAndHost => "path_host",
            Self::ByRegex => "regex",
            Self::ByRegexAndHost => "regex_host",
        }
    }
}

impl fmt::Display for PurgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a purge request invalidates. Host and path bytes live in pool
/// buffers owned by the criteria and are released when it is dropped.
#[derive(Debug)]
pub enum PurgeCriteria {
    All,
    Proxy { uuid: u32 },
    Rule { id: u32 },
    Path { path: PoolBuffer },
    Host { host: PoolBuffer },
    PathAndHost { path: PoolBuffer, host: PoolBuffer },
    Regex { regex: Regex },
    RegexAndHost { regex: Regex, host: PoolBuffer },
}

impl PurgeCriteria {
    /// Resolves request attributes into exactly one purge mode.
    ///
    /// Precedence: wildcard name, proxy name, rule name, unknown name
    /// (NOT_FOUND), path, regex, host alone, nothing usable (BAD_REQUEST).
    pub fn classify(
        attrs: &PurgeAttributes,
        registry: &ProxyRegistry,
        pool: &Arc<MemoryPool>,
    ) -> Result<Self> {
        if let Some(name) = attrs.name.as_deref() {
            if name == WILDCARD_NAME {
                return Ok(Self::All);
            }
            if let Some(proxy) = registry.find_proxy(name) {
                return Ok(Self::Proxy { uuid: proxy.uuid });
            }
            if let Some(rule) = registry.find_rule(name) {
                return Ok(Self::Rule { id: rule.id });
            }
            return Err(PurgeError::not_found(format!(
                "no proxy or rule named {:?}",
                String::from_utf8_lossy(name)
            )));
        }

        let host = attrs.host.as_deref();

        if let Some(path) = attrs.path.as_deref() {
            let path = pool.alloc_copy(path)?;
            return match host {
                Some(host) => Ok(Self::PathAndHost {
                    path,
                    host: pool.alloc_copy(host)?,
                }),
                None => Ok(Self::Path { path }),
            };
        }

        if let Some(pattern) = attrs.regex.as_deref() {
            let regex = compile_regex(pattern)?;
            return match host {
                Some(host) => Ok(Self::RegexAndHost {
                    regex,
                    host: pool.alloc_copy(host)?,
                }),
                None => Ok(Self::Regex { regex }),
            };
        }

        if let Some(host) = host {
            return Ok(Self::Host {
                host: pool.alloc_copy(host)?,
            });
        }

        Err(PurgeError::bad_request(
            "purge needs one of name, path, regex or x-host",
        ))
    }

    pub fn mode(&self) -> PurgeMode {
        match self {
            Self::All => PurgeMode::All,
            Self::Proxy { .. } => PurgeMode::ByProxy,
            Self::Rule { .. } => PurgeMode::ByRule,
            Self::Path { .. } => PurgeMode::ByPath,
            Self::Host { .. } => PurgeMode::ByHost,
            Self::PathAndHost { .. } => PurgeMode::ByPathAndHost,
            Self::Regex { .. } => PurgeMode::ByRegex,
            Self::RegexAndHost { .. } => PurgeMode::ByRegexAndHost,
        }
    }

    /// Whether `entry` falls under this purge. Reads identity fields only;
    /// callers evaluate VALID entries under the entry's shard lock.
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        match self {
            Self::All => true,
            Self::Proxy { uuid } => entry.proxy_uuid() == *uuid,
            Self::Rule { id } => entry.rule_id() == *id,
            Self::Path { path } => entry.path() == &path[..],
            Self::Host { host } => entry.host() == &host[..],
            Self::PathAndHost { path, host } => {
                entry.path() == &path[..] && entry.host() == &host[..]
            }
            Self::Regex { regex } => regex.is_match(entry.path()),
            Self::RegexAndHost { regex, host } => {
                entry.host() == &host[..] && regex.is_match(entry.path())
            }
        }
    }
}

fn compile_regex(pattern: &[u8]) -> Result<Regex> {
    let pattern = std::str::from_utf8(pattern)
        .map_err(|_| PurgeError::bad_request("regex is not valid utf-8"))?;
    Regex::new(pattern).map_err(|err| PurgeError::bad_request(format!("invalid regex: {err}")))
}
