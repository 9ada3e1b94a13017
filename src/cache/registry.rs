use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::{ProxyConfig, RuleConfig};

/// A named cache rule. State and TTL are adjustable at runtime through the
/// management entry point while the registry is shared.
#[derive(Debug)]
pub struct CacheRule {
    pub name: String,
    pub id: u32,
    enabled: AtomicBool,
    ttl_seconds: AtomicU64,
}

impl CacheRule {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id,
            enabled: AtomicBool::new(true),
            ttl_seconds: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds.load(Ordering::Relaxed)
    }

    pub fn set_ttl_seconds(&self, ttl: u64) {
        self.ttl_seconds.store(ttl, Ordering::Relaxed);
    }
}

impl From<&RuleConfig> for CacheRule {
    fn from(config: &RuleConfig) -> Self {
        let rule = CacheRule::new(config.name.clone(), config.id);
        rule.set_enabled(config.enabled);
        rule.set_ttl_seconds(config.ttl_seconds);
        rule
    }
}

#[derive(Debug)]
pub struct Proxy {
    pub id: String,
    pub uuid: u32,
    pub rules: Vec<CacheRule>,
}

impl Proxy {
    pub fn new(id: impl Into<String>, uuid: u32) -> Self {
        Self {
            id: id.into(),
            uuid,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: CacheRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Proxies in declaration order, each with its rules in declaration order.
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    proxies: Vec<Proxy>,
}

impl ProxyRegistry {
    pub fn new(proxies: Vec<Proxy>) -> Self {
        Self { proxies }
    }

    pub fn from_config(proxies: &[ProxyConfig]) -> Self {
        Self::new(
            proxies
                .iter()
                .map(|proxy| Proxy {
                    id: proxy.id.clone(),
                    uuid: proxy.uuid,
                    rules: proxy.rules.iter().map(CacheRule::from).collect(),
                })
                .collect(),
        )
    }

    pub fn proxies(&self) -> &[Proxy] {
        &self.proxies
    }

    /// First proxy whose identifier equals `name`.
    pub fn find_proxy(&self, name: &[u8]) -> Option<&Proxy> {
        self.proxies.iter().find(|proxy| proxy.id.as_bytes() == name)
    }

    /// First rule named `name`, searching proxies in order.
    pub fn find_rule(&self, name: &[u8]) -> Option<&CacheRule> {
        self.find_rule_with_proxy(name).map(|(_, rule)| rule)
    }

    /// Like [`find_rule`](Self::find_rule), also returning the owning proxy.
    pub fn find_rule_with_proxy(&self, name: &[u8]) -> Option<(&Proxy, &CacheRule)> {
        self.proxies.iter().find_map(|proxy| {
            proxy
                .rules
                .iter()
                .find(|rule| rule.name.as_bytes() == name)
                .map(|rule| (proxy, rule))
        })
    }

    pub fn rules(&self) -> impl Iterator<Item = &CacheRule> {
        self.proxies.iter().flat_map(|proxy| proxy.rules.iter())
    }
}
