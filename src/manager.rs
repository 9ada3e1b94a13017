use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::cache::{
    CacheTable, CachedPayload, EntryId, EntryIdentity, MemoryPool, ProxyRegistry, hash_key,
};
use crate::config::PurgeConfig;
use crate::error::{PurgeError, Result};
use crate::observability::{PurgeStats, PurgeStatsSnapshot};
use crate::purge::{
    KeyPurgeOutcome, PurgeAttributes, PurgeCriteria, PurgeMode, PurgeSweep, RuleUpdate,
    apply_rule_update, build_purge_key, purge_by_key,
};
use crate::reply::PurgeReply;
use crate::sched::{AbortOnDrop, Clock, SchedulerHandle, SweepScheduler, SystemClock};

/// The parts of an inbound request the manager looks at.
#[derive(Clone, Debug, Default)]
pub struct ManagerRequest {
    pub method: String,
    /// Path and query as received.
    pub uri: Bytes,
    /// `Host` of the request, used to build the single-key purge key.
    pub host: Option<Bytes>,
    pub attrs: PurgeAttributes,
    pub state: Option<Bytes>,
    pub ttl: Option<Bytes>,
}

impl ManagerRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<Bytes>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<Bytes>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Records a header if it is one the manager understands; others are ignored.
    pub fn with_header(mut self, name: &str, value: impl Into<Bytes>) -> Self {
        let value = Some(value.into());
        match name.to_ascii_lowercase().as_str() {
            "name" => self.attrs.name = value,
            "x-host" => self.attrs.host = value,
            "path" => self.attrs.path = value,
            "regex" => self.attrs.regex = value,
            "state" => self.state = value,
            "ttl" => self.ttl = value,
            "host" => self.host = value,
            _ => {}
        }
        self
    }

    fn path(&self) -> &[u8] {
        let end = self
            .uri
            .iter()
            .position(|&b| b == b'?')
            .unwrap_or(self.uri.len());
        &self.uri[..end]
    }
}

/// Completion of a scheduled sweep.
#[derive(Debug)]
pub struct SweepHandle {
    mode: PurgeMode,
    rx: oneshot::Receiver<PurgeReply>,
}

impl SweepHandle {
    pub fn mode(&self) -> PurgeMode {
        self.mode
    }

    /// Resolves once the sweep has visited the whole table. A sweep dropped
    /// before finishing (runtime shutdown) reports a server error.
    pub async fn wait(self) -> PurgeReply {
        self.rx.await.unwrap_or(PurgeReply::ServerError)
    }
}

#[derive(Debug)]
pub enum ManagerOutcome {
    /// Not a purge or management request.
    Pass,
    Reply(PurgeReply),
    Scheduled(SweepHandle),
}

/// Entry point for purge and management requests against one cache table.
pub struct CacheManager {
    config: PurgeConfig,
    table: Arc<CacheTable>,
    registry: Arc<ProxyRegistry>,
    pool: Arc<MemoryPool>,
    scheduler: SchedulerHandle,
    clock: Arc<dyn Clock>,
    stats: Arc<PurgeStats>,
}

impl CacheManager {
    pub fn new(config: PurgeConfig, scheduler: SchedulerHandle) -> Self {
        Self::with_clock(config, scheduler, Arc::new(SystemClock))
    }

    pub fn with_clock(config: PurgeConfig, scheduler: SchedulerHandle, clock: Arc<dyn Clock>) -> Self {
        let table = Arc::new(CacheTable::new(config.bucket_count, config.shard_count));
        let registry = Arc::new(ProxyRegistry::from_config(&config.proxies));
        let pool = MemoryPool::new(config.memory_pool_bytes);
        Self {
            config,
            table,
            registry,
            pool,
            scheduler,
            clock,
            stats: Arc::new(PurgeStats::default()),
        }
    }

    /// Builds a manager and spawns its sweep driver on the current tokio runtime.
    pub fn start(config: PurgeConfig) -> (Self, AbortOnDrop) {
        let (scheduler, handle) = SweepScheduler::new(config.scheduler.max_pending_tasks);
        let driver = scheduler.spawn();
        (Self::new(config, handle), driver)
    }

    pub fn config(&self) -> &PurgeConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<CacheTable> {
        &self.table
    }

    pub fn registry(&self) -> &Arc<ProxyRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stats(&self) -> PurgeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn handle(&self, request: &ManagerRequest) -> ManagerOutcome {
        if !self.config.enabled {
            return ManagerOutcome::Pass;
        }

        let on_manager_uri = request.path() == self.config.manager_uri.as_bytes();
        if request.method == "POST" {
            if !on_manager_uri {
                return ManagerOutcome::Pass;
            }
            self.stats.record_request();
            return ManagerOutcome::Reply(self.update_rules(request));
        }

        if request.method != self.config.purge_method {
            return ManagerOutcome::Pass;
        }
        self.stats.record_request();

        if on_manager_uri {
            self.schedule_purge(&request.attrs)
        } else {
            ManagerOutcome::Reply(self.purge_key(request))
        }
    }

    /// Handles `request` and waits for any sweep it starts. `None` when the
    /// request is not one the manager answers.
    pub async fn handle_and_wait(&self, request: &ManagerRequest) -> Option<PurgeReply> {
        match self.handle(request) {
            ManagerOutcome::Pass => None,
            ManagerOutcome::Reply(reply) => Some(reply),
            ManagerOutcome::Scheduled(handle) => Some(handle.wait().await),
        }
    }

    /// Cache-write path: stores a response under `host + uri` for the rule
    /// named by the request's `name`. The rule's TTL sets the expiry; a
    /// disabled rule stores nothing.
    pub fn store(
        &self,
        request: &ManagerRequest,
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    ) -> Result<EntryId> {
        let result = self.store_inner(request, status, headers, body);
        match &result {
            Ok(_) => self.stats.record_store(),
            Err(err) => {
                self.stats.record_rejected();
                tracing::debug!(error = %err, "cache store rejected");
            }
        }
        result
    }

    fn store_inner(
        &self,
        request: &ManagerRequest,
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    ) -> Result<EntryId> {
        let Some(host) = request.host.clone().filter(|host| !host.is_empty()) else {
            return Err(PurgeError::bad_request("host is required"));
        };
        let Some(name) = request.attrs.name.as_deref() else {
            return Err(PurgeError::bad_request("name is required"));
        };
        let Some((proxy, rule)) = self.registry.find_rule_with_proxy(name) else {
            return Err(PurgeError::not_found(format!(
                "no rule named {:?}",
                String::from_utf8_lossy(name)
            )));
        };
        if !rule.is_enabled() {
            return Err(PurgeError::bad_request(format!("rule {} is disabled", rule.name)));
        }

        let ttl = rule.ttl_seconds();
        let expires_at = if ttl == 0 {
            0
        } else {
            self.clock.now_epoch_seconds().saturating_add(ttl)
        };
        let identity = EntryIdentity {
            key: build_purge_key(Some(&host[..]), &request.uri)?,
            proxy_uuid: proxy.uuid,
            rule_id: rule.id,
            path: Bytes::copy_from_slice(request.path()),
            host,
        };
        let payload = Arc::new(CachedPayload::new(status, headers, body));
        Ok(self.table.insert(identity, payload, expires_at))
    }

    fn schedule_purge(&self, attrs: &PurgeAttributes) -> ManagerOutcome {
        let criteria = match PurgeCriteria::classify(attrs, &self.registry, &self.pool) {
            Ok(criteria) => criteria,
            Err(err) => return ManagerOutcome::Reply(self.reject(err)),
        };
        let mode = criteria.mode();

        let mut sweep = PurgeSweep::new(
            self.table.clone(),
            criteria,
            self.config.sweep.clone(),
            self.clock.clone(),
        )
        .with_stats(self.stats.clone());
        let rx = sweep.reply_channel();

        // On failure the sweep, and the criteria buffers it owns, are dropped here.
        if let Err(err) = self.scheduler.register(Box::new(sweep)) {
            return ManagerOutcome::Reply(self.reject(err));
        }
        self.stats.record_sweep_scheduled();
        tracing::debug!(%mode, "purge sweep scheduled");
        ManagerOutcome::Scheduled(SweepHandle { mode, rx })
    }

    fn purge_key(&self, request: &ManagerRequest) -> PurgeReply {
        let key = match build_purge_key(request.host.as_deref(), &request.uri) {
            Ok(key) => key,
            Err(err) => return self.reject(err),
        };
        let outcome = purge_by_key(&self.table, &key, hash_key(&key));
        let found = outcome == KeyPurgeOutcome::FoundAndPurged;
        self.stats.record_key_purge(found);
        tracing::debug!(key = %String::from_utf8_lossy(&key), found, "single key purge");
        if found {
            PurgeReply::Ok
        } else {
            PurgeReply::NotFound
        }
    }

    fn update_rules(&self, request: &ManagerRequest) -> PurgeReply {
        let update = RuleUpdate::from_tokens(request.state.as_deref(), request.ttl.as_deref());
        match apply_rule_update(&self.registry, request.attrs.name.as_deref(), update) {
            Ok(updated) => {
                self.stats.record_rule_updates(updated as u64);
                tracing::info!(
                    updated,
                    enabled = ?update.enabled,
                    ttl_seconds = ?update.ttl_seconds,
                    "cache rules updated"
                );
                PurgeReply::Ok
            }
            Err(err) => self.reject(err),
        }
    }

    fn reject(&self, err: PurgeError) -> PurgeReply {
        self.stats.record_rejected();
        tracing::debug!(error = %err, "purge request rejected");
        err.reply()
    }
}
