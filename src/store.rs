//! Settings/log gateway contract and caching.
//!
//! The durable store for thresholds, toggles, agent lists, and the audit
//! trail lives outside this core; it is consumed through the narrow
//! [`SettingsStore`] trait. Every call is fallible and the gateway
//! degrades to configured defaults rather than propagating store errors
//! into the request path.

use crate::config::GatewayConfig;
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::warn;

/// Recognized dynamic-settings keys. Each string key appears exactly once.
pub mod keys {
    pub const HONEYPOT_ENABLED: &str = "honeypot_enabled";
    pub const RATE_LIMIT_WINDOW_MS: &str = "rate_limit_window_ms";
    pub const RATE_LIMIT_MAX: &str = "rate_limit_max";
    pub const DECOY_SERVER_HEADER: &str = "decoy_server_header";
}

/// Which agent list to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentListKind {
    /// Deny list; substring patterns
    Bad,
    /// Allow list; exact-match patterns
    Good,
}

/// One audit-trail row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub visitor_id: String,
    pub user_agent: String,
    pub ip: String,
    pub path: String,
    pub referrer: Option<String>,
    pub blocked: bool,
    /// True only when the request consumed rate budget. Static assets,
    /// excluded paths, allow-listed agents, and blocked requests are
    /// logged but never counted.
    #[serde(default)]
    pub counted: bool,
    pub reason: Option<String>,
    pub timestamp_ms: i64,
}

/// Narrow async contract to the external settings/log store.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<bool>;

    /// Active patterns for the named list, already filtered to active rows.
    async fn list_active_agents(&self, kind: AgentListKind) -> anyhow::Result<Vec<String>>;

    /// Append one audit row. Fire-and-forget semantics are acceptable at
    /// the caller.
    async fn append_request_log(&self, entry: &RequestLogEntry) -> anyhow::Result<()>;

    /// `(visitor_id, timestamp_ms)` pairs since `since_ms`, for warming the
    /// rate limiter after a restart.
    ///
    /// Implementations must return only rows with `counted == true`:
    /// replaying a row that never consumed rate budget (an asset fetch, an
    /// excluded path, an allow-listed agent) would inflate the rebuilt
    /// window and block legitimate visitors.
    async fn recent_logs_for_warmup(&self, since_ms: i64) -> anyhow::Result<Vec<(String, i64)>>;
}

/// TTL-cached view of the settings store with typed getters.
///
/// The hot path reads settings through here so a slow or failing store is
/// consulted at most once per TTL; on failure the typed getters fall back
/// to the bootstrap config (honeypot enabled, static rate limits).
pub struct CachedSettings {
    store: Arc<dyn SettingsStore>,
    cache: Cache<String, Option<String>>,
    default_honeypot_enabled: bool,
    default_window_ms: i64,
    default_max: u32,
    default_server_header: String,
}

impl CachedSettings {
    pub fn new(store: Arc<dyn SettingsStore>, config: &GatewayConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.settings_cache.capacity)
            .time_to_live(Duration::from_secs(config.settings_cache.ttl_seconds))
            .build();
        Self {
            store,
            cache,
            default_honeypot_enabled: config.honeypot.enabled,
            default_window_ms: config.rate_limit.window_ms,
            default_max: config.rate_limit.max_requests,
            default_server_header: config.decoy.server_header.clone(),
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        let store = Arc::clone(&self.store);
        let lookup_key = key.to_string();
        let result = self
            .cache
            .try_get_with(key.to_string(), async move {
                store.get_setting(&lookup_key).await
            })
            .await;
        match result {
            Ok(value) => value,
            Err(error) => {
                warn!(key, %error, "settings read failed, using default");
                None
            }
        }
    }

    pub async fn honeypot_enabled(&self) -> bool {
        match self.get(keys::HONEYPOT_ENABLED).await.as_deref() {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => self.default_honeypot_enabled,
        }
    }

    pub async fn rate_limit_window_ms(&self) -> i64 {
        self.get(keys::RATE_LIMIT_WINDOW_MS)
            .await
            .and_then(|v| v.parse().ok())
            .filter(|w| *w > 0)
            .unwrap_or(self.default_window_ms)
    }

    pub async fn rate_limit_max(&self) -> u32 {
        self.get(keys::RATE_LIMIT_MAX)
            .await
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.default_max)
    }

    pub async fn decoy_server_header(&self) -> String {
        self.get(keys::DECOY_SERVER_HEADER)
            .await
            .unwrap_or_else(|| self.default_server_header.clone())
    }

    /// Drop all cached values; the next read hits the store again.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}

/// In-memory store used by tests and the preview binary.
#[derive(Default)]
pub struct MemoryStore {
    settings: RwLock<HashMap<String, String>>,
    good_agents: RwLock<Vec<String>>,
    bad_agents: RwLock<Vec<String>>,
    logs: RwLock<Vec<RequestLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_agents(&self, kind: AgentListKind, patterns: Vec<String>) {
        let target = match kind {
            AgentListKind::Bad => &self.bad_agents,
            AgentListKind::Good => &self.good_agents,
        };
        *target.write().expect("agents lock poisoned") = patterns;
    }

    /// Snapshot of the audit trail, oldest first.
    pub fn logs(&self) -> Vec<RequestLogEntry> {
        self.logs.read().expect("logs lock poisoned").clone()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .settings
            .read()
            .expect("settings lock poisoned")
            .get(key)
            .cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<bool> {
        self.settings
            .write()
            .expect("settings lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn list_active_agents(&self, kind: AgentListKind) -> anyhow::Result<Vec<String>> {
        let source = match kind {
            AgentListKind::Bad => &self.bad_agents,
            AgentListKind::Good => &self.good_agents,
        };
        Ok(source.read().expect("agents lock poisoned").clone())
    }

    async fn append_request_log(&self, entry: &RequestLogEntry) -> anyhow::Result<()> {
        self.logs
            .write()
            .expect("logs lock poisoned")
            .push(entry.clone());
        Ok(())
    }

    async fn recent_logs_for_warmup(&self, since_ms: i64) -> anyhow::Result<Vec<(String, i64)>> {
        // Only rows that consumed rate budget contribute to the
        // reconstructed windows.
        Ok(self
            .logs
            .read()
            .expect("logs lock poisoned")
            .iter()
            .filter(|entry| entry.counted && entry.timestamp_ms >= since_ms)
            .map(|entry| (entry.visitor_id.clone(), entry.timestamp_ms))
            .collect())
    }
}
