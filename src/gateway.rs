//! Detection orchestrator.
//!
//! Composes agent classification, rate limiting, and the explicit trigger
//! parameter into one allow-or-decoy decision per request, and owns the
//! decoy generator plus the background refresh/sweep tasks.

use crate::agents::AgentLists;
use crate::config::GatewayConfig;
use crate::decision::{BlockReason, DetectionResult};
use crate::markov::{page_seed, MarkovIndex, MarkovStats, TextGenerator};
use crate::rate::{now_ms, RateLimiter};
use crate::store::{CachedSettings, RequestLogEntry, SettingsStore};
use crate::visitor;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Content type of every decoy response.
pub const DECOY_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// One inbound request as seen by the detection core.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub path: String,
    pub user_agent: String,
    pub ip: String,
    pub referrer: Option<String>,
    pub query: HashMap<String, String>,
}

impl ClassifyRequest {
    pub fn new(
        path: impl Into<String>,
        user_agent: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            user_agent: user_agent.into(),
            ip: ip.into(),
            referrer: None,
            query: HashMap::new(),
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }
}

/// The bot-detection gateway core.
///
/// All shared state is owned here and injected into the pieces that need
/// it; nothing module-global. Create one at startup, start its background
/// tasks, and drop it at shutdown.
pub struct DecoyGateway {
    config: GatewayConfig,
    settings: CachedSettings,
    agents: AgentLists,
    limiter: RateLimiter,
    generator: TextGenerator,
    store: Arc<dyn SettingsStore>,
}

impl DecoyGateway {
    /// Build the gateway: validate config, load agent lists, warm the rate
    /// limiter from persisted logs, and index the decoy corpus.
    ///
    /// Agent-list and warmup failures degrade to empty/cold state with a
    /// warning; only invalid configuration is fatal.
    pub async fn new(config: GatewayConfig, store: Arc<dyn SettingsStore>) -> anyhow::Result<Self> {
        config.validate()?;

        let settings = CachedSettings::new(Arc::clone(&store), &config);

        let agents = AgentLists::new();
        if let Err(error) = agents.refresh(store.as_ref()).await {
            warn!(%error, "initial agent list load failed, starting with empty lists");
        }

        let limiter = RateLimiter::new();
        if config.rate_limit.warmup {
            let since = now_ms() - config.rate_limit.window_ms;
            match store.recent_logs_for_warmup(since).await {
                Ok(rows) => {
                    let replayed = rows.len();
                    for (visitor_id, timestamp_ms) in rows {
                        limiter.record_at(&visitor_id, timestamp_ms);
                    }
                    debug!(replayed, "rate limiter warmed from request logs");
                }
                Err(error) => warn!(%error, "rate limiter warmup failed, starting cold"),
            }
        }

        let index = match &config.decoy.corpus_dir {
            Some(dir) => MarkovIndex::build_from_dir(dir),
            None => MarkovIndex::empty(),
        };
        let stats = index.stats();
        info!(
            vocabulary = stats.vocabulary,
            transitions = stats.transitions,
            source_words = stats.source_words,
            "decoy corpus indexed"
        );

        Ok(Self {
            config,
            settings,
            agents,
            limiter,
            generator: TextGenerator::new(index),
            store,
        })
    }

    /// Classify one request as allowed or decoy-bound.
    ///
    /// Checks run in strict order, short-circuiting at the first match;
    /// see the module docs. Every outcome is appended to the audit log
    /// fire-and-forget, so this never blocks on the store.
    pub async fn classify(&self, request: &ClassifyRequest) -> DetectionResult {
        let visitor_id =
            visitor::generate_visitor_id(&request.user_agent, &request.ip, &self.config.secret);
        let (result, counted) = self.evaluate(request, &visitor_id).await;
        debug!(
            visitor = %result.visitor_id,
            path = %request.path,
            blocked = result.blocked,
            counted,
            reason = result.reason_string().as_deref().unwrap_or(""),
            "request classified"
        );
        self.append_audit_log(request, &result, counted);
        result
    }

    /// Returns the decision plus whether the request consumed rate budget.
    /// Only requests that reach the rate check and are admitted count;
    /// the flag is persisted on the audit row so warmup replays exactly
    /// the rows that were in the window.
    async fn evaluate(
        &self,
        request: &ClassifyRequest,
        visitor_id: &str,
    ) -> (DetectionResult, bool) {
        // 1. Global toggle: when the honeypot is off, nothing is checked.
        if !self.settings.honeypot_enabled().await {
            return (DetectionResult::allowed(visitor_id), false);
        }

        // 2. Explicit trigger parameter overrides everything, including
        //    allow-listed agents.
        if request.query.contains_key(&self.config.honeypot.trigger_param) {
            return (
                DetectionResult::blocked(visitor_id, BlockReason::ScrambleParameter),
                false,
            );
        }

        // 3. Only HTML, non-excluded requests participate in detection and
        //    rate accounting.
        if !visitor::is_html_request(&request.path)
            || visitor::is_excluded_from_rate_limit(
                &request.path,
                &self.config.rate_limit.excluded_path_prefixes,
            )
        {
            return (DetectionResult::allowed(visitor_id), false);
        }

        let agents = self.agents.current();

        // 4. Allow list is a full bypass; the request is not rate-counted.
        if agents.is_known_good(&request.user_agent) {
            return (DetectionResult::allowed(visitor_id), false);
        }

        // 5. Deny list.
        if agents.is_known_bad(&request.user_agent) {
            return (
                DetectionResult::blocked(visitor_id, BlockReason::KnownBadAgent),
                false,
            );
        }

        // 6/7. Sliding-window rate check; admitted requests are counted.
        let window_ms = self.settings.rate_limit_window_ms().await;
        let max = self.settings.rate_limit_max().await;
        let check = self.limiter.check_and_record(visitor_id, window_ms, max);
        if check.exceeded {
            return (
                DetectionResult::blocked(
                    visitor_id,
                    BlockReason::RateLimitExceeded {
                        count: check.count,
                        limit: check.limit,
                    },
                ),
                false,
            );
        }

        (DetectionResult::allowed(visitor_id), true)
    }

    /// Append the decision to the audit trail without blocking the caller.
    /// Log failures are logged locally and swallowed.
    fn append_audit_log(&self, request: &ClassifyRequest, result: &DetectionResult, counted: bool) {
        let entry = RequestLogEntry {
            visitor_id: result.visitor_id.clone(),
            user_agent: request.user_agent.clone(),
            ip: request.ip.clone(),
            path: request.path.clone(),
            referrer: request.referrer.clone(),
            blocked: result.blocked,
            counted,
            reason: result.reason_string(),
            timestamp_ms: now_ms(),
        };
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(error) = store.append_request_log(&entry).await {
                warn!(%error, "audit log append failed");
            }
        });
    }

    /// Fabricate a full decoy page for `path`. Same path and query, same
    /// bytes. Query parameters other than the trigger are folded into the
    /// seed in sorted order, so `?page=2` and `?page=3` read as distinct
    /// pages and keep a crawler paginating through fabrications.
    pub fn render_decoy_page(
        &self,
        path: &str,
        query: &HashMap<String, String>,
    ) -> (String, &'static str) {
        let mut pairs: Vec<String> = query
            .iter()
            .filter(|(key, _)| *key != &self.config.honeypot.trigger_param)
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        pairs.sort_unstable();
        let target = if pairs.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{}", pairs.join("&"))
        };
        (self.generator.decoy_page(&target), DECOY_CONTENT_TYPE)
    }

    /// Scramble the visible words of a real page, seeded from `path`.
    pub fn scramble_existing_page(&self, html: &str, path: &str) -> String {
        self.generator.scramble_html(html, &page_seed(path))
    }

    /// Server header value to present on decoy responses.
    pub async fn decoy_server_header(&self) -> String {
        self.settings.decoy_server_header().await
    }

    /// Reload the agent allow/deny lists from the store immediately,
    /// outside the background refresh cadence.
    pub async fn refresh_agent_lists(&self) -> anyhow::Result<()> {
        self.agents.refresh(self.store.as_ref()).await
    }

    /// Drop cached settings so the next read hits the store.
    pub fn invalidate_settings(&self) {
        self.settings.invalidate();
    }

    /// Rebuild the corpus index from `dir` and swap it in atomically.
    /// Admin-triggered; in-flight generation keeps using the old index
    /// until the swap completes.
    pub fn rebuild_index(&self, dir: &Path) -> MarkovStats {
        let index = MarkovIndex::build_from_dir(dir);
        let stats = index.stats();
        self.generator.install_index(index);
        info!(
            vocabulary = stats.vocabulary,
            transitions = stats.transitions,
            "decoy corpus reindexed"
        );
        stats
    }

    /// Generator statistics for diagnostics.
    pub fn corpus_stats(&self) -> MarkovStats {
        self.generator.stats()
    }

    /// Visitors currently tracked by the rate limiter.
    pub fn tracked_visitors(&self) -> usize {
        self.limiter.tracked_visitors()
    }
}

/// Handles to the gateway's background tasks. Abort them at shutdown.
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Start the interval-driven agent refresh and rate-window sweep.
///
/// Both loops communicate through the same concurrency-safe structures as
/// request handlers; a failed refresh keeps the last-known-good lists.
pub fn start_background_tasks(gateway: &Arc<DecoyGateway>) -> BackgroundTasks {
    let mut handles = Vec::new();

    let refresh_gateway = Arc::clone(gateway);
    let refresh_every = Duration::from_secs(refresh_gateway.config.agents.refresh_interval_secs);
    handles.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh_every);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            if let Err(error) = refresh_gateway
                .agents
                .refresh(refresh_gateway.store.as_ref())
                .await
            {
                warn!(%error, "agent list refresh failed, keeping previous lists");
            }
        }
    }));

    let sweep_gateway = Arc::clone(gateway);
    let sweep_every = Duration::from_secs(sweep_gateway.config.rate_limit.sweep_interval_secs);
    handles.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let window_ms = sweep_gateway.settings.rate_limit_window_ms().await;
            sweep_gateway.limiter.sweep(window_ms);
        }
    }));

    BackgroundTasks { handles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{keys, AgentListKind, MemoryStore};

    async fn gateway_with(store: Arc<MemoryStore>, config: GatewayConfig) -> DecoyGateway {
        DecoyGateway::new(config, store as Arc<dyn SettingsStore>)
            .await
            .unwrap()
    }

    fn browser_request(path: &str) -> ClassifyRequest {
        ClassifyRequest::new(path, "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0", "203.0.113.7")
    }

    #[tokio::test]
    async fn plain_request_is_allowed() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway_with(store, GatewayConfig::default()).await;

        let result = gateway.classify(&browser_request("/index.html")).await;
        assert!(!result.blocked);
        assert_eq!(result.visitor_id.len(), 16);
    }

    #[tokio::test]
    async fn trigger_parameter_blocks_even_allow_listed_agents() {
        let store = Arc::new(MemoryStore::new());
        store.set_agents(AgentListKind::Good, vec!["Googlebot/2.1".to_string()]);
        let gateway = gateway_with(store, GatewayConfig::default()).await;

        let request = ClassifyRequest::new("/", "Googlebot/2.1", "66.249.66.1")
            .with_query_param("scramble", "1");
        let result = gateway.classify(&request).await;
        assert!(result.blocked);
        assert_eq!(result.reason, Some(BlockReason::ScrambleParameter));
    }

    #[tokio::test]
    async fn deny_listed_agent_is_blocked() {
        let store = Arc::new(MemoryStore::new());
        store.set_agents(AgentListKind::Bad, vec!["scrapy".to_string()]);
        let gateway = gateway_with(store, GatewayConfig::default()).await;

        let request = ClassifyRequest::new("/", "Scrapy/2.11 (+https://scrapy.org)", "198.51.100.4");
        let result = gateway.classify(&request).await;
        assert!(result.blocked);
        assert_eq!(result.reason, Some(BlockReason::KnownBadAgent));
    }

    #[tokio::test]
    async fn non_html_and_excluded_paths_skip_detection() {
        let store = Arc::new(MemoryStore::new());
        store.set_agents(AgentListKind::Bad, vec!["scrapy".to_string()]);
        let gateway = gateway_with(store, GatewayConfig::default()).await;

        let asset = ClassifyRequest::new("/logo.png", "Scrapy/2.11", "198.51.100.4");
        assert!(!gateway.classify(&asset).await.blocked);

        let api = ClassifyRequest::new("/api/health", "Scrapy/2.11", "198.51.100.4");
        assert!(!gateway.classify(&api).await.blocked);
    }

    #[tokio::test]
    async fn honeypot_disabled_allows_everything_but_still_logs() {
        let store = Arc::new(MemoryStore::new());
        store.set_agents(AgentListKind::Bad, vec!["scrapy".to_string()]);
        store
            .set_setting(keys::HONEYPOT_ENABLED, "false")
            .await
            .unwrap();
        let gateway = gateway_with(Arc::clone(&store), GatewayConfig::default()).await;

        let request = ClassifyRequest::new("/", "Scrapy/2.11", "198.51.100.4");
        let result = gateway.classify(&request).await;
        assert!(!result.blocked);

        // Audit append is fire-and-forget; yield so it lands.
        tokio::task::yield_now().await;
        assert_eq!(store.logs().len(), 1);
        assert!(!store.logs()[0].blocked);
    }

    #[tokio::test]
    async fn rate_limit_blocks_after_max_and_reason_carries_counts() {
        let store = Arc::new(MemoryStore::new());
        let mut config = GatewayConfig::default();
        config.rate_limit.max_requests = 3;
        let gateway = gateway_with(store, config).await;

        let request = browser_request("/");
        for _ in 0..3 {
            assert!(!gateway.classify(&request).await.blocked);
        }
        let result = gateway.classify(&request).await;
        assert!(result.blocked);
        assert_eq!(
            result.reason,
            Some(BlockReason::RateLimitExceeded { count: 4, limit: 3 })
        );
    }

    #[tokio::test]
    async fn allow_listed_agent_bypasses_rate_limit() {
        let store = Arc::new(MemoryStore::new());
        store.set_agents(AgentListKind::Good, vec!["UptimeRobot/2.0".to_string()]);
        let mut config = GatewayConfig::default();
        config.rate_limit.max_requests = 2;
        let gateway = gateway_with(store, config).await;

        let request = ClassifyRequest::new("/", "UptimeRobot/2.0", "203.0.113.9");
        for _ in 0..10 {
            assert!(!gateway.classify(&request).await.blocked);
        }
        assert_eq!(gateway.tracked_visitors(), 0, "bypass must not count");
    }

    #[tokio::test]
    async fn audit_log_records_blocked_outcomes() {
        let store = Arc::new(MemoryStore::new());
        store.set_agents(AgentListKind::Bad, vec!["curl".to_string()]);
        let gateway = gateway_with(Arc::clone(&store), GatewayConfig::default()).await;

        let request = ClassifyRequest::new("/page", "curl/8.4.0", "198.51.100.7")
            .with_referrer("https://example.com/");
        gateway.classify(&request).await;
        tokio::task::yield_now().await;

        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].blocked);
        assert_eq!(logs[0].reason.as_deref(), Some("known_bad_agent"));
        assert_eq!(logs[0].referrer.as_deref(), Some("https://example.com/"));
    }

    #[tokio::test]
    async fn warmup_restores_rate_budgets() {
        let store = Arc::new(MemoryStore::new());
        let mut config = GatewayConfig::default();
        config.rate_limit.max_requests = 2;

        // Seed persisted logs as if a previous process counted requests.
        let visitor_id = crate::visitor::generate_visitor_id(
            "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0",
            "203.0.113.7",
            &config.secret,
        );
        for _ in 0..2 {
            store
                .append_request_log(&RequestLogEntry {
                    visitor_id: visitor_id.clone(),
                    user_agent: "ua".to_string(),
                    ip: "203.0.113.7".to_string(),
                    path: "/".to_string(),
                    referrer: None,
                    blocked: false,
                    counted: true,
                    reason: None,
                    timestamp_ms: now_ms() - 1_000,
                })
                .await
                .unwrap();
        }

        let gateway = gateway_with(store, config).await;
        let result = gateway.classify(&browser_request("/")).await;
        assert!(result.blocked, "restart must not reset rate budgets");
    }

    #[tokio::test]
    async fn only_rate_counted_requests_are_logged_as_counted() {
        let store = Arc::new(MemoryStore::new());
        store.set_agents(AgentListKind::Good, vec!["UptimeRobot/2.0".to_string()]);
        let gateway = gateway_with(Arc::clone(&store), GatewayConfig::default()).await;

        gateway.classify(&browser_request("/")).await;
        gateway.classify(&browser_request("/img/logo.png")).await;
        gateway.classify(&browser_request("/api/items")).await;
        gateway
            .classify(&ClassifyRequest::new("/", "UptimeRobot/2.0", "203.0.113.9"))
            .await;
        tokio::task::yield_now().await;

        let logs = store.logs();
        assert_eq!(logs.len(), 4);
        let counted: Vec<&str> = logs
            .iter()
            .filter(|l| l.counted)
            .map(|l| l.path.as_str())
            .collect();
        assert_eq!(counted, vec!["/"]);
    }

    #[tokio::test]
    async fn decoy_rendering_is_deterministic_per_path() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway_with(store, GatewayConfig::default()).await;

        let no_query = HashMap::new();
        let (page_a, content_type) = gateway.render_decoy_page("/blog/entry", &no_query);
        let (page_b, _) = gateway.render_decoy_page("/blog/entry", &no_query);
        assert_eq!(page_a, page_b);
        assert_eq!(content_type, DECOY_CONTENT_TYPE);

        // The trigger parameter itself does not change the rendered page.
        let mut trigger_only = HashMap::new();
        trigger_only.insert("scramble".to_string(), "1".to_string());
        let (page_c, _) = gateway.render_decoy_page("/blog/entry", &trigger_only);
        assert_eq!(page_a, page_c);

        // Other query parameters select a different fabrication.
        let mut paginated = HashMap::new();
        paginated.insert("page".to_string(), "2".to_string());
        let (page_d, _) = gateway.render_decoy_page("/blog/entry", &paginated);
        assert_ne!(page_a, page_d);
    }

    #[tokio::test]
    async fn background_tasks_start_and_shut_down() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(gateway_with(store, GatewayConfig::default()).await);
        let tasks = start_background_tasks(&gateway);
        tasks.shutdown();
    }
}
