pub(crate) mod cache;
pub(crate) mod http;
pub(crate) mod query;
pub(crate) mod ratelimit;
pub(crate) mod records;

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use self::cache::ResponseCache;
use self::http::RequestClient;
use self::query::{Query, date_filter, date_range_filter, probe_variants};
use self::ratelimit::RateLimiter;
pub use self::records::{
    DataOrigin, GenerationPoint, LoadPoint, ODataEnvelope, PricePoint, RedispatchEvent,
    ReserveMargin, Severity, Sourced,
};

#[derive(Error, Debug)]
pub enum PseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("JSON parsing failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no request attempts were made")]
    NoAttempts,
}

/// Cache lifetimes per data class: current-state data turns over quickly,
/// limitation events less so, forecasts are stable for the hour.
const CURRENT_TTL: Duration = Duration::from_secs(5 * 60);
const EVENT_TTL: Duration = Duration::from_secs(15 * 60);
const FORECAST_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub generation: String,
    pub system_load: String,
    pub operational_limits: String,
    pub price_forecasts: String,
    pub reserve_margins: String,
}

#[derive(Debug, Clone)]
pub struct PseConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub rate_limit: RateLimitConfig,
    pub cache_max_size: usize,
    pub endpoints: Endpoints,
    /// Case-insensitive fragments matched against unit resource names to
    /// identify PV units.
    pub pv_resource_filters: Vec<String>,
}

impl Default for PseConfig {
    fn default() -> Self {
        Self {
            base_url: "https://v2.api.raporty.pse.pl/api".to_string(),
            timeout_ms: 10_000,
            max_retries: 3,
            rate_limit: RateLimitConfig {
                max_requests: 30,
                window_ms: 60_000,
            },
            cache_max_size: 100,
            endpoints: Endpoints {
                generation: "gen-jw".to_string(),
                system_load: "kse-load".to_string(),
                operational_limits: "ogr-oper".to_string(),
                price_forecasts: "price-fcst".to_string(),
                reserve_margins: "pk5l-wp".to_string(),
            },
            pv_resource_filters: vec![
                "PV".to_string(),
                "FOTO".to_string(),
                "SOLAR".to_string(),
                "PGE EO".to_string(),
            ],
        }
    }
}

/// Combined result of one `dashboard_snapshot` poll.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub pv_generation: Sourced<Vec<GenerationPoint>>,
    pub system_load: Sourced<Vec<LoadPoint>>,
    pub redispatch_events: Sourced<Vec<RedispatchEvent>>,
    pub price_forecasts: Sourced<Vec<PricePoint>>,
    pub reserve_margins: Sourced<Vec<ReserveMargin>>,
    pub fetched_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub cache_size: usize,
    pub request_count: u64,
    pub queue_length: usize,
    pub online: bool,
    pub rate_limit_in_window: usize,
}

#[derive(Debug, Clone)]
struct QueuedFetch {
    endpoint: String,
    query: Query,
    ttl: Duration,
}

/// Rate-limited, caching, degrading client for the PSE market-data API.
///
/// Endpoint accessors never return an error: on failure they fall back to
/// stale cache and finally to deterministic mock datasets, tagging every
/// result with its [`DataOrigin`].
pub struct PseClient {
    config: PseConfig,
    http: RequestClient,
    limiter: RateLimiter,
    cache: ResponseCache,
    online: AtomicBool,
    request_count: AtomicU64,
    queue: Mutex<Vec<QueuedFetch>>,
}

impl PseClient {
    pub fn new(config: PseConfig) -> Self {
        let http = RequestClient::new(
            Duration::from_millis(config.timeout_ms),
            config.max_retries,
        );
        let limiter = RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_millis(config.rate_limit.window_ms),
        );
        let cache = ResponseCache::new(config.cache_max_size);

        Self {
            config,
            http,
            limiter,
            cache,
            online: AtomicBool::new(true),
            request_count: AtomicU64::new(0),
            queue: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &PseConfig {
        &self.config
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn cache_key(endpoint: &str, query: &Query) -> String {
        let params: Vec<String> = query
            .params()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{endpoint}?{}", params.join("&"))
    }

    /// Core request path: offline short-circuit, rate limiting, cache,
    /// network fetch, stale fallback. Returns the raw envelope payload and
    /// how it was obtained, or `None` when every tier came up empty.
    async fn request_raw(
        &self,
        endpoint: &str,
        query: &Query,
        ttl: Duration,
        force_refresh: bool,
    ) -> Option<(Value, DataOrigin)> {
        let key = Self::cache_key(endpoint, query);

        if !self.online.load(Ordering::Relaxed) {
            tracing::info!(endpoint, "offline, serving cache and queuing fetch");
            self.enqueue(endpoint, query, ttl);
            return self.cache.get_stale(&key).map(|v| (v, DataOrigin::Cached));
        }

        self.limiter.admit().await;

        if !force_refresh {
            if let Some(payload) = self.cache.get(&key) {
                tracing::debug!(endpoint, "cache hit");
                return Some((payload, DataOrigin::Cached));
            }
        }

        self.request_count.fetch_add(1, Ordering::Relaxed);
        let url = self.endpoint_url(endpoint);

        match self.http.fetch_json(&url, &query.params()).await {
            Ok(payload) => {
                self.cache.put(&key, payload.clone(), ttl);
                Some((payload, DataOrigin::Live))
            }
            Err(err) => {
                tracing::warn!(endpoint, error = %err, "fetch failed, falling back to stale cache");
                self.cache.get_stale(&key).map(|v| (v, DataOrigin::Stale))
            }
        }
    }

    /// Request path for endpoints with unreliable server-side filtering:
    /// try the three filter variants in order and keep the first non-empty
    /// result set.
    async fn request_probed(
        &self,
        endpoint: &str,
        base: &Query,
        date: NaiveDate,
        ttl: Duration,
        force_refresh: bool,
    ) -> Option<(Vec<Value>, DataOrigin)> {
        let mut last = None;

        for variant in probe_variants(base, date) {
            if let Some((payload, origin)) = self.request_raw(endpoint, &variant, ttl, force_refresh).await
            {
                let envelope = ODataEnvelope::from_value(&payload);
                if !envelope.value.is_empty() {
                    return Some((envelope.value, origin));
                }
                tracing::debug!(endpoint, filter = ?variant.filter, "empty result, trying next filter variant");
                last = Some((envelope.value, origin));
            }
        }

        last
    }

    fn enqueue(&self, endpoint: &str, query: &Query, ttl: Duration) {
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        queue.push(QueuedFetch {
            endpoint: endpoint.to_string(),
            query: query.clone(),
            ttl,
        });
    }

    /// Flip the online flag. Reconnecting replays any fetches that were
    /// queued while offline, warming the cache for subsequent reads.
    pub async fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
        if online {
            self.process_queued_requests().await;
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    async fn process_queued_requests(&self) {
        let pending: Vec<QueuedFetch> = {
            let mut queue = self.queue.lock().expect("queue lock poisoned");
            queue.drain(..).collect()
        };

        if pending.is_empty() {
            return;
        }
        tracing::info!(count = pending.len(), "replaying queued requests");

        for fetch in pending {
            if self
                .request_raw(&fetch.endpoint, &fetch.query, fetch.ttl, true)
                .await
                .is_none()
            {
                tracing::warn!(endpoint = %fetch.endpoint, "queued request replay failed");
            }
        }
    }

    // --- endpoint accessors ------------------------------------------------

    /// Hourly PV generation for `date` (default: today), aggregated across
    /// units matching the PV allow-list.
    pub async fn pv_generation(
        &self,
        date: Option<NaiveDate>,
        force_refresh: bool,
    ) -> Sourced<Vec<GenerationPoint>> {
        let date = date.unwrap_or_else(today);
        let query = Query::new()
            .filter(date_filter(date))
            .select("business_date,hour,power,resource_name")
            .order_by("hour asc")
            .first(1000);

        match self
            .request_raw(&self.config.endpoints.generation, &query, CURRENT_TTL, force_refresh)
            .await
        {
            Some((payload, origin)) => {
                let envelope = ODataEnvelope::from_value(&payload);
                Sourced::new(
                    records::normalize_pv_generation(&envelope.value, &self.config.pv_resource_filters),
                    origin,
                )
            }
            None => {
                tracing::warn!("no PV generation data available, using mock profile");
                Sourced::new(records::mock_pv_generation(), DataOrigin::Mock)
            }
        }
    }

    /// Hourly KSE system load for `date` (default: today). The endpoint's
    /// filter support is unreliable, so the query is probed.
    pub async fn system_load(
        &self,
        date: Option<NaiveDate>,
        force_refresh: bool,
    ) -> Sourced<Vec<LoadPoint>> {
        let date = date.unwrap_or_else(today);
        let base = Query::new()
            .select("business_date,hour,load")
            .order_by("hour asc")
            .first(24);

        match self
            .request_probed(&self.config.endpoints.system_load, &base, date, CURRENT_TTL, force_refresh)
            .await
        {
            Some((rows, origin)) if !rows.is_empty() => {
                Sourced::new(records::normalize_system_load(&rows), origin)
            }
            _ => {
                tracing::warn!("no system load data available, using mock profile");
                Sourced::new(records::mock_system_load(), DataOrigin::Mock)
            }
        }
    }

    /// Redispatch / operational-limitation events over the trailing
    /// `days` days, most recent first.
    pub async fn redispatch_events(
        &self,
        days: i64,
        force_refresh: bool,
    ) -> Sourced<Vec<RedispatchEvent>> {
        let end = today();
        let start = end - chrono::Duration::days(days);
        let query = Query::new()
            .filter(date_range_filter(start, end))
            .select(
                "business_date,from_dtime,to_dtime,resource_name,direction,\
                 pol_min_power_of_unit,pol_max_power_of_unit,limiting_element",
            )
            .order_by("from_dtime desc")
            .first(500);

        match self
            .request_raw(&self.config.endpoints.operational_limits, &query, EVENT_TTL, force_refresh)
            .await
        {
            Some((payload, origin)) => {
                let envelope = ODataEnvelope::from_value(&payload);
                Sourced::new(records::normalize_redispatch(&envelope.value), origin)
            }
            None => {
                tracing::warn!("no redispatch data available");
                Sourced::new(Vec::new(), DataOrigin::Mock)
            }
        }
    }

    /// Hourly price forecasts for `date` (default: today). Probed like
    /// system load.
    pub async fn price_forecasts(
        &self,
        date: Option<NaiveDate>,
        force_refresh: bool,
    ) -> Sourced<Vec<PricePoint>> {
        let date = date.unwrap_or_else(today);
        let base = Query::new()
            .select("business_date,hour,price")
            .order_by("hour asc")
            .first(24);

        match self
            .request_probed(&self.config.endpoints.price_forecasts, &base, date, FORECAST_TTL, force_refresh)
            .await
        {
            Some((rows, origin)) if !rows.is_empty() => {
                Sourced::new(records::normalize_price_forecasts(&rows), origin)
            }
            _ => {
                tracing::warn!("no price forecast data available, using mock profile");
                Sourced::new(records::mock_price_forecasts(), DataOrigin::Mock)
            }
        }
    }

    /// Reserve-margin forecast for the next `days` days, ascending by
    /// plan time.
    pub async fn reserve_margins(&self, days: i64, force_refresh: bool) -> Sourced<Vec<ReserveMargin>> {
        let start = today();
        let end = start + chrono::Duration::days(days);
        let query = Query::new()
            .filter(date_range_filter(start, end))
            .order_by("plan_dtime asc")
            .first(2000);

        match self
            .request_raw(&self.config.endpoints.reserve_margins, &query, FORECAST_TTL, force_refresh)
            .await
        {
            Some((payload, origin)) => {
                let envelope = ODataEnvelope::from_value(&payload);
                Sourced::new(records::normalize_reserve_margins(&envelope.value), origin)
            }
            None => {
                tracing::warn!("no reserve margin data available, using mock profile");
                Sourced::new(records::mock_reserve_margins(start), DataOrigin::Mock)
            }
        }
    }

    /// Fetch every dashboard dataset concurrently.
    pub async fn dashboard_snapshot(&self, force_refresh: bool) -> DashboardSnapshot {
        let (pv_generation, system_load, redispatch_events, price_forecasts, reserve_margins) = tokio::join!(
            self.pv_generation(None, force_refresh),
            self.system_load(None, force_refresh),
            self.redispatch_events(30, force_refresh),
            self.price_forecasts(None, force_refresh),
            self.reserve_margins(3, force_refresh),
        );

        DashboardSnapshot {
            pv_generation,
            system_load,
            redispatch_events,
            price_forecasts,
            reserve_margins,
            fetched_at: Local::now().to_rfc3339(),
        }
    }

    /// Probe the system-load endpoint with a minimal query.
    pub async fn health_check(&self) -> HealthStatus {
        let url = self.endpoint_url(&self.config.endpoints.system_load);
        let query = Query::new().select("business_date").first(1);
        let started = Instant::now();

        match self.http.fetch_json(&url, &query.params()).await {
            Ok(_) => HealthStatus {
                healthy: true,
                latency_ms: started.elapsed().as_millis() as u64,
                error: None,
            },
            Err(err) => HealthStatus {
                healthy: false,
                latency_ms: started.elapsed().as_millis() as u64,
                error: Some(err.to_string()),
            },
        }
    }

    pub async fn stats(&self) -> ClientStats {
        // Hold the queue guard only for this statement: keeping it inside the
        // struct literal below would carry it across the `.await` and make
        // the future non-Send.
        let queue_length = self.queue.lock().expect("queue lock poisoned").len();
        ClientStats {
            cache_size: self.cache.len(),
            request_count: self.request_count.load(Ordering::Relaxed),
            queue_length,
            online: self.is_online(),
            rate_limit_in_window: self.limiter.in_window().await,
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Client pointed at a dead address so every fetch fails fast.
    fn unreachable_client() -> PseClient {
        PseClient::new(PseConfig {
            base_url: "http://127.0.0.1:9/api".to_string(),
            timeout_ms: 300,
            max_retries: 1,
            ..PseConfig::default()
        })
    }

    #[test]
    fn cache_key_includes_endpoint_and_params() {
        let query = Query::new().filter("business_date eq '2024-05-01'").first(24);
        let key = PseClient::cache_key("kse-load", &query);
        assert_eq!(key, "kse-load?$filter=business_date eq '2024-05-01'&$first=24");
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_mock_without_error() {
        let client = unreachable_client();

        let load = client.system_load(None, false).await;
        assert_eq!(load.origin, DataOrigin::Mock);
        assert_eq!(load.data.len(), 24);

        let events = client.redispatch_events(30, false).await;
        assert_eq!(events.origin, DataOrigin::Mock);
        assert!(events.data.is_empty());
    }

    #[tokio::test]
    async fn offline_accessor_queues_and_serves_mock() {
        let client = unreachable_client();
        client.set_online(false).await;

        let generation = client.pv_generation(None, false).await;
        assert_eq!(generation.origin, DataOrigin::Mock);
        assert_eq!(generation.data.len(), 24);

        let stats = client.stats().await;
        assert!(!stats.online);
        assert_eq!(stats.queue_length, 1);
        // Offline path never touched the network.
        assert_eq!(stats.request_count, 0);
    }

    #[tokio::test]
    async fn reconnect_replays_queued_requests() {
        let client = unreachable_client();
        client.set_online(false).await;
        client.pv_generation(None, false).await;
        assert_eq!(client.stats().await.queue_length, 1);

        client.set_online(true).await;
        let stats = client.stats().await;
        assert_eq!(stats.queue_length, 0);
        assert!(stats.request_count >= 1);
    }

    #[tokio::test]
    async fn health_check_reports_unreachable_endpoint() {
        let client = unreachable_client();
        let health = client.health_check().await;
        assert!(!health.healthy);
        assert!(health.error.is_some());
    }
}
