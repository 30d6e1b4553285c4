//! The data service: cache-first reads over a prioritised chain of source
//! fetchers, with a settle-all aggregate for the core datasets.
//!
//! Every read resolves to a value. When the whole chain fails the slot
//! carries the endpoint's fallback default plus the failure message, so
//! consumers render an empty state instead of branching on errors.

use std::env;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::cache::{CacheStore, Storage};
use crate::domain::{
    AnalysisRecord, ConsumptionRecord, DailyProductionRecord, DamStatusRecord, OutageRecord,
    ProductionRecord, TariffRecord, WaterLossRecord, WaterSourceRecord,
};
use crate::endpoint::EndpointKey;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::sources::{
    usable, DatastoreClient, FetchParams, PrimaryApiClient, SnapshotFeedClient, SourceFetcher,
    DEFAULT_API_BASE, DEFAULT_DATASTORE_URL, DEFAULT_SNAPSHOT_URL,
};

/// One resolved dataset: typed records plus the chain failure, if any.
/// `data` is always populated, possibly with the fallback default.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSlot<T> {
    pub data: T,
    pub error: Option<String>,
}

impl<T> FetchSlot<T> {
    pub fn ok(data: T) -> Self {
        Self { data, error: None }
    }

    pub fn degraded(data: T, error: impl Into<String>) -> Self {
        Self {
            data,
            error: Some(error.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Settled outcome of one `fetch_all` fan-out. One slot per core dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub outages: FetchSlot<Vec<OutageRecord>>,
    pub dams_and_wells: FetchSlot<Vec<WaterSourceRecord>>,
    pub dam_status: FetchSlot<Vec<DamStatusRecord>>,
    pub daily_production: FetchSlot<Vec<DailyProductionRecord>>,
    pub production_distribution: FetchSlot<Vec<ProductionRecord>>,
    pub weekly_analysis: FetchSlot<Vec<AnalysisRecord>>,
    pub district_analysis: FetchSlot<Vec<AnalysisRecord>>,
    pub dam_quality: FetchSlot<Vec<AnalysisRecord>>,
}

impl AggregateResult {
    /// Endpoints that failed their whole source chain, for diagnostics.
    pub fn degraded_endpoints(&self) -> Vec<EndpointKey> {
        let mut degraded = Vec::new();
        if self.outages.is_degraded() {
            degraded.push(EndpointKey::Outages);
        }
        if self.dams_and_wells.is_degraded() {
            degraded.push(EndpointKey::DamsAndWells);
        }
        if self.dam_status.is_degraded() {
            degraded.push(EndpointKey::DamStatus);
        }
        if self.daily_production.is_degraded() {
            degraded.push(EndpointKey::DailyProduction);
        }
        if self.production_distribution.is_degraded() {
            degraded.push(EndpointKey::ProductionDistribution);
        }
        if self.weekly_analysis.is_degraded() {
            degraded.push(EndpointKey::WeeklyAnalysis);
        }
        if self.district_analysis.is_degraded() {
            degraded.push(EndpointKey::DistrictAnalysis);
        }
        if self.dam_quality.is_degraded() {
            degraded.push(EndpointKey::DamQuality);
        }
        degraded
    }
}

pub struct DataService {
    cache: CacheStore,
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    snapshot: Option<Arc<SnapshotFeedClient>>,
}

impl DataService {
    pub fn builder() -> DataServiceBuilder {
        DataServiceBuilder::default()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Resolves one endpoint: cache first unless forced, then the fetcher
    /// chain in priority order. A source that succeeds with an unusable
    /// payload yields to the next one. Usable results are written back to
    /// the cache; the fallback default never is.
    async fn endpoint_value(
        &self,
        endpoint: EndpointKey,
        params: FetchParams,
        force_refresh: bool,
    ) -> (Value, Option<String>) {
        let cache_key = format!("{endpoint}{}", params.cache_suffix());

        if !force_refresh {
            if let Some(cached) = self.cache.get(&cache_key) {
                debug!(endpoint = %endpoint, "served from cache");
                return (cached, None);
            }
        }

        let mut failures: Vec<String> = Vec::new();
        for fetcher in &self.fetchers {
            match fetcher.fetch(endpoint, &params).await {
                Ok(value) if usable(&value) => {
                    self.cache.set(&cache_key, &value);
                    return (value, None);
                }
                Ok(_) => {
                    debug!(endpoint = %endpoint, source = fetcher.name(), "unusable payload");
                    failures.push(format!("{}: unusable payload", fetcher.name()));
                }
                Err(error) => {
                    debug!(endpoint = %endpoint, source = fetcher.name(), error = %error, "source failed");
                    failures.push(format!("{}: {error}", fetcher.name()));
                }
            }
        }

        warn!(endpoint = %endpoint, "every source failed; serving fallback");
        (endpoint.fallback_value(), Some(failures.join("; ")))
    }

    /// Typed wrapper over `endpoint_value`. Records that fail to
    /// deserialize are skipped rather than poisoning the whole slot.
    async fn typed_slot<T: DeserializeOwned>(
        &self,
        endpoint: EndpointKey,
        params: FetchParams,
        force_refresh: bool,
    ) -> FetchSlot<Vec<T>> {
        let (value, error) = self.endpoint_value(endpoint, params, force_refresh).await;
        let records = match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            // Some upstreams wrap the rows in a single-member object.
            Value::Object(map) => map
                .into_iter()
                .find_map(|(_, nested)| match nested {
                    Value::Array(items) => Some(
                        items
                            .into_iter()
                            .filter_map(|item| serde_json::from_value(item).ok())
                            .collect(),
                    ),
                    _ => None,
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        FetchSlot {
            data: records,
            error,
        }
    }

    pub async fn outages(&self, force_refresh: bool) -> FetchSlot<Vec<OutageRecord>> {
        self.typed_slot(EndpointKey::Outages, FetchParams::none(), force_refresh)
            .await
    }

    pub async fn dams_and_wells(&self, force_refresh: bool) -> FetchSlot<Vec<WaterSourceRecord>> {
        self.typed_slot(
            EndpointKey::DamsAndWells,
            FetchParams::none(),
            force_refresh,
        )
        .await
    }

    pub async fn dam_status(&self, force_refresh: bool) -> FetchSlot<Vec<DamStatusRecord>> {
        self.typed_slot(EndpointKey::DamStatus, FetchParams::none(), force_refresh)
            .await
    }

    pub async fn daily_production(
        &self,
        force_refresh: bool,
    ) -> FetchSlot<Vec<DailyProductionRecord>> {
        self.typed_slot(
            EndpointKey::DailyProduction,
            FetchParams::none(),
            force_refresh,
        )
        .await
    }

    pub async fn production_distribution(
        &self,
        year: i32,
        force_refresh: bool,
    ) -> FetchSlot<Vec<ProductionRecord>> {
        self.typed_slot(
            EndpointKey::ProductionDistribution,
            FetchParams::for_year(year),
            force_refresh,
        )
        .await
    }

    pub async fn weekly_analysis(&self, force_refresh: bool) -> FetchSlot<Vec<AnalysisRecord>> {
        self.typed_slot(
            EndpointKey::WeeklyAnalysis,
            FetchParams::none(),
            force_refresh,
        )
        .await
    }

    pub async fn district_analysis(&self, force_refresh: bool) -> FetchSlot<Vec<AnalysisRecord>> {
        self.typed_slot(
            EndpointKey::DistrictAnalysis,
            FetchParams::none(),
            force_refresh,
        )
        .await
    }

    pub async fn dam_quality(&self, force_refresh: bool) -> FetchSlot<Vec<AnalysisRecord>> {
        self.typed_slot(EndpointKey::DamQuality, FetchParams::none(), force_refresh)
            .await
    }

    pub async fn consumption(
        &self,
        year: i32,
        force_refresh: bool,
    ) -> FetchSlot<Vec<ConsumptionRecord>> {
        self.typed_slot(
            EndpointKey::Consumption,
            FetchParams::for_year(year),
            force_refresh,
        )
        .await
    }

    pub async fn water_losses(&self, force_refresh: bool) -> FetchSlot<Vec<WaterLossRecord>> {
        self.typed_slot(EndpointKey::WaterLosses, FetchParams::none(), force_refresh)
            .await
    }

    pub async fn tariffs(&self, force_refresh: bool) -> FetchSlot<Vec<TariffRecord>> {
        self.typed_slot(EndpointKey::Tariffs, FetchParams::none(), force_refresh)
            .await
    }

    /// Settle-all fan-out over the core datasets. Every slot resolves,
    /// failures never short-circuit their siblings.
    pub async fn fetch_all(&self, force_refresh: bool) -> AggregateResult {
        let current_year = OffsetDateTime::now_utc().year();
        let (
            outages,
            dams_and_wells,
            dam_status,
            daily_production,
            production_distribution,
            weekly_analysis,
            district_analysis,
            dam_quality,
        ) = tokio::join!(
            self.outages(force_refresh),
            self.dams_and_wells(force_refresh),
            self.dam_status(force_refresh),
            self.daily_production(force_refresh),
            self.production_distribution(current_year, force_refresh),
            self.weekly_analysis(force_refresh),
            self.district_analysis(force_refresh),
            self.dam_quality(force_refresh),
        );

        AggregateResult {
            outages,
            dams_and_wells,
            dam_status,
            daily_production,
            production_distribution,
            weekly_analysis,
            district_analysis,
            dam_quality,
        }
    }

    /// Freshest known data instant: the newer of the snapshot envelope
    /// timestamp and the freshest cache stamp.
    pub async fn last_update_time(&self) -> Option<OffsetDateTime> {
        let envelope_time = match &self.snapshot {
            Some(snapshot) => snapshot.last_envelope_time().await,
            None => None,
        };
        let cache_time = self
            .cache
            .newest_timestamp_ms()
            .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok());

        match (envelope_time, cache_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// True unless every core dataset has a valid cache entry. Uses the
    /// same keys `fetch_all` writes, year suffix included.
    pub fn needs_refresh(&self) -> bool {
        let current_year = OffsetDateTime::now_utc().year();
        !EndpointKey::CORE.iter().all(|endpoint| {
            let params = match endpoint {
                EndpointKey::ProductionDistribution => FetchParams::for_year(current_year),
                _ => FetchParams::none(),
            };
            self.cache
                .has(&format!("{endpoint}{}", params.cache_suffix()))
        })
    }
}

/// Assembles the service. Every knob has a default, an env override, and a
/// builder override; the builder override wins.
#[derive(Default)]
pub struct DataServiceBuilder {
    http: Option<Arc<dyn HttpClient>>,
    storage: Option<Arc<dyn Storage>>,
    api_base: Option<String>,
    snapshot_url: Option<String>,
    datastore_url: Option<String>,
    relay_mode: Option<bool>,
    fetchers: Option<Vec<Arc<dyn SourceFetcher>>>,
}

impl DataServiceBuilder {
    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    pub fn with_snapshot_url(mut self, snapshot_url: impl Into<String>) -> Self {
        self.snapshot_url = Some(snapshot_url.into());
        self
    }

    pub fn with_datastore_url(mut self, datastore_url: impl Into<String>) -> Self {
        self.datastore_url = Some(datastore_url.into());
        self
    }

    pub fn with_relay_mode(mut self, relay_mode: bool) -> Self {
        self.relay_mode = Some(relay_mode);
        self
    }

    /// Replaces the whole source chain. Meant for tests; the snapshot
    /// timestamp then no longer feeds `last_update_time`.
    pub fn with_fetchers(mut self, fetchers: Vec<Arc<dyn SourceFetcher>>) -> Self {
        self.fetchers = Some(fetchers);
        self
    }

    pub fn build(self) -> DataService {
        let http: Arc<dyn HttpClient> = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let cache = match self.storage {
            Some(storage) => CacheStore::new(storage),
            None => CacheStore::in_memory(),
        };

        if let Some(fetchers) = self.fetchers {
            return DataService {
                cache,
                fetchers,
                snapshot: None,
            };
        }

        let api_base = self
            .api_base
            .or_else(|| env_override("HYDRANT_API_BASE"))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_owned());
        let snapshot_url = self
            .snapshot_url
            .or_else(|| env_override("HYDRANT_SNAPSHOT_URL"))
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_URL.to_owned());
        let datastore_url = self
            .datastore_url
            .or_else(|| env_override("HYDRANT_DATASTORE_URL"))
            .unwrap_or_else(|| DEFAULT_DATASTORE_URL.to_owned());
        let relay_mode = self
            .relay_mode
            .unwrap_or_else(|| env_flag("HYDRANT_RELAY_MODE"));

        let snapshot = Arc::new(SnapshotFeedClient::new(http.clone(), snapshot_url));
        let primary = Arc::new(PrimaryApiClient::new(http.clone(), api_base, relay_mode));
        let datastore = Arc::new(DatastoreClient::new(http, datastore_url));

        DataService {
            cache,
            fetchers: vec![snapshot.clone(), primary, datastore],
            snapshot: Some(snapshot),
        }
    }
}

fn env_override(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).ok().as_deref().map(str::trim),
        Some("1") | Some("true") | Some("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always answers with the given payload and counts calls.
    struct FixedFetcher {
        label: &'static str,
        payload: Value,
        calls: AtomicUsize,
    }

    impl FixedFetcher {
        fn arc(label: &'static str, payload: Value) -> Arc<Self> {
            Arc::new(Self {
                label,
                payload,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl SourceFetcher for FixedFetcher {
        fn name(&self) -> &'static str {
            self.label
        }

        fn fetch<'a>(
            &'a self,
            _endpoint: EndpointKey,
            _params: &'a FetchParams,
        ) -> Pin<Box<dyn Future<Output = Result<Value, FetchError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let payload = self.payload.clone();
            Box::pin(async move { Ok(payload) })
        }
    }

    /// Always fails with a network error.
    struct FailingFetcher;

    impl SourceFetcher for FailingFetcher {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn fetch<'a>(
            &'a self,
            _endpoint: EndpointKey,
            _params: &'a FetchParams,
        ) -> Pin<Box<dyn Future<Output = Result<Value, FetchError>> + Send + 'a>> {
            Box::pin(async move { Err(FetchError::network("wire down")) })
        }
    }

    fn service_with(fetchers: Vec<Arc<dyn SourceFetcher>>) -> DataService {
        DataService::builder().with_fetchers(fetchers).build()
    }

    #[tokio::test]
    async fn unusable_payloads_yield_to_the_next_source() {
        let empty = FixedFetcher::arc("empty", json!([]));
        let real = FixedFetcher::arc(
            "real",
            json!([{"area": "Ypsonas", "district": "Limassol", "reason": "burst main"}]),
        );
        let service = service_with(vec![empty.clone(), real.clone()]);

        let slot = service.outages(false).await;
        assert!(slot.error.is_none());
        assert_eq!(slot.data.len(), 1);
        assert_eq!(empty.calls.load(Ordering::SeqCst), 1);
        assert_eq!(real.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn total_chain_failure_serves_the_fallback_with_an_error() {
        let service = service_with(vec![Arc::new(FailingFetcher)]);

        let slot = service.dam_status(false).await;
        assert!(slot.data.is_empty(), "fallback default is the empty set");
        let error = slot.error.expect("chain failure must be reported");
        assert!(error.contains("failing"));
        assert!(error.contains("wire down"));
    }

    #[tokio::test]
    async fn fallback_results_are_not_cached() {
        let service = service_with(vec![Arc::new(FailingFetcher)]);

        service.dam_status(false).await;
        assert!(!service.cache().has(EndpointKey::DamStatus.as_str()));
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let fetcher = FixedFetcher::arc("real", json!([{"name": "Kouris"}]));
        let service = service_with(vec![fetcher.clone()]);

        service.dam_status(false).await;
        service.dam_status(false).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_a_warm_cache() {
        let fetcher = FixedFetcher::arc("real", json!([{"name": "Kouris"}]));
        let service = service_with(vec![fetcher.clone()]);

        service.dam_status(false).await;
        service.dam_status(true).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_all_populates_every_slot_even_on_total_failure() {
        let service = service_with(vec![Arc::new(FailingFetcher)]);

        let result = service.fetch_all(false).await;
        assert!(result.outages.data.is_empty());
        assert!(result.dam_status.data.is_empty());
        assert!(result.dam_quality.data.is_empty());
        assert_eq!(result.degraded_endpoints().len(), EndpointKey::CORE.len());
    }

    #[tokio::test]
    async fn one_failing_endpoint_does_not_poison_its_siblings() {
        // The fixed fetcher serves every endpoint; slots deserialize what
        // fits their schema and the rest stay empty but non-degraded.
        let fetcher = FixedFetcher::arc("real", json!([{"name": "Kouris"}]));
        let service = service_with(vec![fetcher]);

        let result = service.fetch_all(false).await;
        assert!(result.degraded_endpoints().is_empty());
    }

    #[tokio::test]
    async fn needs_refresh_until_every_core_dataset_is_cached() {
        let fetcher = FixedFetcher::arc("real", json!([{"name": "Kouris"}]));
        let service = service_with(vec![fetcher]);

        assert!(service.needs_refresh());
        service.fetch_all(false).await;
        assert!(!service.needs_refresh());
    }

    #[tokio::test]
    async fn single_member_object_wrappers_are_unwrapped() {
        let fetcher = FixedFetcher::arc("real", json!({"rows": [{"name": "Asprokremmos"}]}));
        let service = service_with(vec![fetcher]);

        let slot = service.dam_status(false).await;
        assert_eq!(slot.data.len(), 1);
        assert_eq!(slot.data[0].name, "Asprokremmos");
    }
}
