//! Core library for hydrant.
//!
//! This crate contains:
//! - The TTL cache store and its storage backends
//! - Source fetchers (snapshot feed, primary API, tabular datastore)
//! - The cache-first data service with settle-all aggregation
//! - Normalized record schemas and quality rules
//! - Derived metrics: comparisons, quality bands, depletion countdown

pub mod cache;
pub mod countdown;
pub mod domain;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod metrics;
pub mod reference;
pub mod retry;
pub mod service;
pub mod sources;

pub use cache::{CacheStats, CacheStore, FileStorage, MemoryStorage, Settings, Storage};
pub use countdown::{CountdownState, CountdownTicker};
pub use domain::{
    rule_for, AnalysisRecord, ConsumptionRecord, DailyProductionRecord, DamStatusRecord,
    OutageRecord, ProductionRecord, QualityRule, SourceKind, TariffRecord, WaterLossRecord,
    WaterSourceRecord,
};
pub use endpoint::{EndpointKey, UnknownEndpoint};
pub use error::{FetchError, FetchErrorKind, StorageError};
pub use http::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};
pub use metrics::{
    classify, monthly_totals, year_over_year, year_over_year_breakdown, DepletionProjection,
    ProductionTotals, QualityBand, YoyBreakdown, YoyComparison,
};
pub use reference::{Coordinates, HistoryEntry, HistorySummary, ReferenceData};
pub use retry::{Backoff, RetryConfig};
pub use service::{AggregateResult, DataService, DataServiceBuilder, FetchSlot};
pub use sources::{
    usable, DatastoreClient, FetchParams, PrimaryApiClient, SnapshotEnvelope, SnapshotFeedClient,
    SourceFetcher,
};
