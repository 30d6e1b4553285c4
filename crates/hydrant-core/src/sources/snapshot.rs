//! Snapshot feed: a pre-aggregated bundle of every endpoint's data served
//! from a single object-store URL.
//!
//! One envelope fetch feeds all endpoints, a deliberate single point of
//! failure traded for one round trip instead of N. The envelope is held in
//! memory for a short freshness window independent of the user cache TTL.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::endpoint::EndpointKey;
use crate::error::FetchError;
use crate::http::{HttpClient, HttpRequest};
use crate::sources::{embedded_error, FetchParams, SourceFetcher};

pub const DEFAULT_SNAPSHOT_URL: &str = "https://snapshots.waterauthority.gov.cy/latest.json";

const DEFAULT_FRESHNESS: Duration = Duration::from_secs(300);

/// The decoded feed object: a stated timestamp plus one payload (or error
/// marker) per raw endpoint name.
#[derive(Debug, Clone)]
pub struct SnapshotEnvelope {
    pub timestamp: Option<OffsetDateTime>,
    pub endpoints: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    endpoints: HashMap<String, Value>,
}

struct Settled {
    at: Instant,
    attempt: u64,
    outcome: Result<Arc<SnapshotEnvelope>, FetchError>,
}

/// Client for the snapshot feed with in-flight request de-duplication.
pub struct SnapshotFeedClient {
    http: Arc<dyn HttpClient>,
    url: String,
    freshness: Duration,
    /// Bumped once per settled fetch; lets queued callers detect that an
    /// attempt completed while they waited so they adopt its outcome.
    attempt: AtomicU64,
    state: tokio::sync::Mutex<Option<Settled>>,
}

impl SnapshotFeedClient {
    pub fn new(http: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            freshness: DEFAULT_FRESHNESS,
            attempt: AtomicU64::new(0),
            state: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Returns the current envelope, fetching at most once per freshness
    /// window. Concurrent callers collapse into one network request: the
    /// lock is held across the fetch, and callers that queued behind it
    /// adopt the settled outcome, success or failure, via the attempt
    /// counter. Failures are not cached beyond that; the next fresh caller
    /// retries.
    pub async fn envelope(&self) -> Result<Arc<SnapshotEnvelope>, FetchError> {
        let observed = self.attempt.load(Ordering::Acquire);
        let mut state = self.state.lock().await;

        if let Some(settled) = state.as_ref() {
            let settled_while_queued = settled.attempt != observed;
            let fresh = settled.outcome.is_ok() && settled.at.elapsed() < self.freshness;
            if settled_while_queued || fresh {
                return settled.outcome.clone();
            }
        }

        debug!(url = %self.url, "fetching snapshot envelope");
        let outcome = self.fetch_envelope().await.map(Arc::new);
        let attempt = self.attempt.fetch_add(1, Ordering::AcqRel) + 1;
        *state = Some(Settled {
            at: Instant::now(),
            attempt,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Timestamp stated by the last successfully fetched envelope, if any.
    pub async fn last_envelope_time(&self) -> Option<OffsetDateTime> {
        let state = self.state.lock().await;
        state
            .as_ref()
            .and_then(|settled| settled.outcome.as_ref().ok())
            .and_then(|envelope| envelope.timestamp)
    }

    async fn fetch_envelope(&self) -> Result<SnapshotEnvelope, FetchError> {
        let response = self
            .http
            .execute(HttpRequest::get(&self.url))
            .await
            .map_err(|e| FetchError::network(e.message().to_owned()))?;

        if !response.is_success() {
            return Err(FetchError::http_status(response.status));
        }

        let raw: RawEnvelope = serde_json::from_str(&response.body)
            .map_err(|e| FetchError::parse(format!("malformed snapshot envelope: {e}")))?;

        let timestamp = raw
            .timestamp
            .as_deref()
            .and_then(|text| OffsetDateTime::parse(text, &Rfc3339).ok());

        Ok(SnapshotEnvelope {
            timestamp,
            endpoints: raw.endpoints,
        })
    }

    fn extract(envelope: &SnapshotEnvelope, key: &str) -> Result<Value, FetchError> {
        let payload = envelope
            .endpoints
            .get(key)
            .ok_or_else(|| FetchError::no_data(format!("snapshot feed has no '{key}' entry")))?;

        if let Some(marker) = embedded_error(payload) {
            return Err(FetchError::upstream_degraded(format!(
                "snapshot feed entry '{key}' carries an error: {marker}"
            )));
        }

        Ok(payload.clone())
    }
}

impl SourceFetcher for SnapshotFeedClient {
    fn name(&self) -> &'static str {
        "snapshot-feed"
    }

    fn fetch<'a>(
        &'a self,
        endpoint: EndpointKey,
        params: &'a FetchParams,
    ) -> Pin<Box<dyn Future<Output = Result<Value, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            // An envelope failure fails every endpoint extraction uniformly.
            let envelope = self.envelope().await?;

            // Parameterized slots are published as e.g. `consumption_2024`.
            let key = match params.year {
                Some(year) => format!("{}_{year}", endpoint.feed_name()),
                None => endpoint.feed_name().to_owned(),
            };

            Self::extract(&envelope, &key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpError, HttpResponse};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct CountingHttpClient {
        calls: AtomicUsize,
        body: String,
        fail: bool,
    }

    impl CountingHttpClient {
        fn returning(body: Value) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                body: body.to_string(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                body: String::new(),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HttpClient for CountingHttpClient {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if self.fail {
                Err(HttpError::new("connection refused"))
            } else {
                Ok(HttpResponse::ok_json(self.body.clone()))
            };
            // Yield once so concurrent callers genuinely interleave.
            Box::pin(async move {
                tokio::task::yield_now().await;
                result
            })
        }
    }

    fn feed_body() -> Value {
        json!({
            "timestamp": "2026-08-01T06:00:00Z",
            "endpoints": {
                "dam_status": [{"name": "Kouris", "current_volume": 60.0,
                                "min_capacity": 10.0, "max_capacity": 115.0,
                                "fill_rate_percent": 52.2}],
                "outages": {"error": "collector offline"}
            }
        })
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_envelope_fetch() {
        let http = Arc::new(CountingHttpClient::returning(feed_body()));
        let client = SnapshotFeedClient::new(http.clone(), "https://feed.test/latest.json");

        let (a, b, c, d, e) = tokio::join!(
            client.envelope(),
            client.envelope(),
            client.envelope(),
            client.envelope(),
            client.envelope(),
        );

        for outcome in [a, b, c, d, e] {
            assert!(outcome.is_ok());
        }
        assert_eq!(http.call_count(), 1);
    }

    #[tokio::test]
    async fn queued_callers_adopt_a_failed_outcome_without_refetching() {
        let http = Arc::new(CountingHttpClient::failing());
        let client = SnapshotFeedClient::new(http.clone(), "https://feed.test/latest.json");

        let (a, b, c) = tokio::join!(client.envelope(), client.envelope(), client.envelope());
        assert!(a.is_err() && b.is_err() && c.is_err());
        assert_eq!(http.call_count(), 1, "queued callers must share the failure");

        // A later caller is not stuck with the stale failure.
        assert!(client.envelope().await.is_err());
        assert_eq!(http.call_count(), 2);
    }

    #[tokio::test]
    async fn extraction_is_a_map_lookup_with_error_markers_surfaced() {
        let http = Arc::new(CountingHttpClient::returning(feed_body()));
        let client = SnapshotFeedClient::new(http, "https://feed.test/latest.json");

        let dams = client
            .fetch(EndpointKey::DamStatus, &FetchParams::none())
            .await
            .expect("dam_status entry exists");
        assert!(dams.is_array());

        let outages = client
            .fetch(EndpointKey::Outages, &FetchParams::none())
            .await
            .expect_err("error-marked entry must fail");
        assert_eq!(
            outages.kind(),
            crate::error::FetchErrorKind::UpstreamDegraded
        );

        let missing = client
            .fetch(EndpointKey::Tariffs, &FetchParams::none())
            .await
            .expect_err("absent entry must fail");
        assert_eq!(missing.kind(), crate::error::FetchErrorKind::NoData);
    }

    #[tokio::test]
    async fn envelope_timestamp_is_parsed_when_present() {
        let http = Arc::new(CountingHttpClient::returning(feed_body()));
        let client = SnapshotFeedClient::new(http, "https://feed.test/latest.json");

        client.envelope().await.expect("fetch succeeds");
        let stamp = client.last_envelope_time().await.expect("timestamp parsed");
        assert_eq!(stamp.year(), 2026);
    }
}
