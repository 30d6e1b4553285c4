//! Source fetchers: three interchangeable strategies for obtaining one
//! logical endpoint's payload. The data service tries them in priority
//! order (snapshot feed, primary API, secondary datastore).

mod datastore;
mod primary;
mod snapshot;

pub use datastore::{DatastoreClient, DEFAULT_DATASTORE_URL};
pub use primary::{PrimaryApiClient, DEFAULT_API_BASE, DEFAULT_RELAYS};
pub use snapshot::{SnapshotEnvelope, SnapshotFeedClient, DEFAULT_SNAPSHOT_URL};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::endpoint::EndpointKey;
use crate::error::FetchError;
use crate::http::{HttpClient, HttpRequest};
use crate::retry::RetryConfig;

/// Optional request parameters. Currently only a year filter, used by the
/// consumption and distribution datasets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchParams {
    pub year: Option<i32>,
}

impl FetchParams {
    pub const fn none() -> Self {
        Self { year: None }
    }

    pub const fn for_year(year: i32) -> Self {
        Self { year: Some(year) }
    }

    /// Suffix appended to the endpoint's cache slot, e.g. `:2024`.
    pub fn cache_suffix(&self) -> String {
        self.year.map_or_else(String::new, |year| format!(":{year}"))
    }

    /// Query-string form for the primary API.
    pub fn query_string(&self) -> String {
        self.year
            .map_or_else(String::new, |year| format!("?year={year}"))
    }
}

/// One strategy for fetching an endpoint's raw payload.
pub trait SourceFetcher: Send + Sync {
    /// Short name used in logs and fallback diagnostics.
    fn name(&self) -> &'static str;

    fn fetch<'a>(
        &'a self,
        endpoint: EndpointKey,
        params: &'a FetchParams,
    ) -> Pin<Box<dyn Future<Output = Result<Value, FetchError>> + Send + 'a>>;
}

/// A payload counts as usable only if it carries data: not null, not an
/// empty collection, not a wrapper whose arrays are all empty, and free of
/// a server-embedded error marker. A source that "succeeds" with an
/// unusable payload still yields to the next one.
pub fn usable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => {
            if map.is_empty() || embedded_error(value).is_some() {
                return false;
            }
            // `{"rows": []}` is as empty as `[]`.
            !map.values()
                .all(|member| matches!(member, Value::Array(items) if items.is_empty()))
        }
        _ => true,
    }
}

/// Detects upstreams that answer 200 with an error payload. Two shapes are
/// known: an `error` member, and CKAN's `success: false`.
pub fn embedded_error(value: &Value) -> Option<String> {
    let map = value.as_object()?;

    if let Some(error) = map.get("error") {
        return Some(match error {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        });
    }

    if map.get("success").and_then(Value::as_bool) == Some(false) {
        return Some(String::from("upstream reported success=false"));
    }

    None
}

/// Shared request loop: retries retryable failures per the backoff schedule,
/// classifies HTTP statuses, and treats a 2xx body with an embedded error
/// marker as a transient failure under the same budget.
pub(crate) async fn request_json_with_retry(
    http: &Arc<dyn HttpClient>,
    request: HttpRequest,
    retry: &RetryConfig,
) -> Result<Value, FetchError> {
    let mut attempt = 0;
    loop {
        match request_json_once(http, request.clone()).await {
            Ok(value) => return Ok(value),
            Err(error) if error.retryable() && attempt < retry.max_retries => {
                let delay = retry.delay_for_attempt(attempt);
                debug!(
                    url = %request.url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient fetch failure; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

async fn request_json_once(
    http: &Arc<dyn HttpClient>,
    request: HttpRequest,
) -> Result<Value, FetchError> {
    let response = http
        .execute(request)
        .await
        .map_err(|e| FetchError::network(e.message().to_owned()))?;

    if !response.is_success() {
        return Err(FetchError::http_status(response.status));
    }

    let value: Value = serde_json::from_str(&response.body)
        .map_err(|e| FetchError::parse(format!("malformed response body: {e}")))?;

    if let Some(marker) = embedded_error(&value) {
        return Err(FetchError::upstream_degraded(marker));
    }

    Ok(value)
}
