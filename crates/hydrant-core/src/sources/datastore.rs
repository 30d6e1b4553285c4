//! Secondary tabular datastore client (CKAN `datastore_search`).
//!
//! Only the endpoints that have a published resource id can be served from
//! here. Records come back as loosely-typed rows with the portal's own
//! column names and stringly numbers, so each endpoint gets a transform
//! into the same shape the primary API produces.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::endpoint::EndpointKey;
use crate::error::FetchError;
use crate::http::{HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::sources::{request_json_with_retry, FetchParams, SourceFetcher};

pub const DEFAULT_DATASTORE_URL: &str =
    "https://data.waterauthority.gov.cy/api/3/action/datastore_search";

const RECORD_LIMIT: u32 = 5_000;

pub struct DatastoreClient {
    http: Arc<dyn HttpClient>,
    search_url: String,
    retry: RetryConfig,
}

impl DatastoreClient {
    pub fn new(http: Arc<dyn HttpClient>, search_url: impl Into<String>) -> Self {
        Self {
            http,
            search_url: search_url.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn search_body(resource_id: &str, params: &FetchParams) -> String {
        let mut body = json!({
            "resource_id": resource_id,
            "limit": RECORD_LIMIT,
        });
        if let Some(year) = params.year {
            body["filters"] = json!({ "year": year });
        }
        body.to_string()
    }

    /// Pulls `result.records` out of the CKAN envelope. The success flag is
    /// already handled upstream as an embedded error marker.
    fn extract_records(value: Value) -> Result<Vec<Value>, FetchError> {
        match value
            .get("result")
            .and_then(|result| result.get("records"))
        {
            Some(Value::Array(records)) => Ok(records.clone()),
            Some(_) => Err(FetchError::parse("datastore records is not an array")),
            None => Err(FetchError::parse(
                "datastore response missing result.records",
            )),
        }
    }

    /// Rewrites one datastore row into the primary API's field names.
    /// Unknown columns are dropped; numeric columns are coerced so stringly
    /// rows never leak to consumers.
    fn transform_record(endpoint: EndpointKey, record: &Map<String, Value>) -> Value {
        match endpoint {
            EndpointKey::DamStatus => json!({
                "name": text(record, &["dam_name", "name"]),
                "current_volume": number(record, &["storage", "current_volume"]),
                "min_capacity": number(record, &["dead_storage", "min_capacity"]),
                "max_capacity": number(record, &["capacity", "max_capacity"]),
                "fill_rate_percent": number(record, &["fill_rate", "fill_rate_percent"]),
                "date": text(record, &["date"]),
            }),
            EndpointKey::DailyProduction => json!({
                "date": text(record, &["date"]),
                "source_name": text(record, &["source", "source_name"]),
                "amount": number(record, &["quantity", "amount"]),
            }),
            EndpointKey::ProductionDistribution => json!({
                "year": integer(record, &["year"]),
                "month": integer(record, &["month"]),
                "source_name": text(record, &["source", "source_name"]),
                "amount": number(record, &["quantity", "amount"]),
            }),
            // No other endpoint has a resource id; pass the row through.
            _ => Value::Object(record.clone()),
        }
    }
}

fn lookup<'a>(record: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| record.get(*name))
}

fn text(record: &Map<String, Value>, names: &[&str]) -> Value {
    match lookup(record, names) {
        Some(Value::String(s)) => Value::String(s.clone()),
        Some(other) if !other.is_null() => Value::String(other.to_string()),
        _ => Value::String(String::new()),
    }
}

/// Numbers arrive as JSON numbers or as strings like `"12,5"`. Anything
/// unparseable becomes 0.0 rather than poisoning the whole payload.
fn coerce_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn number(record: &Map<String, Value>, names: &[&str]) -> Value {
    json!(coerce_f64(lookup(record, names)))
}

fn integer(record: &Map<String, Value>, names: &[&str]) -> Value {
    json!(coerce_f64(lookup(record, names)) as i64)
}

impl SourceFetcher for DatastoreClient {
    fn name(&self) -> &'static str {
        "datastore"
    }

    fn fetch<'a>(
        &'a self,
        endpoint: EndpointKey,
        params: &'a FetchParams,
    ) -> Pin<Box<dyn Future<Output = Result<Value, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(resource_id) = endpoint.resource_id() else {
                return Err(FetchError::no_data(format!(
                    "endpoint {endpoint} has no datastore resource"
                )));
            };

            let request = HttpRequest::post_json(
                self.search_url.clone(),
                Self::search_body(resource_id, params),
            );
            let envelope = request_json_with_retry(&self.http, request, &self.retry).await?;
            let records = Self::extract_records(envelope)?;
            debug!(endpoint = %endpoint, records = records.len(), "datastore rows fetched");

            let rows = records
                .iter()
                .filter_map(Value::as_object)
                .map(|record| Self::transform_record(endpoint, record))
                .collect();
            Ok(Value::Array(rows))
        })
    }
}
