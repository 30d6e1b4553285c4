//! Read-only reference documents fetched once at startup: the location
//! gazetteer used to place measurements on a map, and the monthly history
//! ledger behind the long-term trend display.
//!
//! Both degrade to empty when the fetch or parse fails; reference data is
//! never worth failing startup over.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::DamStatusRecord;
use crate::http::{HttpClient, HttpRequest};

pub const DEFAULT_REFERENCE_URL: &str =
    "https://snapshots.waterauthority.gov.cy/reference.json";

/// The ledger keeps the trailing two years of monthly summaries.
pub const HISTORY_CAPACITY: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Aggregate reservoir figures for one collected month, as the collector
/// writes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    #[serde(default)]
    pub total_current_volume: f64,
    #[serde(default)]
    pub total_max_capacity: f64,
    #[serde(default)]
    pub total_min_capacity: f64,
    #[serde(default)]
    pub usable_water: f64,
    #[serde(default)]
    pub usable_capacity: f64,
    #[serde(default)]
    pub average_fill_rate_percent: f64,
}

/// One entry in the history ledger. A standalone collection job appends
/// these monthly; this side only reads them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    /// Collection date, ISO `YYYY-MM-DD`. Lexicographic order is
    /// chronological order.
    pub date: String,
    #[serde(default)]
    pub summary: HistorySummary,
    /// Per-dam snapshot taken alongside the summary.
    #[serde(default)]
    pub dams: Vec<DamStatusRecord>,
    /// Production figures captured with the entry, kept verbatim.
    #[serde(default)]
    pub production: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceData {
    locations: HashMap<String, Coordinates>,
    history: Vec<HistoryEntry>,
}

impl ReferenceData {
    /// Fetches the reference document once. Any failure yields the empty
    /// document so the rest of the system keeps working without map pins
    /// or trend history.
    pub async fn load(http: &dyn HttpClient, url: &str) -> Self {
        let response = match http.execute(HttpRequest::get(url)).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                warn!(url, status = response.status, "reference fetch rejected");
                return Self::default();
            }
            Err(error) => {
                warn!(url, error = %error, "reference fetch failed");
                return Self::default();
            }
        };

        match serde_json::from_str::<Value>(&response.body) {
            Ok(value) => Self::from_value(&value),
            Err(error) => {
                warn!(url, error = %error, "reference document is not JSON");
                Self::default()
            }
        }
    }

    /// Parses `{locations: {name: {lat, lon}}, history: [entries]}`.
    /// Unparseable members are dropped individually.
    pub fn from_value(value: &Value) -> Self {
        let locations = value
            .get("locations")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(name, coords)| {
                        match serde_json::from_value::<Coordinates>(coords.clone()) {
                            Ok(coords) => Some((name.clone(), coords)),
                            Err(error) => {
                                debug!(name, error = %error, "dropping malformed location");
                                None
                            }
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut history: Vec<HistoryEntry> = value
            .get("history")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        // Newest first, capped at two years.
        history.sort_by(|a, b| b.date.cmp(&a.date));
        history.truncate(HISTORY_CAPACITY);

        Self { locations, history }
    }

    pub fn coordinates(&self, name: &str) -> Option<Coordinates> {
        self.locations.get(name).copied()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// Monthly summaries, newest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.history.first()
    }

    /// Highest total stored volume seen in the retained window. Trend
    /// display scales against this.
    pub fn historical_max_storage(&self) -> Option<f64> {
        self.history
            .iter()
            .map(|entry| entry.summary.total_current_volume)
            .fold(None, |max, value| match max {
                Some(current) if current >= value => Some(current),
                _ => Some(value),
            })
    }
}
