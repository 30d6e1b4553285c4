use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Logical dataset identifiers. Each key names one cache slot and one fetch
/// route through the source chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKey {
    Outages,
    DamsAndWells,
    DamStatus,
    DailyProduction,
    ProductionDistribution,
    WeeklyAnalysis,
    DistrictAnalysis,
    DamQuality,
    Consumption,
    WaterLosses,
    Tariffs,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown endpoint '{0}'")]
pub struct UnknownEndpoint(pub String);

impl EndpointKey {
    pub const ALL: [Self; 11] = [
        Self::Outages,
        Self::DamsAndWells,
        Self::DamStatus,
        Self::DailyProduction,
        Self::ProductionDistribution,
        Self::WeeklyAnalysis,
        Self::DistrictAnalysis,
        Self::DamQuality,
        Self::Consumption,
        Self::WaterLosses,
        Self::Tariffs,
    ];

    /// The endpoints fetched by `fetch_all` and counted by `needs_refresh`.
    /// Consumption, losses and tariffs are on-demand.
    pub const CORE: [Self; 8] = [
        Self::Outages,
        Self::DamsAndWells,
        Self::DamStatus,
        Self::DailyProduction,
        Self::ProductionDistribution,
        Self::WeeklyAnalysis,
        Self::DistrictAnalysis,
        Self::DamQuality,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Outages => "outages",
            Self::DamsAndWells => "dams-and-wells",
            Self::DamStatus => "dam-status",
            Self::DailyProduction => "daily-production",
            Self::ProductionDistribution => "production-distribution",
            Self::WeeklyAnalysis => "weekly-analysis",
            Self::DistrictAnalysis => "district-analysis",
            Self::DamQuality => "dam-quality",
            Self::Consumption => "consumption",
            Self::WaterLosses => "water-losses",
            Self::Tariffs => "tariffs",
        }
    }

    /// Path segment under the primary API base URL.
    pub const fn api_path(self) -> &'static str {
        match self {
            Self::Outages => "outages",
            Self::DamsAndWells => "dams-wells",
            Self::DamStatus => "dam-status",
            Self::DailyProduction => "daily-production",
            Self::ProductionDistribution => "production-distribution",
            Self::WeeklyAnalysis => "weekly-analysis",
            Self::DistrictAnalysis => "district-analysis",
            Self::DamQuality => "dam-quality",
            Self::Consumption => "consumption",
            Self::WaterLosses => "water-losses",
            Self::Tariffs => "tariffs",
        }
    }

    /// Key under the snapshot-feed envelope's `endpoints` map.
    pub const fn feed_name(self) -> &'static str {
        match self {
            Self::Outages => "outages",
            Self::DamsAndWells => "dams_and_wells",
            Self::DamStatus => "dam_status",
            Self::DailyProduction => "daily_production",
            Self::ProductionDistribution => "production_distribution",
            Self::WeeklyAnalysis => "weekly_analysis",
            Self::DistrictAnalysis => "district_analysis",
            Self::DamQuality => "dam_quality",
            Self::Consumption => "consumption",
            Self::WaterLosses => "water_losses",
            Self::Tariffs => "tariffs",
        }
    }

    /// Resource id in the secondary tabular datastore, where one exists.
    /// Endpoints without one have no tertiary fallback.
    pub const fn resource_id(self) -> Option<&'static str> {
        match self {
            Self::DamStatus => Some("2ae5ab5a-7a16-4e3f-9d46-55388a9a3d6e"),
            Self::DailyProduction => Some("b0d1d2d4-c4de-4b84-9a5b-1e39ef7d9f01"),
            Self::ProductionDistribution => Some("7c2b2f9e-6a77-4a64-8c20-d9f5af1b6b42"),
            _ => None,
        }
    }

    /// Safe empty value handed to consumers when every source fails, so they
    /// never branch on a missing slot.
    pub fn fallback_value(self) -> Value {
        Value::Array(Vec::new())
    }
}

impl Display for EndpointKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKey {
    type Err = UnknownEndpoint;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == needle)
            .ok_or_else(|| UnknownEndpoint(needle))
    }
}
