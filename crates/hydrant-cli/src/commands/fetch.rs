use hydrant_core::{DataService, EndpointKey, FetchSlot};
use serde::Serialize;
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    service: &DataService,
    args: &FetchArgs,
    refresh: bool,
) -> Result<CommandResult, CliError> {
    if args.all {
        return Ok(fetch_all(service, refresh).await);
    }

    let Some(endpoint) = args.endpoint else {
        return Err(CliError::Command(String::from(
            "name a dataset or pass --all",
        )));
    };

    let year = args
        .year
        .unwrap_or_else(|| OffsetDateTime::now_utc().year());

    let result = match endpoint {
        EndpointKey::Outages => slot_result(endpoint, service.outages(refresh).await)?,
        EndpointKey::DamsAndWells => slot_result(endpoint, service.dams_and_wells(refresh).await)?,
        EndpointKey::DamStatus => slot_result(endpoint, service.dam_status(refresh).await)?,
        EndpointKey::DailyProduction => {
            slot_result(endpoint, service.daily_production(refresh).await)?
        }
        EndpointKey::ProductionDistribution => slot_result(
            endpoint,
            service.production_distribution(year, refresh).await,
        )?,
        EndpointKey::WeeklyAnalysis => {
            slot_result(endpoint, service.weekly_analysis(refresh).await)?
        }
        EndpointKey::DistrictAnalysis => {
            slot_result(endpoint, service.district_analysis(refresh).await)?
        }
        EndpointKey::DamQuality => slot_result(endpoint, service.dam_quality(refresh).await)?,
        EndpointKey::Consumption => slot_result(endpoint, service.consumption(year, refresh).await)?,
        EndpointKey::WaterLosses => slot_result(endpoint, service.water_losses(refresh).await)?,
        EndpointKey::Tariffs => slot_result(endpoint, service.tariffs(refresh).await)?,
    };

    Ok(result)
}

fn slot_result<T: Serialize>(
    endpoint: EndpointKey,
    slot: FetchSlot<Vec<T>>,
) -> Result<CommandResult, CliError> {
    let data = json!({ endpoint.as_str(): serde_json::to_value(&slot.data)? });
    let mut result = CommandResult::ok(data);
    if let Some(error) = slot.error {
        result = result.with_warning(format!("{endpoint}: {error}"));
    }
    Ok(result)
}

async fn fetch_all(service: &DataService, refresh: bool) -> CommandResult {
    let aggregate = service.fetch_all(refresh).await;

    let data = json!({
        "outages": value_of(&aggregate.outages.data),
        "dams-and-wells": value_of(&aggregate.dams_and_wells.data),
        "dam-status": value_of(&aggregate.dam_status.data),
        "daily-production": value_of(&aggregate.daily_production.data),
        "production-distribution": value_of(&aggregate.production_distribution.data),
        "weekly-analysis": value_of(&aggregate.weekly_analysis.data),
        "district-analysis": value_of(&aggregate.district_analysis.data),
        "dam-quality": value_of(&aggregate.dam_quality.data),
    });

    let warnings = aggregate
        .degraded_endpoints()
        .into_iter()
        .map(|endpoint| format!("{endpoint}: every source failed, fallback served"))
        .collect();

    CommandResult::ok(data).with_warnings(warnings)
}

fn value_of<T: Serialize>(records: &[T]) -> Value {
    serde_json::to_value(records).unwrap_or_else(|_| Value::Array(Vec::new()))
}
