use hydrant_core::DataService;
use serde_json::json;
use time::format_description::well_known::Rfc3339;

use crate::error::CliError;

use super::CommandResult;

pub async fn run(service: &DataService) -> Result<CommandResult, CliError> {
    let last_update = service
        .last_update_time()
        .await
        .and_then(|instant| instant.format(&Rfc3339).ok());
    let stats = service.cache().get_stats();

    Ok(CommandResult::ok(json!({
        "last_update": last_update,
        "needs_refresh": service.needs_refresh(),
        "cache": stats,
    })))
}
