use hydrant_core::DataService;
use serde_json::json;

use crate::cli::{CacheArgs, CacheCommand};
use crate::error::CliError;

use super::CommandResult;

pub fn run(service: &DataService, args: &CacheArgs) -> Result<CommandResult, CliError> {
    match args.command {
        CacheCommand::Stats => Ok(CommandResult::ok(serde_json::to_value(
            service.cache().get_stats(),
        )?)),
        CacheCommand::Clear => {
            let before = service.cache().get_stats().entry_count;
            service.cache().clear_all();
            Ok(CommandResult::ok(json!({ "cleared_entries": before })))
        }
    }
}
