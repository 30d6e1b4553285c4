use hydrant_core::DataService;

use crate::cli::{SettingsArgs, SettingsCommand, SettingsSetArgs};
use crate::error::CliError;

use super::CommandResult;

pub fn run(service: &DataService, args: &SettingsArgs) -> Result<CommandResult, CliError> {
    match &args.command {
        SettingsCommand::Show => Ok(CommandResult::ok(serde_json::to_value(
            service.cache().get_settings(),
        )?)),
        SettingsCommand::Set(set) => update(service, set),
    }
}

fn update(service: &DataService, set: &SettingsSetArgs) -> Result<CommandResult, CliError> {
    if set.cache_hours.is_none() && set.theme.is_none() && set.accent_color.is_none() {
        return Err(CliError::Command(String::from("nothing to set")));
    }

    let mut settings = service.cache().get_settings();
    if let Some(cache_hours) = set.cache_hours {
        settings.cache_duration_hours = cache_hours;
    }
    if let Some(theme) = &set.theme {
        settings.theme = theme.clone();
    }
    if let Some(accent_color) = &set.accent_color {
        settings.accent_color = accent_color.clone();
    }

    service.cache().save_settings(&settings);
    Ok(CommandResult::ok(serde_json::to_value(settings)?))
}
