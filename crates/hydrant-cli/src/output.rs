use serde_json::Value;

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let document = serde_json::json!({
                "data": result.data,
                "warnings": result.warnings,
            });
            let payload = if pretty {
                serde_json::to_string_pretty(&document)?
            } else {
                serde_json::to_string(&document)?
            };
            println!("{payload}");
        }
        OutputFormat::Summary => render_summary(result),
    }
    Ok(())
}

/// Line-oriented rendering for terminals: one line per top-level member,
/// collections shown as counts.
fn render_summary(result: &CommandResult) {
    match &result.data {
        Value::Object(map) => {
            for (key, value) in map {
                println!("{key}: {}", summarize(value));
            }
        }
        other => println!("{}", summarize(other)),
    }
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
}

fn summarize(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("{} records", items.len()),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_else(|_| String::from("{}")),
        Value::Null => String::from("-"),
        other => other.to_string(),
    }
}
