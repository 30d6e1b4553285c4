mod cache;
mod countdown;
mod fetch;
mod settings;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use hydrant_core::{DataService, FileStorage};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let service = build_service(cli);
    match &cli.command {
        Command::Fetch(args) => fetch::run(&service, args, cli.refresh).await,
        Command::Status => status::run(&service).await,
        Command::Cache(args) => cache::run(&service, args),
        Command::Settings(args) => settings::run(&service, args),
        Command::Countdown(args) => countdown::run(args).await,
    }
}

fn build_service(cli: &Cli) -> DataService {
    let path = cli
        .cache_file
        .clone()
        .or_else(|| std::env::var_os("HYDRANT_CACHE_FILE").map(PathBuf::from))
        .unwrap_or_else(|| std::env::temp_dir().join("hydrant-cache.json"));

    let mut builder = DataService::builder().with_storage(Arc::new(FileStorage::new(path)));
    if cli.relay {
        builder = builder.with_relay_mode(true);
    }
    builder.build()
}
