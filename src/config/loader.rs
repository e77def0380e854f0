// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::cli::CliArgs;
use crate::config::Settings;
use crate::config::model::AgentConfigFile;
use crate::errors::Result;
use crate::model::LocalTaskDescriptor;

/// Load a configuration file from a given path.
///
/// This only performs TOML deserialization; it does **not** merge CLI flags
/// or validate. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<AgentConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: AgentConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load the config file named by `--config` (if any), merge the CLI flags
/// over it and validate the result.
///
/// This is the recommended entry point for the rest of the application.
pub fn load_and_validate(args: &CliArgs) -> Result<Settings> {
    let file = match &args.config {
        Some(path) => load_from_path(path)?,
        None => AgentConfigFile::default(),
    };
    Settings::resolve(file, args)
}

/// Read the local task descriptor used for offline bootstrapping.
pub fn load_local_task(path: impl AsRef<Path>) -> Result<LocalTaskDescriptor> {
    let contents = fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&contents)?)
}
