// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config file loading with environment overrides.

use navvy_agent::AgentConfig;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Load the agent config: file (when given), then `NAVVY_*` env
/// overrides on top.
pub fn load(path: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        }
        None => AgentConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut AgentConfig) {
    if let Ok(token) = std::env::var("NAVVY_TOKEN") {
        config.token = token;
    }
    if let Ok(endpoint) = std::env::var("NAVVY_ENDPOINT") {
        config.endpoint = endpoint;
    }
    if let Ok(name) = std::env::var("NAVVY_NAME") {
        config.name = name;
    }
    if let Ok(spawn) = std::env::var("NAVVY_SPAWN") {
        if let Ok(spawn) = spawn.parse() {
            config.spawn = spawn;
        }
    }
}

#[cfg(test)]
#[path = "config_file_tests.rs"]
mod tests;
