/// `load_config` module: reads the static YAML config of the `printpack` binary and injects
/// Graph secrets from the environment.
///
/// The YAML file is the only untrusted input parsed here. Every section is optional and
/// falls back to the defaults of the matching `printpack-core` config type, so a file
/// holding just `database_path` is enough for the commands that never reach the drive.
///
/// # Secrets
/// `GRAPH_TENANT_ID`, `GRAPH_CLIENT_ID`, `GRAPH_CLIENT_SECRET` and `GRAPH_DRIVE_ID`
/// override the YAML values when set and non-empty. Missing secrets are not a load error:
/// the Graph client reports them as a configuration error on first use.
///
/// # Errors
/// Read and parse failures are `anyhow::Error`s carrying the file path.
use anyhow::{Context, Result};
use printpack_core::config::{EngineConfig, GraphConfig, SyncSettings};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub const ENV_TENANT_ID: &str = "GRAPH_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "GRAPH_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GRAPH_CLIENT_SECRET";
pub const ENV_DRIVE_ID: &str = "GRAPH_DRIVE_ID";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("printpack.sqlite3")
}

impl CliConfig {
    pub fn trace_loaded(&self) {
        info!(database_path = ?self.database_path, "Loaded CliConfig");
        self.engine.trace_loaded();
        self.graph.trace_loaded();
        self.sync.trace_loaded();
    }
}

fn env_override(target: &mut String, key: &str) {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            debug!(env = key, "Graph setting taken from environment");
            *target = value.trim().to_string();
        }
        _ => {}
    }
}

/// Loads the YAML config at `path` and applies the environment secret overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to read config file"))
        .with_context(|| format!("Failed to read config file {path_ref:?}"))?;

    let mut config: CliConfig = serde_yaml::from_str(&content)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML"))
        .with_context(|| format!("Failed to parse config YAML {path_ref:?}"))?;

    env_override(&mut config.graph.tenant_id, ENV_TENANT_ID);
    env_override(&mut config.graph.client_id, ENV_CLIENT_ID);
    env_override(&mut config.graph.client_secret, ENV_CLIENT_SECRET);
    env_override(&mut config.graph.drive_id, ENV_DRIVE_ID);

    config.trace_loaded();
    Ok(config)
}
