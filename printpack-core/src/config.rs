use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigurationError;

pub const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const DEFAULT_TEMP_DIR: &str = "tmp/print_pack";
pub const DEFAULT_WORK_DIR: &str = "print_pack_sync";

/// Settings of the pack orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directories searched for `{pack}__{doc_type}__{variant}.xlsx` when a document has no
    /// stored template, in order.
    #[serde(default)]
    pub template_dirs: Vec<PathBuf>,
    #[serde(default = "default_conversion_timeout_secs")]
    pub conversion_timeout_secs: u64,
    /// Serve the filled spreadsheets when PDF conversion fails.
    #[serde(default)]
    pub xlsx_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_dirs: Vec::new(),
            conversion_timeout_secs: default_conversion_timeout_secs(),
            xlsx_fallback: false,
        }
    }
}

impl EngineConfig {
    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion_timeout_secs.max(1))
    }

    pub fn trace_loaded(&self) {
        info!(
            template_dirs = self.template_dirs.len(),
            conversion_timeout_secs = self.conversion_timeout_secs,
            xlsx_fallback = self.xlsx_fallback,
            "Loaded EngineConfig"
        );
        debug!(?self, "EngineConfig loaded (full debug)");
    }
}

fn default_conversion_timeout_secs() -> u64 {
    60
}

/// Microsoft Graph settings shared by conversion and upload.
///
/// Secrets are usually empty in the YAML file and injected from the environment.
#[derive(Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: String,
    #[serde(default)]
    pub drive_id: String,
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Drive folder holding the temporary spreadsheets uploaded for conversion.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
    /// Reuse access tokens until shortly before they expire.
    #[serde(default)]
    pub cache_token: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            drive_id: String::new(),
            authority_url: default_authority_url(),
            graph_url: default_graph_url(),
            scope: default_scope(),
            temp_dir: default_temp_dir(),
            cache_token: false,
        }
    }
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("drive_id", &self.drive_id)
            .field("authority_url", &self.authority_url)
            .field("graph_url", &self.graph_url)
            .field("scope", &self.scope)
            .field("temp_dir", &self.temp_dir)
            .field("cache_token", &self.cache_token)
            .finish()
    }
}

impl GraphConfig {
    /// Fails with the names of every missing credential, then the drive id.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let missing: Vec<&str> = [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(ConfigurationError::MissingCredentials(missing.join(", ")));
        }
        if self.drive_id.trim().is_empty() {
            return Err(ConfigurationError::MissingDriveId);
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            graph_url = %self.graph_url,
            temp_dir = %self.temp_dir,
            has_credentials = self.validate().is_ok(),
            cache_token = self.cache_token,
            "Loaded GraphConfig"
        );
        debug!(?self, "GraphConfig loaded (full debug)");
    }
}

fn default_authority_url() -> String {
    DEFAULT_AUTHORITY_URL.to_string()
}

fn default_graph_url() -> String {
    DEFAULT_GRAPH_URL.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_temp_dir() -> String {
    DEFAULT_TEMP_DIR.to_string()
}

/// Defaults for queue runs; command-line flags override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            limit: default_limit(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SyncSettings {
    pub fn trace_loaded(&self) {
        info!(
            work_dir = %self.work_dir,
            limit = self.limit,
            max_attempts = self.max_attempts,
            timeout_secs = self.timeout_secs,
            "Loaded SyncSettings"
        );
    }
}

fn default_work_dir() -> String {
    DEFAULT_WORK_DIR.to_string()
}

fn default_limit() -> usize {
    20
}

fn default_max_attempts() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    30
}
