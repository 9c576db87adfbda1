//! # Worker Configuration
//!
//! TOML-backed settings for a worker process. Every key has a default so a
//! partial (or absent) file still yields a usable configuration:
//!
//! ```toml
//! name = "imaging_worker"
//! version = "v1.0"
//! pipeline_use = true
//! pipeline_server = "http://localhost:8418"
//! pipeline_token_server = "mysecrettoken"
//! worker_id_file = "worker_id.json"
//! audit_db_name = "audit.db"
//! ```

use serde::Deserialize;
use std::path::Path;
use tokio::fs;

use crate::error::ConfigError;

/// Control-plane connection settings handed to the HTTP client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
}

/// Settings for one worker process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker name advertised at registration.
    pub name: String,
    /// Worker version advertised at registration.
    pub version: String,
    /// Reserved for a message-broker integration; not read by the engine.
    pub broker_server: Option<String>,
    /// Where the registration record is persisted between runs.
    pub worker_id_file: String,
    /// Master switch for control-plane telemetry.
    pub pipeline_use: bool,
    /// Base URL of the control plane.
    pub pipeline_server: String,
    /// Bearer token for control-plane calls.
    pub pipeline_token_server: Option<String>,
    /// SQLite file for the audit log; `None` disables auditing.
    pub audit_db_name: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            version: "v0.1".to_string(),
            broker_server: None,
            worker_id_file: "worker_id.json".to_string(),
            pipeline_use: false,
            pipeline_server: "http://localhost:8418".to_string(),
            pipeline_token_server: None,
            audit_db_name: None,
        }
    }
}

impl WorkerConfig {
    /// Load from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Control-plane settings, present only when telemetry is switched on.
    pub fn api_config(&self) -> Option<ApiConfig> {
        self.pipeline_use.then(|| ApiConfig {
            base_url: self.pipeline_server.clone(),
            token: self.pipeline_token_server.clone(),
        })
    }
}
