//! # Worker Identity
//!
//! The registration record a worker holds between runs, persisted as JSON
//! next to the process. The whole control-plane response is kept, so fields
//! this crate does not know about survive a save/load cycle.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::pipeline::WORKER_ID_MIN_LEN;

/// Registration record assigned by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// When this record was last confirmed against the control plane.
    #[serde(default = "Utc::now")]
    pub update: DateTime<Utc>,
    /// Control-plane fields preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            version: None,
            update: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Whether the id is usable for telemetry.
    pub fn is_valid(&self) -> bool {
        self.id.len() > WORKER_ID_MIN_LEN
    }

    /// The same record with a fresh confirmation stamp.
    pub fn refreshed(mut self) -> Self {
        self.update = Utc::now();
        self
    }
}

/// Durable storage for the registration record.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Load the persisted identity. Unreadable or unparsable files count
    /// as absent.
    pub async fn load(&self) -> Option<WorkerIdentity> {
        let raw = fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Discarding unparsable identity file: {}", e
                );
                None
            }
        }
    }

    pub async fn save(&self, identity: &WorkerIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.ok();
            }
        }
        let content = serde_json::to_string_pretty(identity)?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write identity file {}", self.path.display()))
    }

    /// Remove the persisted record; missing files are fine.
    pub async fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to delete identity file {}", self.path.display())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs as std_fs;

    #[test]
    fn test_identity_validity() {
        assert!(WorkerIdentity::new("worker-123456").is_valid());
        assert!(!WorkerIdentity::new("abc").is_valid());
        assert!(!WorkerIdentity::new("").is_valid());
    }

    #[test]
    fn test_identity_decodes_control_plane_response() {
        let raw = json!({
            "id": "worker-123456",
            "name": "imaging",
            "version": "v1.0",
            "queue": "gpu",
        });
        let identity: WorkerIdentity = serde_json::from_value(raw).unwrap();
        assert_eq!(identity.id, "worker-123456");
        assert_eq!(identity.extra.get("queue"), Some(&json!("gpu")));

        // A response without an id is not an identity.
        assert!(serde_json::from_value::<WorkerIdentity>(json!({"name": "x"})).is_err());
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let path = "test_identity_store.json";
        let _ = std_fs::remove_file(path);

        let store = IdentityStore::new(path);
        assert!(!store.exists().await);
        assert!(store.load().await.is_none());

        let mut identity = WorkerIdentity::new("worker-123456");
        identity.name = Some("imaging".to_string());
        identity.extra.insert("queue".to_string(), json!("gpu"));
        store.save(&identity).await.unwrap();

        assert!(store.exists().await);
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, identity);

        store.delete().await.unwrap();
        assert!(!store.exists().await);
        // Deleting again is not an error.
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_discards_garbage() {
        let path = "test_identity_garbage.json";
        std_fs::write(path, "not json at all").unwrap();

        let store = IdentityStore::new(path);
        assert!(store.load().await.is_none());

        let _ = std_fs::remove_file(path);
    }

    #[test]
    fn test_refreshed_advances_stamp() {
        let identity = WorkerIdentity::new("worker-123456");
        let before = identity.update;
        let refreshed = identity.refreshed();
        assert!(refreshed.update >= before);
    }
}
