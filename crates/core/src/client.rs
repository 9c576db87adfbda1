//! # Control Plane Client
//!
//! HTTP client for the telemetry control plane. The [`ControlPlane`] trait is
//! the seam the engine and lifecycle talk through, so tests can substitute an
//! in-memory implementation.
//!
//! Endpoint paths and payload shapes are fixed by the control plane's public
//! API and are not configurable.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::{ApiError, ConfigError, ErrorCode};
use crate::worker::identity::WorkerIdentity;

pub(crate) const REGISTER: &str = "/matricula";
pub(crate) const HEALTH_CHECK: &str = "/healthchecker";
pub(crate) const NEW_PROCESS: &str = "/newprocess";
pub(crate) const END_PROCESS: &str = "/endprocess";
pub(crate) const UPDATE_TASK: &str = "/actualizar_task";
pub(crate) const DASHBOARD: &str = "/dashboard_workers";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Wire Types
// ============================================================================

/// One step as advertised to the control plane at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub version: String,
}

/// Worker registration payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub version: String,
    pub tasks: Vec<TaskDescriptor>,
}

/// Health check verdict; anything nonzero counts as healthy.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub health: i64,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.health != 0
    }
}

/// Answer to a process start: the process id plus one task id per step.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessStart {
    pub father: String,
    pub sons: Vec<TaskRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskRef {
    pub id: String,
}

/// Task lifecycle states the control plane tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Start,
    Success,
    Error,
}

/// One task status change.
#[derive(Debug, Clone, Serialize)]
pub struct TaskUpdate {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

// ============================================================================
// Trait
// ============================================================================

/// Calls the engine and lifecycle need from the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Register the worker and its step manifest; returns the assigned identity.
    async fn register_worker(&self, request: &RegisterRequest) -> Result<WorkerIdentity, ApiError>;

    /// Post the persisted identity record for a health verdict.
    async fn health_check(&self, identity: &WorkerIdentity) -> Result<HealthStatus, ApiError>;

    /// Open a process for one run; returns its id and per-step task ids.
    async fn start_process(&self, worker_id: &str) -> Result<ProcessStart, ApiError>;

    /// Close a process. `details` is empty on success, a failure report
    /// otherwise. Returns whether the control plane acknowledged the close.
    async fn end_process(&self, process_id: &str, details: &str) -> Result<bool, ApiError>;

    /// Report a task status change; returns the raw acknowledgement payload.
    async fn update_task(&self, update: &TaskUpdate) -> Result<Value, ApiError>;

    /// Fetch the control plane's registered-worker listing.
    async fn dashboard(&self) -> Result<Value, ApiError>;
}

// ============================================================================
// HTTP Implementation
// ============================================================================

/// [`ControlPlane`] backed by reqwest.
#[derive(Debug)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControlPlaneClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ConfigError::HttpClient(format!("invalid api token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn post_json<B, T>(&self, endpoint: &str, code: ErrorCode, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::call(endpoint, code, e))?
            .error_for_status()
            .map_err(|e| ApiError::call(endpoint, code, e))?;

        response
            .json()
            .await
            .map_err(|e| ApiError::decode(endpoint, code, e))
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    async fn register_worker(&self, request: &RegisterRequest) -> Result<WorkerIdentity, ApiError> {
        tracing::debug!(name = %request.name, tasks = request.tasks.len(), "registering worker");
        self.post_json(REGISTER, ErrorCode::Api, request).await
    }

    async fn health_check(&self, identity: &WorkerIdentity) -> Result<HealthStatus, ApiError> {
        self.post_json(HEALTH_CHECK, ErrorCode::Api, identity).await
    }

    async fn start_process(&self, worker_id: &str) -> Result<ProcessStart, ApiError> {
        let body = json!({ "id": worker_id });
        self.post_json(NEW_PROCESS, ErrorCode::UpdateProcess, &body)
            .await
    }

    async fn end_process(&self, process_id: &str, details: &str) -> Result<bool, ApiError> {
        let body = json!({ "id": process_id, "details": details });
        let answer: Value = self
            .post_json(END_PROCESS, ErrorCode::UpdateProcess, &body)
            .await?;
        Ok(is_truthy(&answer))
    }

    async fn update_task(&self, update: &TaskUpdate) -> Result<Value, ApiError> {
        self.post_json(UPDATE_TASK, ErrorCode::UpdateTask, update)
            .await
    }

    async fn dashboard(&self) -> Result<Value, ApiError> {
        let response = self
            .http
            .get(self.url(DASHBOARD))
            .send()
            .await
            .map_err(|e| ApiError::call(DASHBOARD, ErrorCode::Api, e))?
            .error_for_status()
            .map_err(|e| ApiError::call(DASHBOARD, ErrorCode::Api, e))?;

        response
            .json()
            .await
            .map_err(|e| ApiError::decode(DASHBOARD, ErrorCode::Api, e))
    }
}

/// Python-style truthiness for loosely typed acknowledgement payloads.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

// ============================================================================
// Test Double
// ============================================================================
