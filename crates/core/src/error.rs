//! # Error Taxonomy
//!
//! Layered failure types for the pipeline engine:
//!
//! - [`StepError`] - raised inside a step body, carries location frames
//! - [`TaskError`] - a step failure bound to its task name and remote id
//! - [`ProcessError`] - a task failure enriched with process and worker identity
//! - [`ApiError`] - control-plane call failures with dashboard codes
//! - [`ConfigError`] - invalid configuration or step wiring
//!
//! [`PipelineError`] is the umbrella returned by `Pipeline::run`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Dashboard Codes
// ============================================================================

/// Numeric failure codes the control-plane dashboard files errors under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Generic control-plane call failure.
    Api = 501,
    /// A step body raised.
    TaskFailed = 502,
    /// The control plane acknowledged a process end with a falsy payload.
    EndProcessRejected = 503,
    /// Starting or ending a process failed.
    UpdateProcess = 504,
    /// A task status update failed.
    UpdateTask = 505,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

// ============================================================================
// Step Failures
// ============================================================================

/// One source location on a step failure's path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
}

/// Failure raised inside a step body.
///
/// Use [`crate::step_error!`] to capture the raising location as a frame.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepError {
    pub message: String,
    pub frames: Vec<TraceFrame>,
}

impl StepError {
    /// Failure without location frames.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// Failure with a single explicit frame.
    pub fn with_frame(
        message: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        function: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            frames: vec![TraceFrame {
                file: file.into(),
                line,
                function: function.into(),
            }],
        }
    }
}

/// Build a [`StepError`] that records the raising file, line, and module.
#[macro_export]
macro_rules! step_error {
    ($($arg:tt)*) => {
        $crate::error::StepError::with_frame(
            format!($($arg)*),
            file!(),
            line!(),
            module_path!(),
        )
    };
}

// ============================================================================
// Task and Process Failures
// ============================================================================

/// A step failure bound to the task that raised it.
#[derive(Debug, Clone, Error)]
#[error("[task] [{task_name}] failed: [{message}]")]
pub struct TaskError {
    pub task_name: String,
    pub task_id: String,
    pub message: String,
    pub frames: Vec<TraceFrame>,
}

impl TaskError {
    /// A hard failure: the step body returned an error.
    pub fn from_step(task_name: impl Into<String>, task_id: impl Into<String>, err: StepError) -> Self {
        Self {
            task_name: task_name.into(),
            task_id: task_id.into(),
            message: err.message,
            frames: err.frames,
        }
    }

    /// A soft failure: the step completed but left an error marker in the context.
    pub fn halted(task_name: impl Into<String>, task_id: impl Into<String>, marker: &Value) -> Self {
        Self {
            task_name: task_name.into(),
            task_id: task_id.into(),
            message: format!("halting the pipeline: {}", marker_text(marker)),
            frames: Vec::new(),
        }
    }
}

/// Render a context error marker without quoting plain strings.
fn marker_text(marker: &Value) -> String {
    match marker {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A failed pipeline run, enriched with process and worker identity.
#[derive(Debug, Clone, Error)]
#[error("[pipeline] {source}")]
pub struct ProcessError {
    pub process_id: Option<String>,
    pub worker_id: Option<String>,
    pub worker_name: Option<String>,
    #[source]
    pub source: TaskError,
}

impl ProcessError {
    /// Structured failure report sent to the control plane as process end details.
    pub fn details(&self) -> Value {
        json!({
            "process_id": self.process_id,
            "worker_id": self.worker_id,
            "worker_name": self.worker_name,
            "task_name": self.source.task_name,
            "task_id": self.source.task_id,
            "message": self.source.message,
            "frames": self.source.frames,
        })
    }
}

// ============================================================================
// Control-Plane Failures
// ============================================================================

/// A control-plane call that did not produce a usable answer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request failed in transport or came back with an error status.
    #[error("control plane call {endpoint} failed: {source}")]
    Call {
        endpoint: String,
        code: ErrorCode,
        source: reqwest::Error,
    },

    /// The response arrived but its payload did not decode.
    #[error("control plane call {endpoint} returned an undecodable payload: {source}")]
    Decode {
        endpoint: String,
        code: ErrorCode,
        source: reqwest::Error,
    },

    /// The control plane refused to close the process.
    #[error("control plane rejected process end for {process_id}")]
    EndRejected { process_id: String },
}

impl ApiError {
    pub fn call(endpoint: impl Into<String>, code: ErrorCode, source: reqwest::Error) -> Self {
        Self::Call {
            endpoint: endpoint.into(),
            code,
            source,
        }
    }

    pub fn decode(endpoint: impl Into<String>, code: ErrorCode, source: reqwest::Error) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            code,
            source,
        }
    }

    /// The dashboard code this failure is filed under.
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Call { code, .. } | ApiError::Decode { code, .. } => *code,
            ApiError::EndRejected { .. } => ErrorCode::EndProcessRejected,
        }
    }
}

// ============================================================================
// Configuration Failures
// ============================================================================

/// Invalid worker configuration or step wiring.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("no steps configured")]
    NoSteps,

    #[error("step {index} has an empty name")]
    UnnamedStep { index: usize },

    #[error("worker id {id:?} is not valid: ids must be longer than {min} characters")]
    InvalidWorkerId { id: String, min: usize },

    #[error("control plane returned {returned} task ids for {configured} configured steps")]
    TaskCountMismatch { returned: usize, configured: usize },

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

// ============================================================================
// Umbrella
// ============================================================================

/// Anything `Pipeline::run` can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}
