//! # Conveyor Core
//!
//! Pipeline engine with control-plane telemetry for distributed workers.
//! A pipeline runs a fixed list of named steps over an accumulating
//! key/value context; every run is reported to a central control plane as
//! a process with one task per step.
//!
//! ## Architecture
//!
//! - `pipeline/` - the step runner, progress display, and telemetry middleware
//! - `client` - HTTP client for the control plane behind a swappable trait
//! - `worker/` - registration, heartbeat, and persisted worker identity
//! - `audit` - SQLite run journal written off the caller's path
//! - `config` - TOML worker configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use conveyor_core::{Context, Pipeline, Step};
//!
//! let mut pipeline = Pipeline::from_config(&config)?;
//! pipeline.set_steps(vec![Step::from_fn("resize", "v1.0", resize_batch)])?;
//! let result = pipeline.run(Context::from_value(input).unwrap()).await?;
//! ```

pub mod audit;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod worker;

pub use audit::{AuditEntry, AuditLog, AuditRecord};
pub use client::{ControlPlane, ControlPlaneClient, RegisterRequest, TaskDescriptor, TaskStatus};
pub use config::{ApiConfig, WorkerConfig};
pub use context::{Context, ERROR_KEY};
pub use error::{
    ApiError, ConfigError, ErrorCode, PipelineError, ProcessError, StepError, TaskError,
    TraceFrame,
};
pub use pipeline::{
    Pipeline, ProcessHandle, ProgressMode, ProgressRouter, Step, StepHandler, WorkerState,
};
pub use worker::{
    IdentityStore, LifecycleHandle, LifecyclePhase, WorkerIdentity, WorkerLifecycle,
};
