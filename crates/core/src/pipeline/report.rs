//! # Telemetry Reporting
//!
//! Middleware between the engine and the control plane. [`ProcessReporter`]
//! opens and closes the process that surrounds one run; [`TaskReporter`]
//! emits per-step status events. Reporting failures are logged and swallowed
//! unless strict mode asks for escalation, and a failing step's own error
//! always wins over a reporting error.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::client::{ControlPlane, TaskStatus, TaskUpdate};
use crate::error::{ApiError, ConfigError, PipelineError, ProcessError, TaskError};

/// Worker ids must be longer than this to bind.
pub const WORKER_ID_MIN_LEN: usize = 5;

// ============================================================================
// Worker State
// ============================================================================

/// Worker identity shared between the engine and the lifecycle task.
#[derive(Debug, Default)]
pub struct WorkerState {
    id: RwLock<Option<String>>,
    name: RwLock<Option<String>>,
    telemetry: AtomicBool,
}

impl WorkerState {
    pub fn id(&self) -> Option<String> {
        self.id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn name(&self) -> Option<String> {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = Some(name.into());
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry.load(Ordering::SeqCst)
    }

    /// Bind a validated worker id. Telemetry flips on the first time a valid
    /// id lands while a control-plane client is configured.
    pub(crate) fn set_id(&self, id: &str, has_control: bool) -> Result<(), ConfigError> {
        if id.len() <= WORKER_ID_MIN_LEN {
            return Err(ConfigError::InvalidWorkerId {
                id: id.to_string(),
                min: WORKER_ID_MIN_LEN,
            });
        }

        let mut guard = self.id.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(id.to_string());
        if has_control && !self.telemetry.swap(true, Ordering::SeqCst) {
            tracing::info!(worker_id = %id, "Worker id bound, telemetry enabled");
        }
        Ok(())
    }

    /// Forget the worker id and stop reporting until a new id is bound.
    pub(crate) fn clear(&self) {
        *self.id.write().unwrap_or_else(PoisonError::into_inner) = None;
        if self.telemetry.swap(false, Ordering::SeqCst) {
            tracing::info!("Worker id cleared, telemetry disabled");
        }
    }
}

// ============================================================================
// Process Reporting
// ============================================================================

/// Remote ids bound to one run by a successful process start.
#[derive(Debug, Clone, Default)]
pub struct ProcessHandle {
    pub process_id: Option<String>,
    pub task_ids: Vec<String>,
}

impl ProcessHandle {
    /// Task id for a step position; empty when the run is unbound.
    pub fn task_id(&self, index: usize) -> &str {
        self.task_ids.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn is_bound(&self) -> bool {
        self.process_id.is_some()
    }
}

/// Opens and closes the control-plane process around one run.
pub(crate) struct ProcessReporter<'a> {
    control: Option<&'a dyn ControlPlane>,
    worker: &'a WorkerState,
    strict: bool,
}

impl<'a> ProcessReporter<'a> {
    pub fn new(control: Option<&'a dyn ControlPlane>, worker: &'a WorkerState, strict: bool) -> Self {
        Self {
            control,
            worker,
            strict,
        }
    }

    pub fn task_reporter(&self) -> TaskReporter<'a> {
        TaskReporter {
            control: self.control,
            strict: self.strict,
        }
    }

    /// Open a process for a run of `configured_steps` steps. Runs without a
    /// client, a bound worker id, or enabled telemetry stay unreported. A
    /// task-id count that disagrees with the step count always fails the run.
    pub async fn start(&self, configured_steps: usize) -> Result<ProcessHandle, PipelineError> {
        let Some(control) = self.control else {
            return Ok(ProcessHandle::default());
        };
        if !self.worker.telemetry_enabled() {
            return Ok(ProcessHandle::default());
        }
        let Some(worker_id) = self.worker.id() else {
            return Ok(ProcessHandle::default());
        };

        match control.start_process(&worker_id).await {
            Ok(start) => {
                if start.sons.len() != configured_steps {
                    return Err(ConfigError::TaskCountMismatch {
                        returned: start.sons.len(),
                        configured: configured_steps,
                    }
                    .into());
                }
                tracing::info!(process_id = %start.father, "Process started");
                Ok(ProcessHandle {
                    process_id: Some(start.father),
                    task_ids: start.sons.into_iter().map(|son| son.id).collect(),
                })
            }
            Err(e) => {
                tracing::warn!("Process start failed, run continues unreported: {}", e);
                if self.strict {
                    Err(e.into())
                } else {
                    Ok(ProcessHandle::default())
                }
            }
        }
    }

    /// Close a successful run's process with empty details.
    pub async fn finish(&self, handle: &ProcessHandle) -> Result<(), PipelineError> {
        let (Some(control), Some(process_id)) = (self.control, handle.process_id.as_deref())
        else {
            return Ok(());
        };

        match control.end_process(process_id, "").await {
            Ok(true) => {
                tracing::info!(process_id, "Process ended");
                Ok(())
            }
            Ok(false) => {
                tracing::warn!(process_id, "Control plane rejected process end");
                if self.strict {
                    Err(ApiError::EndRejected {
                        process_id: process_id.to_string(),
                    }
                    .into())
                } else {
                    Ok(())
                }
            }
            Err(e) => {
                tracing::warn!(process_id, "Process end failed: {}", e);
                if self.strict {
                    Err(e.into())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Enrich a task failure with run identity and report the failed end.
    /// Reporting problems are logged only; the task failure stays primary.
    pub async fn fail(&self, handle: &ProcessHandle, task: TaskError) -> ProcessError {
        let failure = ProcessError {
            process_id: handle.process_id.clone(),
            worker_id: self.worker.id(),
            worker_name: self.worker.name(),
            source: task,
        };

        if let (Some(control), Some(process_id)) = (self.control, handle.process_id.as_deref()) {
            let details = failure.details().to_string();
            match control.end_process(process_id, &details).await {
                Ok(true) => tracing::info!(process_id, "Process ended with failure details"),
                Ok(false) => tracing::warn!(process_id, "Control plane rejected failed process end"),
                Err(e) => tracing::warn!(process_id, "Failed process end not delivered: {}", e),
            }
        }
        failure
    }
}

// ============================================================================
// Task Reporting
// ============================================================================

/// Emits task status events for the steps of one run.
pub(crate) struct TaskReporter<'a> {
    control: Option<&'a dyn ControlPlane>,
    strict: bool,
}

impl TaskReporter<'_> {
    async fn send(
        &self,
        task_id: &str,
        status: TaskStatus,
        details: Option<Value>,
    ) -> Result<(), ApiError> {
        let Some(control) = self.control else {
            return Ok(());
        };
        if task_id.is_empty() {
            return Ok(());
        }

        let update = TaskUpdate {
            task_id: task_id.to_string(),
            status,
            details,
        };
        match control.update_task(&update).await {
            Ok(answer) => {
                tracing::debug!(task_id, status = ?status, %answer, "Task update delivered");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(task_id, status = ?status, "Task update failed: {}", e);
                Err(e)
            }
        }
    }

    /// Start and success events; escalates delivery failures in strict mode.
    pub async fn emit(
        &self,
        task_id: &str,
        status: TaskStatus,
        details: Option<Value>,
    ) -> Result<(), ApiError> {
        match self.send(task_id, status, details).await {
            Err(e) if self.strict => Err(e),
            _ => Ok(()),
        }
    }

    /// Error events; never escalates so the step failure stays primary.
    pub async fn emit_lenient(&self, task_id: &str, status: TaskStatus, details: Option<Value>) {
        let _ = self.send(task_id, status, details).await;
    }
}
