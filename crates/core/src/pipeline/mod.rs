//! # Pipeline Engine
//!
//! Sequential step runner with control-plane telemetry.
//!
//! ## Run Flow
//!
//! ```text
//! run(initial)
//!   ├── process start (bind process id + per-step task ids)
//!   ├── per step: merge initial → start event → call handler
//!   │             → success event → merge delta → halt-marker check
//!   └── process end (empty details on success, failure report otherwise)
//! ```
//!
//! A pipeline is itself a [`StepHandler`], so a whole pipeline can be mounted
//! as a single step of another pipeline.

pub mod progress;
pub mod report;

pub use progress::{ProgressMode, ProgressRouter};
pub use report::{ProcessHandle, WorkerState, WORKER_ID_MIN_LEN};

use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

use crate::client::{ControlPlane, ControlPlaneClient, TaskDescriptor, TaskStatus};
use crate::config::WorkerConfig;
use crate::context::Context;
use crate::error::{ApiError, ConfigError, PipelineError, StepError, TaskError};
use progress::ProgressScope;
use report::{ProcessReporter, TaskReporter};

// ============================================================================
// Steps
// ============================================================================

/// Work that can run as one pipeline step.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Produce a delta to merge into the run context. The router is threaded
    /// through so nested pipelines share the caller's progress display.
    async fn call(&self, input: &Context, progress: &ProgressRouter) -> Result<Context, StepError>;
}

/// A named, versioned unit of work.
#[derive(Clone)]
pub struct Step {
    pub name: String,
    pub version: String,
    handler: Arc<dyn StepHandler>,
}

impl Step {
    /// Step from a plain synchronous function.
    pub fn from_fn<F>(name: impl Into<String>, version: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Context) -> Result<Context, StepError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            version: version.into(),
            handler: Arc::new(FnStep(f)),
        }
    }

    /// Step from any handler, e.g. a nested [`Pipeline`].
    pub fn from_handler(
        name: impl Into<String>,
        version: impl Into<String>,
        handler: Arc<dyn StepHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            handler,
        }
    }

    /// The step as advertised to the control plane.
    pub fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

/// Adapter so plain functions satisfy [`StepHandler`].
struct FnStep<F>(F);

#[async_trait]
impl<F> StepHandler for FnStep<F>
where
    F: Fn(&Context) -> Result<Context, StepError> + Send + Sync,
{
    async fn call(&self, input: &Context, _progress: &ProgressRouter) -> Result<Context, StepError> {
        (self.0)(input)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Why a run stopped early.
enum RunFailure {
    Task(TaskError),
    Api(ApiError),
}

impl From<ApiError> for RunFailure {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

/// Sequential step runner with control-plane telemetry.
pub struct Pipeline {
    steps: Vec<Step>,
    control: Option<Arc<dyn ControlPlane>>,
    worker: Arc<WorkerState>,
    progress: ProgressRouter,
    strict: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            control: None,
            worker: Arc::new(WorkerState::default()),
            progress: ProgressRouter::stderr(),
            strict: false,
        }
    }

    /// Engine wired from worker configuration: a control-plane client when
    /// telemetry is switched on, and the worker name for failure reports.
    pub fn from_config(config: &WorkerConfig) -> Result<Self, ConfigError> {
        let mut pipeline = Self::new().with_worker_name(&config.name);
        if let Some(api) = config.api_config() {
            pipeline = pipeline.with_control(Arc::new(ControlPlaneClient::new(&api)?));
        }
        Ok(pipeline)
    }

    pub fn with_control(mut self, control: Arc<dyn ControlPlane>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_progress(mut self, progress: ProgressRouter) -> Self {
        self.progress = progress;
        self
    }

    /// Escalate telemetry delivery failures instead of logging them away.
    pub fn with_strict_api_errors(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_worker_name(self, name: impl Into<String>) -> Self {
        self.worker.set_name(name);
        self
    }

    /// Replace the step list wholesale. Validated here so a bad list never
    /// reaches a run.
    pub fn set_steps(&mut self, steps: Vec<Step>) -> Result<(), ConfigError> {
        for (index, step) in steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(ConfigError::UnnamedStep { index });
            }
        }
        self.steps = steps;
        Ok(())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The step list as advertised to the control plane at registration.
    pub fn manifest(&self) -> Vec<TaskDescriptor> {
        self.steps.iter().map(Step::descriptor).collect()
    }

    /// Identity shared with the lifecycle task.
    pub fn worker_state(&self) -> Arc<WorkerState> {
        Arc::clone(&self.worker)
    }

    /// The configured control-plane client, if any.
    pub fn control(&self) -> Option<Arc<dyn ControlPlane>> {
        self.control.clone()
    }

    /// Bind a worker id for telemetry. Rejects ids that are too short.
    pub fn set_worker_id(&self, id: &str) -> Result<(), ConfigError> {
        self.worker.set_id(id, self.control.is_some())
    }

    pub fn clear_worker_id(&self) {
        self.worker.clear()
    }

    /// Run the pipeline once over `initial`, returning the accumulated
    /// context of every step's output.
    pub async fn run(&self, initial: Context) -> Result<Context, PipelineError> {
        self.run_with(initial, &self.progress).await
    }

    async fn run_with(
        &self,
        initial: Context,
        progress: &ProgressRouter,
    ) -> Result<Context, PipelineError> {
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps.into());
        }

        let reporter = ProcessReporter::new(self.control.as_deref(), &self.worker, self.strict);
        let handle = reporter.start(self.steps.len()).await?;
        let tasks = reporter.task_reporter();

        let mut scope = progress.acquire("pipeline", self.steps.len());
        let mut data = Context::new();
        let outcome = self
            .execute(&initial, &mut data, &handle, &tasks, &mut scope, progress)
            .await;
        drop(scope);

        match outcome {
            Ok(()) => {
                reporter.finish(&handle).await?;
                Ok(data)
            }
            Err(RunFailure::Task(task)) => {
                let failure = reporter.fail(&handle, task).await;
                tracing::error!("{}", failure);
                Err(failure.into())
            }
            Err(RunFailure::Api(api)) => Err(api.into()),
        }
    }

    async fn execute(
        &self,
        initial: &Context,
        data: &mut Context,
        handle: &ProcessHandle,
        tasks: &TaskReporter<'_>,
        scope: &mut ProgressScope,
        progress: &ProgressRouter,
    ) -> Result<(), RunFailure> {
        for (index, step) in self.steps.iter().enumerate() {
            // The caller's input is folded back in before every step, so
            // later steps see the original keys even when an earlier step
            // shadowed them.
            data.merge(initial);

            let task_id = handle.task_id(index);
            tasks.emit(task_id, TaskStatus::Start, None).await?;
            tracing::debug!(step = %step.name, index, "Step started");

            match step.handler.call(data, progress).await {
                Ok(delta) => {
                    tasks.emit(task_id, TaskStatus::Success, None).await?;
                    data.merge(&delta);
                    scope.advance(&step.name);

                    if let Some(marker) = data.error_value() {
                        tracing::warn!(step = %step.name, "Step left an error marker, halting");
                        return Err(RunFailure::Task(TaskError::halted(
                            &step.name, task_id, marker,
                        )));
                    }
                }
                Err(step_err) => {
                    let details = json!({
                        "message": step_err.message,
                        "frames": step_err.frames,
                    });
                    tasks
                        .emit_lenient(task_id, TaskStatus::Error, Some(details))
                        .await;
                    tracing::error!(step = %step.name, "Step failed: {}", step_err);
                    return Err(RunFailure::Task(TaskError::from_step(
                        &step.name, task_id, step_err,
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// A pipeline mounted as a single step of an outer pipeline. The inner run
/// reuses the outer progress router, and an inner failure surfaces as one
/// step failure carrying the inner error's frames.
#[async_trait]
impl StepHandler for Pipeline {
    async fn call(&self, input: &Context, progress: &ProgressRouter) -> Result<Context, StepError> {
        self.run_with(input.clone(), progress).await.map_err(|e| {
            let frames = match &e {
                PipelineError::Process(failure) => failure.source.frames.clone(),
                _ => Vec::new(),
            };
            StepError {
                message: e.to_string(),
                frames,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockCall, MockControlPlane};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quiet() -> ProgressRouter {
        ProgressRouter::with_interactive(false)
    }

    fn ctx(value: serde_json::Value) -> Context {
        Context::from_value(value).unwrap()
    }

    /// The three-step chain used across these tests:
    /// x -> x1 = x + 1 -> x2 = x1 + 1 -> x3 = x1 + x2.
    fn chain_steps() -> Vec<Step> {
        vec![
            Step::from_fn("first", "v1.0", |data| {
                let x: i64 = data.require("x")?;
                let mut out = Context::new();
                out.insert("x1", json!(x + 1));
                Ok(out)
            }),
            Step::from_fn("second", "v1.0", |data| {
                let x1: i64 = data.require("x1")?;
                let mut out = Context::new();
                out.insert("x2", json!(x1 + 1));
                Ok(out)
            }),
            Step::from_fn("third", "v1.0", |data| {
                let x1: i64 = data.require("x1")?;
                let x2: i64 = data.require("x2")?;
                let mut out = Context::new();
                out.insert("x3", json!(x1 + x2));
                Ok(out)
            }),
        ]
    }

    fn plain_pipeline(steps: Vec<Step>) -> Pipeline {
        let mut pipeline = Pipeline::new().with_progress(quiet());
        pipeline.set_steps(steps).unwrap();
        pipeline
    }

    /// A step that counts its invocations.
    fn counting_step(name: &str, counter: Arc<AtomicUsize>) -> Step {
        Step::from_fn(name, "v1.0", move |_data| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Context::new())
        })
    }

    #[tokio::test]
    async fn test_run_accumulates_step_outputs() {
        let pipeline = plain_pipeline(chain_steps());
        let result = pipeline.run(ctx(json!({"x": 5}))).await.unwrap();
        assert_eq!(
            result.to_value(),
            json!({"x": 5, "x1": 6, "x2": 7, "x3": 13})
        );
    }

    #[tokio::test]
    async fn test_run_without_steps_is_rejected() {
        let pipeline = Pipeline::new().with_progress(quiet());
        let err = pipeline.run(ctx(json!({"x": 5}))).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::NoSteps)
        ));
    }

    #[tokio::test]
    async fn test_initial_input_reappears_after_shadowing() {
        let shadow = Step::from_fn("shadow", "v1.0", |_data| {
            let mut out = Context::new();
            out.insert("x", json!(100));
            Ok(out)
        });
        let probe = Step::from_fn("probe", "v1.0", |data| {
            let x: i64 = data.require("x")?;
            let mut out = Context::new();
            out.insert("seen_x", json!(x));
            Ok(out)
        });

        let pipeline = plain_pipeline(vec![shadow.clone(), probe]);
        let result = pipeline.run(ctx(json!({"x": 5}))).await.unwrap();
        // The original value is folded back in before the second step.
        assert_eq!(result.get("seen_x"), Some(&json!(5)));
        assert_eq!(result.get("x"), Some(&json!(5)));

        // With no step after it, the shadowing write survives.
        let single = plain_pipeline(vec![shadow]);
        let result = single.run(ctx(json!({"x": 5}))).await.unwrap();
        assert_eq!(result.get("x"), Some(&json!(100)));
    }

    #[tokio::test]
    async fn test_failed_step_stops_the_run() {
        let ran_third = Arc::new(AtomicUsize::new(0));
        let mut steps = chain_steps();
        steps[1] = Step::from_fn("second", "v1.0", |data| {
            let nope: i64 = data.require("nope")?;
            let mut out = Context::new();
            out.insert("x2", json!(nope));
            Ok(out)
        });
        steps[2] = counting_step("third", Arc::clone(&ran_third));

        let pipeline = plain_pipeline(steps);
        let err = pipeline.run(ctx(json!({"x": 5}))).await.unwrap_err();

        let PipelineError::Process(failure) = err else {
            panic!("expected a process failure");
        };
        assert_eq!(failure.source.task_name, "second");
        assert!(failure.source.message.contains("missing key \"nope\""));
        assert_eq!(ran_third.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_marker_halts_after_merge() {
        let ran_third = Arc::new(AtomicUsize::new(0));
        let steps = vec![
            chain_steps().remove(0),
            Step::from_fn("flagging", "v1.0", |_data| {
                let mut out = Context::new();
                out.insert("error", json!("bad batch"));
                out.insert("partial", json!(1));
                Ok(out)
            }),
            counting_step("third", Arc::clone(&ran_third)),
        ];

        let pipeline = plain_pipeline(steps);
        let err = pipeline.run(ctx(json!({"x": 5}))).await.unwrap_err();

        let PipelineError::Process(failure) = err else {
            panic!("expected a process failure");
        };
        assert_eq!(failure.source.task_name, "flagging");
        assert!(failure.source.message.contains("bad batch"));
        assert_eq!(ran_third.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_telemetry_event_sequence() {
        let mock = MockControlPlane::new(3);
        let mut pipeline = Pipeline::new()
            .with_control(mock.clone())
            .with_progress(quiet());
        pipeline.set_steps(chain_steps()).unwrap();
        pipeline.set_worker_id("worker-123456").unwrap();

        pipeline.run(ctx(json!({"x": 5}))).await.unwrap();

        let mut expected = vec![MockCall::StartProcess {
            worker_id: "worker-123456".to_string(),
        }];
        for i in 1..=3 {
            expected.push(MockCall::UpdateTask {
                task_id: format!("task-{i}"),
                status: TaskStatus::Start,
                has_details: false,
            });
            expected.push(MockCall::UpdateTask {
                task_id: format!("task-{i}"),
                status: TaskStatus::Success,
                has_details: false,
            });
        }
        expected.push(MockCall::EndProcess {
            process_id: "proc-1".to_string(),
            details: String::new(),
        });
        assert_eq!(mock.calls(), expected);
    }

    #[tokio::test]
    async fn test_unbound_worker_emits_nothing() {
        let mock = MockControlPlane::new(3);
        let mut pipeline = Pipeline::new()
            .with_control(mock.clone())
            .with_progress(quiet());
        pipeline.set_steps(chain_steps()).unwrap();

        let result = pipeline.run(ctx(json!({"x": 5}))).await.unwrap();
        assert_eq!(result.get("x3"), Some(&json!(13)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_reports_error_event_and_details() {
        let mock = MockControlPlane::new(3);
        let mut steps = chain_steps();
        steps[1] = Step::from_fn("second", "v1.0", |data| {
            let nope: i64 = data.require("nope")?;
            let mut out = Context::new();
            out.insert("x2", json!(nope));
            Ok(out)
        });

        let mut pipeline = Pipeline::new()
            .with_control(mock.clone())
            .with_worker_name("imaging")
            .with_progress(quiet());
        pipeline.set_steps(steps).unwrap();
        pipeline.set_worker_id("worker-123456").unwrap();

        let err = pipeline.run(ctx(json!({"x": 5}))).await.unwrap_err();
        let PipelineError::Process(failure) = err else {
            panic!("expected a process failure");
        };
        assert_eq!(failure.process_id.as_deref(), Some("proc-1"));
        assert_eq!(failure.worker_id.as_deref(), Some("worker-123456"));
        assert_eq!(failure.worker_name.as_deref(), Some("imaging"));

        let updates = mock.task_updates();
        assert_eq!(
            updates,
            vec![
                ("task-1".to_string(), TaskStatus::Start),
                ("task-1".to_string(), TaskStatus::Success),
                ("task-2".to_string(), TaskStatus::Start),
                ("task-2".to_string(), TaskStatus::Error),
            ]
        );
        // The error event carries the failure detail.
        assert!(matches!(
            mock.calls()[4],
            MockCall::UpdateTask {
                has_details: true,
                ..
            }
        ));

        let ends = mock.end_details();
        assert_eq!(ends.len(), 1);
        assert!(ends[0].contains("\"task_name\":\"second\""));
        assert!(ends[0].contains("missing key"));
    }

    #[tokio::test]
    async fn test_error_marker_reports_success_then_failed_end() {
        let mock = MockControlPlane::new(2);
        let mut pipeline = Pipeline::new()
            .with_control(mock.clone())
            .with_progress(quiet());
        pipeline
            .set_steps(vec![
                chain_steps().remove(0),
                Step::from_fn("flagging", "v1.0", |_data| {
                    let mut out = Context::new();
                    out.insert("error", json!("bad batch"));
                    Ok(out)
                }),
            ])
            .unwrap();
        pipeline.set_worker_id("worker-123456").unwrap();

        let err = pipeline.run(ctx(json!({"x": 5}))).await.unwrap_err();
        assert!(matches!(err, PipelineError::Process(_)));

        // The halting step returned normally, so its own event is a success;
        // the failure is carried by the process end.
        assert_eq!(
            mock.task_updates(),
            vec![
                ("task-1".to_string(), TaskStatus::Start),
                ("task-1".to_string(), TaskStatus::Success),
                ("task-2".to_string(), TaskStatus::Start),
                ("task-2".to_string(), TaskStatus::Success),
            ]
        );
        let ends = mock.end_details();
        assert_eq!(ends.len(), 1);
        assert!(ends[0].contains("bad batch"));
    }

    #[tokio::test]
    async fn test_task_count_mismatch_fails_before_any_step() {
        let ran_first = Arc::new(AtomicUsize::new(0));
        let mock = MockControlPlane::new(2);
        let mut pipeline = Pipeline::new()
            .with_control(mock.clone())
            .with_progress(quiet());
        pipeline
            .set_steps(vec![
                counting_step("first", Arc::clone(&ran_first)),
                counting_step("second", Arc::new(AtomicUsize::new(0))),
                counting_step("third", Arc::new(AtomicUsize::new(0))),
            ])
            .unwrap();
        pipeline.set_worker_id("worker-123456").unwrap();

        let err = pipeline.run(ctx(json!({}))).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::TaskCountMismatch {
                returned: 2,
                configured: 3
            })
        ));
        assert_eq!(ran_first.load(Ordering::SeqCst), 0);
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_process_start_failure_policies() {
        let ran = Arc::new(AtomicUsize::new(0));

        // Lenient: the run continues unreported.
        let mock = MockControlPlane::new(1);
        mock.fail_start.store(true, Ordering::SeqCst);
        let mut pipeline = Pipeline::new()
            .with_control(mock.clone())
            .with_progress(quiet());
        pipeline
            .set_steps(vec![counting_step("only", Arc::clone(&ran))])
            .unwrap();
        pipeline.set_worker_id("worker-123456").unwrap();

        pipeline.run(ctx(json!({}))).await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(mock.calls().len(), 1);

        // Strict: the run aborts before any step.
        let mock = MockControlPlane::new(1);
        mock.fail_start.store(true, Ordering::SeqCst);
        let mut pipeline = Pipeline::new()
            .with_control(mock.clone())
            .with_strict_api_errors(true)
            .with_progress(quiet());
        pipeline
            .set_steps(vec![counting_step("only", Arc::clone(&ran))])
            .unwrap();
        pipeline.set_worker_id("worker-123456").unwrap();

        let err = pipeline.run(ctx(json!({}))).await.unwrap_err();
        assert!(matches!(err, PipelineError::Api(_)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_end_rejection_policies() {
        let mock = MockControlPlane::new(3);
        mock.acknowledge_end.store(false, Ordering::SeqCst);

        let mut pipeline = Pipeline::new()
            .with_control(mock.clone())
            .with_progress(quiet());
        pipeline.set_steps(chain_steps()).unwrap();
        pipeline.set_worker_id("worker-123456").unwrap();

        // Lenient: a refused acknowledgement is logged away.
        pipeline.run(ctx(json!({"x": 5}))).await.unwrap();

        let strict = Pipeline {
            steps: chain_steps(),
            control: Some(mock.clone() as Arc<dyn ControlPlane>),
            worker: pipeline.worker_state(),
            progress: quiet(),
            strict: true,
        };
        let err = strict.run(ctx(json!({"x": 5}))).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Api(ApiError::EndRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_nested_pipeline_runs_inline() {
        let inner = plain_pipeline(chain_steps());
        let combine = Step::from_fn("combine", "v1.0", |data| {
            let x1: i64 = data.require("x1")?;
            let x3: i64 = data.require("x3")?;
            let mut out = Context::new();
            out.insert("x4", json!(x1 * x3));
            Ok(out)
        });

        let outer = plain_pipeline(vec![
            Step::from_handler("chained_increments", "v1.0", Arc::new(inner)),
            combine,
        ]);

        let result = outer.run(ctx(json!({"x": 5, "y": "a"}))).await.unwrap();
        assert_eq!(result.get("x1"), Some(&json!(6)));
        assert_eq!(result.get("x3"), Some(&json!(13)));
        assert_eq!(result.get("x4"), Some(&json!(78)));
        assert_eq!(result.get("y"), Some(&json!("a")));
    }

    #[tokio::test]
    async fn test_nested_failure_wraps_once() {
        let mut inner_steps = chain_steps();
        inner_steps[1] = Step::from_fn("second", "v1.0", |data| {
            let nope: i64 = data.require("nope")?;
            let mut out = Context::new();
            out.insert("x2", json!(nope));
            Ok(out)
        });
        let inner = plain_pipeline(inner_steps);

        let outer = plain_pipeline(vec![Step::from_handler(
            "chained_increments",
            "v1.0",
            Arc::new(inner),
        )]);

        let err = outer.run(ctx(json!({"x": 5}))).await.unwrap_err();
        let PipelineError::Process(failure) = err else {
            panic!("expected a process failure");
        };

        // The outer step is the failing task; the inner failure is its message.
        assert_eq!(failure.source.task_name, "chained_increments");
        assert!(failure.source.message.contains("[task] [second]"));
        assert_eq!(failure.source.message.matches("[pipeline]").count(), 1);
        // Frames from the inner failure survive the wrap.
        assert!(!failure.source.frames.is_empty());
    }

    #[tokio::test]
    async fn test_set_steps_rejects_unnamed_steps() {
        let mut pipeline = Pipeline::new();
        let err = pipeline
            .set_steps(vec![
                Step::from_fn("ok", "v1.0", |_| Ok(Context::new())),
                Step::from_fn("  ", "v1.0", |_| Ok(Context::new())),
            ])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnnamedStep { index: 1 }));
    }

    #[tokio::test]
    async fn test_engine_level_worker_id_validation() {
        let mock = MockControlPlane::new(1);
        let pipeline = Pipeline::new().with_control(mock.clone());

        assert!(pipeline.set_worker_id("abc").is_err());
        assert!(!pipeline.worker_state().telemetry_enabled());

        pipeline.set_worker_id("worker-123456").unwrap();
        assert!(pipeline.worker_state().telemetry_enabled());

        pipeline.clear_worker_id();
        assert!(!pipeline.worker_state().telemetry_enabled());
    }
}
