//! # Worker Lifecycle
//!
//! Registration and heartbeat for one worker process.
//!
//! ## Cycle
//!
//! ```text
//! every interval:
//!   no identity file → register, persist the assigned record
//!   post the record for a health check
//!     unhealthy → discard the record, disable telemetry
//!                 (the next cycle re-registers)
//!     healthy   → refresh the persisted stamp, or re-register a
//!                 record that lost its id
//! ```
//!
//! The loop runs in a spawned task and sleeps in one-second slices so a
//! stop signal is honored promptly.

pub mod identity;

pub use identity::{IdentityStore, WorkerIdentity};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::{ControlPlane, RegisterRequest};
use crate::error::ConfigError;
use crate::pipeline::Pipeline;

/// Pause between health cycles.
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(20);

/// Sleep granularity inside one pause.
const HEARTBEAT_SLICE: Duration = Duration::from_secs(1);

/// Where the lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Unregistered,
    Registering,
    Registered,
    Healthy,
    Unhealthy,
}

/// Drives registration and the periodic health check for one worker.
pub struct WorkerLifecycle {
    pipeline: Arc<Pipeline>,
    control: Arc<dyn ControlPlane>,
    store: IdentityStore,
    name: String,
    version: String,
    interval: Duration,
}

impl WorkerLifecycle {
    pub fn new(
        pipeline: Arc<Pipeline>,
        control: Arc<dyn ControlPlane>,
        store: IdentityStore,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let name = name.into();
        pipeline.worker_state().set_name(&name);
        Self {
            pipeline,
            control,
            store,
            name,
            version: version.into(),
            interval: DEFAULT_HEARTBEAT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the heartbeat task. Refused when the pipeline has no steps,
    /// since there is nothing to advertise.
    pub fn spawn(self) -> Result<LifecycleHandle, ConfigError> {
        if self.pipeline.steps().is_empty() {
            return Err(ConfigError::NoSteps);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (phase_tx, phase_rx) = watch::channel(LifecyclePhase::Unregistered);
        let task = tokio::spawn(self.heartbeat_loop(stop_rx, phase_tx));

        Ok(LifecycleHandle {
            stop: stop_tx,
            phase: phase_rx,
            task,
        })
    }

    async fn heartbeat_loop(
        self,
        mut stop: watch::Receiver<bool>,
        phase: watch::Sender<LifecyclePhase>,
    ) {
        tracing::info!(name = %self.name, "Worker heartbeat started");
        loop {
            self.cycle(&phase).await;

            let mut remaining = self.interval;
            while remaining > Duration::ZERO {
                let slice = remaining.min(HEARTBEAT_SLICE);
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            tracing::info!("Worker heartbeat stopped");
                            return;
                        }
                    }
                    _ = tokio::time::sleep(slice) => {
                        remaining = remaining.saturating_sub(slice);
                    }
                }
            }
        }
    }

    /// One register-or-health pass.
    async fn cycle(&self, phase: &watch::Sender<LifecyclePhase>) {
        if !self.store.exists().await {
            let _ = phase.send(LifecyclePhase::Registering);
            if let Err(e) = self.register().await {
                tracing::warn!("Worker registration failed: {:#}", e);
                return;
            }
        }

        let Some(identity) = self.store.load().await else {
            // Present but unreadable: discard so the next cycle re-registers.
            let _ = self.store.delete().await;
            return;
        };

        if identity.is_valid() {
            let _ = phase.send(LifecyclePhase::Registered);
            if let Err(e) = self.pipeline.set_worker_id(&identity.id) {
                tracing::warn!("Persisted worker id rejected: {}", e);
            }
        }

        let status = match self.control.health_check(&identity).await {
            Ok(status) => status,
            Err(e) => {
                // Leave the record alone; the verdict may just be late.
                tracing::warn!("Health check failed: {}", e);
                return;
            }
        };

        if !status.is_healthy() {
            let _ = phase.send(LifecyclePhase::Unhealthy);
            tracing::info!(
                worker_id = %identity.id,
                "Health check reported unhealthy, discarding registration"
            );
            if let Err(e) = self.store.delete().await {
                tracing::warn!("Could not discard identity file: {:#}", e);
            }
            self.pipeline.clear_worker_id();
            return;
        }

        let _ = phase.send(LifecyclePhase::Healthy);
        if identity.is_valid() {
            if let Err(e) = self.store.save(&identity.refreshed()).await {
                tracing::warn!("Could not refresh identity stamp: {:#}", e);
            }
        } else {
            // The record survived without a usable id: replace it outright.
            let _ = phase.send(LifecyclePhase::Registering);
            if let Err(e) = self.register().await {
                tracing::warn!("Worker re-registration failed: {:#}", e);
            }
        }
    }

    async fn register(&self) -> Result<WorkerIdentity> {
        let request = RegisterRequest {
            name: self.name.clone(),
            version: self.version.clone(),
            tasks: self.pipeline.manifest(),
        };
        let identity = self.control.register_worker(&request).await?.refreshed();
        self.store.save(&identity).await?;

        if identity.is_valid() {
            self.pipeline.set_worker_id(&identity.id)?;
        } else {
            tracing::warn!(worker_id = %identity.id, "Control plane assigned an unusable worker id");
        }
        tracing::info!(worker_id = %identity.id, name = %self.name, "Worker registered");
        Ok(identity)
    }
}

/// Running heartbeat task with its stop signal.
pub struct LifecycleHandle {
    stop: watch::Sender<bool>,
    phase: watch::Receiver<LifecyclePhase>,
    task: JoinHandle<()>,
}

impl LifecycleHandle {
    pub fn phase(&self) -> LifecyclePhase {
        *self.phase.borrow()
    }

    /// Wait until the loop has produced its first health verdict.
    pub async fn started(&mut self) {
        loop {
            let phase = *self.phase.borrow();
            if matches!(phase, LifecyclePhase::Healthy | LifecyclePhase::Unhealthy) {
                return;
            }
            if self.phase.changed().await.is_err() {
                return;
            }
        }
    }

    /// Ask the loop to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Signal the loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}
