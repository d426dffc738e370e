//! Operator control surface
//!
//! The one object a front end talks to. It wires the target manager, the
//! worker supervisor and the rotation together and exposes the handful of
//! operations an operator can perform.

use std::sync::Arc;
use tracing::info;

use super::scheduler::{BatchCursor, RotationHandle, RotationTiming, SchedulerState};
use super::sink::LogSink;
use super::worker::WorkerSupervisor;
use crate::config::RotorConfig;
use crate::error::RotorResult;
use crate::targets::{AddOutcome, RemoveOutcome, RestoreOutcome, TargetManager, TermStore};

/// Read-only counters for a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub base_terms: usize,
    pub variants: usize,
    pub status: SchedulerState,
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Base Terms: {} | Total Variations: {} | Status: {}",
            self.base_terms, self.variants, self.status
        )
    }
}

pub struct ControlSurface {
    targets: Arc<TargetManager>,
    supervisor: Arc<WorkerSupervisor>,
    rotation: RotationHandle,
}

impl ControlSurface {
    pub fn new(config: &RotorConfig, store: Arc<dyn TermStore>, sink: Arc<dyn LogSink>) -> RotorResult<Self> {
        config.validate()?;
        let targets = Arc::new(TargetManager::new(store, config.fuzz.clone()));
        let supervisor = Arc::new(WorkerSupervisor::new(config.worker.clone(), sink)?);
        let cursor = BatchCursor::new(config.batch_size).with_command_budget(&config.worker, config.max_command_len);
        let timing = RotationTiming {
            hold: config.rotate_interval(),
            tick: config.tick(),
        };
        let rotation = RotationHandle::new(targets.clone(), supervisor.clone(), cursor, timing);
        Ok(Self {
            targets,
            supervisor,
            rotation,
        })
    }

    pub fn targets(&self) -> &Arc<TargetManager> {
        &self.targets
    }

    pub fn supervisor(&self) -> &Arc<WorkerSupervisor> {
        &self.supervisor
    }

    pub async fn restore<S: AsRef<str>>(&self, defaults: &[S]) -> RestoreOutcome {
        self.targets.restore(defaults).await
    }

    /// Begin rotating. Returns `false` if already started or shut down.
    pub fn start(&self) -> bool {
        self.rotation.spawn()
    }

    pub async fn add_term(&self, text: &str, fuzz: bool) -> AddOutcome {
        self.targets.add_term(text, fuzz).await
    }

    pub async fn remove_term(&self, text: &str) -> RemoveOutcome {
        self.targets.remove_term(text).await
    }

    /// Drop every term and kill the running worker.
    pub async fn clear_all(&self) {
        self.targets.clear_all().await;
        self.supervisor.stop().await;
    }

    pub async fn set_paused(&self, paused: bool) {
        self.rotation.set_paused(paused);
        if paused {
            self.supervisor.stop().await;
            info!("⏸️  PAUSED. Mining stopped.");
        } else {
            info!("▶️  RESUMING rotation...");
        }
    }

    pub fn status(&self) -> SchedulerState {
        self.rotation.state()
    }

    pub async fn stats(&self) -> Stats {
        let (base_terms, variants) = self.targets.counts().await;
        Stats {
            base_terms,
            variants,
            status: self.rotation.state(),
        }
    }

    /// Stop rotating for good and make sure no worker survives.
    pub async fn shutdown(&self) {
        self.rotation.shutdown().await;
        self.supervisor.stop().await;
        info!("👋 Shutdown complete");
    }
}
