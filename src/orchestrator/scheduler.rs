//! Batch Scheduler
//!
//! Cuts the sorted pool into fixed-size batches and walks through them on a
//! timer, handing each batch to a [`BatchRunner`]. The cursor persists across
//! rotations (and pool rebuilds) so every variant eventually gets a turn.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

use super::worker::BatchRunner;
use crate::config::WorkerConfig;
use crate::targets::{TargetManager, TargetPool};

/// One worker's share of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub targets: Vec<String>,
    /// Cursor position this batch was cut from
    pub start: usize,
    /// Pool size at the time of cutting
    pub total: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Keeps the worker's argument vector under a platform command-line limit.
#[derive(Debug, Clone, Copy)]
struct CommandBudget {
    max_len: usize,
    fixed_len: usize,
    per_constraint: usize,
}

impl CommandBudget {
    fn new(config: &WorkerConfig, max_len: usize) -> Self {
        Self {
            max_len,
            fixed_len: config.program.len() + config.base_args.iter().map(|a| a.len() + 1).sum::<usize>(),
            // flag, separator, value, separator
            per_constraint: config.constraint_flag.len() + 2,
        }
    }

    /// How many leading candidates fit. Always at least one.
    fn fit(&self, candidates: &[String]) -> usize {
        let mut used = self.fixed_len;
        for (n, variant) in candidates.iter().enumerate() {
            used += self.per_constraint + variant.len();
            if used > self.max_len && n > 0 {
                return n;
            }
        }
        candidates.len()
    }
}

#[derive(Debug, Clone)]
pub struct BatchCursor {
    position: usize,
    batch_size: usize,
    budget: Option<CommandBudget>,
}

impl BatchCursor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            position: 0,
            batch_size: batch_size.max(1),
            budget: None,
        }
    }

    pub fn with_command_budget(mut self, config: &WorkerConfig, max_len: usize) -> Self {
        self.budget = Some(CommandBudget::new(config, max_len));
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Cut the next batch. `None` only for an empty pool.
    pub fn next_batch(&mut self, pool: &TargetPool) -> Option<Batch> {
        let all = pool.as_slice();
        let total = all.len();
        if total == 0 {
            return None;
        }
        if self.position >= total {
            self.position = 0;
        }

        let start = self.position;
        let mut end = (start + self.batch_size).min(total);
        if let Some(budget) = &self.budget {
            end = start + budget.fit(&all[start..end]);
        }
        self.position = if end < total { end } else { 0 };

        Some(Batch {
            targets: all[start..end].to_vec(),
            start,
            total,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "IDLE"),
            SchedulerState::Running => write!(f, "RUNNING"),
            SchedulerState::Paused => write!(f, "PAUSED"),
            SchedulerState::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RotationTiming {
    /// How long each batch keeps the worker
    pub hold: Duration,
    /// Poll interval while paused or starved
    pub tick: Duration,
}

/// The long-lived rotation task. Sole owner of the cursor.
struct Rotation {
    targets: Arc<TargetManager>,
    runner: Arc<dyn BatchRunner>,
    cursor: BatchCursor,
    timing: RotationTiming,
    control: watch::Receiver<SchedulerState>,
}

impl Rotation {
    /// Latest control state; a dropped handle counts as a stop request.
    fn current(&mut self) -> SchedulerState {
        if self.control.has_changed().is_err() {
            return SchedulerState::Stopped;
        }
        *self.control.borrow_and_update()
    }

    async fn run(mut self) {
        info!("🔁 Rotation started ({:?} per batch)", self.timing.hold);
        loop {
            match self.current() {
                SchedulerState::Stopped => break,
                SchedulerState::Idle | SchedulerState::Paused => {
                    self.wait_tick().await;
                    continue;
                }
                SchedulerState::Running => {}
            }

            let pool = self.targets.snapshot().await;
            let Some(batch) = self.cursor.next_batch(&pool) else {
                self.wait_tick().await;
                continue;
            };

            info!(
                "🔄 ROTATING >> Mining batch ({} targets) [{}/{}]",
                batch.len(),
                batch.start,
                batch.total
            );
            self.runner.run(&batch).await;

            // A clear that landed during the launch already stopped the old
            // worker; the one just started is working on a stale batch.
            if self.targets.snapshot().await.is_empty() {
                debug!("Pool emptied during launch, dropping batch");
                self.runner.halt().await;
                continue;
            }

            if self.hold().await {
                self.runner.halt().await;
            }
        }
        self.runner.halt().await;
        info!("⏹️  Rotation stopped");
    }

    /// One tick, or less if the control state changes.
    async fn wait_tick(&mut self) {
        tokio::select! {
            _ = sleep(self.timing.tick) => {}
            _ = self.control.changed() => {}
        }
    }

    /// Keep the current batch for the hold interval. Returns `true` when a
    /// pause or stop cut it short.
    async fn hold(&mut self) -> bool {
        let deadline = Instant::now() + self.timing.hold;
        loop {
            if self.current() != SchedulerState::Running {
                return true;
            }
            tokio::select! {
                _ = sleep_until(deadline) => return false,
                changed = self.control.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
            }
        }
    }
}

/// Control side of the rotation: start, pause/resume, stop.
pub struct RotationHandle {
    control: watch::Sender<SchedulerState>,
    pending: Mutex<Option<Rotation>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RotationHandle {
    pub fn new(
        targets: Arc<TargetManager>,
        runner: Arc<dyn BatchRunner>,
        cursor: BatchCursor,
        timing: RotationTiming,
    ) -> Self {
        let (control, rx) = watch::channel(SchedulerState::Idle);
        let rotation = Rotation {
            targets,
            runner,
            cursor,
            timing,
            control: rx,
        };
        Self {
            control,
            pending: Mutex::new(Some(rotation)),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.control.borrow()
    }

    /// Launch the rotation task. Only the first call does anything.
    pub fn spawn(&self) -> bool {
        let Some(rotation) = self.pending.lock().ok().and_then(|mut p| p.take()) else {
            return false;
        };
        self.control.send_if_modified(|state| {
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Running;
                true
            } else {
                false
            }
        });
        let task = tokio::spawn(rotation.run());
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        true
    }

    pub fn set_paused(&self, paused: bool) {
        let spawned = self.task.lock().map(|t| t.is_some()).unwrap_or(false);
        self.control.send_if_modified(|state| {
            let next = match (*state, paused) {
                (SchedulerState::Stopped, _) => return false,
                (_, true) => SchedulerState::Paused,
                (SchedulerState::Paused, false) if spawned => SchedulerState::Running,
                (SchedulerState::Paused, false) => SchedulerState::Idle,
                (current, false) => current,
            };
            let changed = next != *state;
            *state = next;
            changed
        });
        debug!("Rotation state now {}", self.state());
    }

    /// Stop for good and wait for the rotation task to tear its worker down.
    pub async fn shutdown(&self) {
        self.control.send_replace(SchedulerState::Stopped);
        if let Ok(mut pending) = self.pending.lock() {
            pending.take();
        }
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}
