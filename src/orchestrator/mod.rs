//! Orchestrator Module
//!
//! Batch rotation, worker lifecycle and the operator-facing control surface.

pub mod control;
pub mod scheduler;
pub mod sink;
pub mod worker;

pub use control::{ControlSurface, Stats};
pub use scheduler::{Batch, BatchCursor, RotationHandle, RotationTiming, SchedulerState};
pub use sink::{ChannelSink, LogSink, TracingSink};
pub use worker::{BatchRunner, WorkerSupervisor};
