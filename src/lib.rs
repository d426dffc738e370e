//! Vanity Rotor
//!
//! Keeps a single external key-search worker busy with a much larger set of
//! vanity prefixes than it can handle at once:
//! - Base58 normalization and fuzz expansion of operator terms
//! - A flat, persisted list of base terms
//! - Fixed-size batch rotation on a timer, with pause/resume
//! - Process-tree supervision of the worker

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod shell;
pub mod targets;
pub mod utils;

// Re-exports for convenience
pub use config::RotorConfig;
pub use error::{RotorError, RotorResult};
pub use orchestrator::{ControlSurface, WorkerSupervisor};
pub use targets::{TargetManager, TargetPool};
