//! Targets Module
//!
//! From operator input to the pool of search prefixes: alphabet checks,
//! normalization, fuzz expansion, the pool itself and its flat-file store.

pub mod alphabet;
pub mod fuzz;
pub mod pool;
pub mod store;

pub use alphabet::{is_valid, normalize, BASE58_ALPHABET};
pub use fuzz::{expand, variant_bound, Substitutions};
pub use pool::{storage_key, AddOutcome, RemoveOutcome, RestoreOutcome, TargetManager, TargetPool, EXACT_MARKER};
pub use store::{FileTermStore, MemoryTermStore, TermStore};
