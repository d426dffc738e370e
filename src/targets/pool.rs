//! Target Pool
//!
//! Owns the operator's base terms and the flattened, sorted pool of variants
//! derived from them. Every mutation rebuilds the pool from scratch and
//! publishes it as a fresh `Arc`, so readers never observe a half-built pool.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::alphabet::normalize;
use super::fuzz::expand;
use super::store::TermStore;
use crate::config::FuzzConfig;

/// Prefix of a storage key whose term must not be fuzzed.
pub const EXACT_MARKER: char = '!';

const PREVIEW_LEN: usize = 3;

/// The storage key for a term: verbatim when fuzzed, `!`-prefixed when exact.
pub fn storage_key(term: &str, fuzz: bool) -> String {
    if fuzz {
        term.to_string()
    } else {
        format!("{EXACT_MARKER}{term}")
    }
}

/// Lexicographically sorted, duplicate-free set of variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetPool {
    variants: Vec<String>,
}

impl TargetPool {
    /// Build a pool from the complete collection of storage keys.
    pub fn rebuild<I, S>(base_terms: I, config: &FuzzConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut variants = BTreeSet::new();
        for key in base_terms {
            let key = key.as_ref();
            match key.strip_prefix(EXACT_MARKER) {
                Some(raw) => {
                    let clean = normalize(raw);
                    if !clean.is_empty() {
                        variants.insert(clean);
                    }
                }
                None => variants.extend(expand(key, config)),
            }
        }
        Self {
            variants: variants.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn contains(&self, variant: &str) -> bool {
        self.variants
            .binary_search_by(|v| v.as_str().cmp(variant))
            .is_ok()
    }

    /// Variants in their fixed (lexicographic) order.
    pub fn as_slice(&self) -> &[String] {
        &self.variants
    }
}

impl<S: Into<String>> FromIterator<S> for TargetPool {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let set: BTreeSet<String> = iter.into_iter().map(Into::into).collect();
        Self {
            variants: set.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { key: String, preview: Vec<String> },
    /// The same storage key is already present
    Duplicate,
    /// Nothing survived normalization
    Unmappable,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// What `restore` found in the term store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No store yet: defaults were seeded and saved
    FirstRun { seeded: usize },
    /// Store present (possibly empty, which is honoured)
    Loaded { terms: usize },
    /// Store unreadable: starting empty, store left untouched
    Unreadable,
}

#[derive(Default)]
struct TermState {
    base_terms: BTreeSet<String>,
    pool: Arc<TargetPool>,
}

impl TermState {
    fn rebuild(&mut self, config: &FuzzConfig) {
        self.pool = Arc::new(TargetPool::rebuild(&self.base_terms, config));
        info!(
            "🎯 Pool rebuilt. Base terms: {} -> active variations: {}",
            self.base_terms.len(),
            self.pool.len()
        );
    }
}

pub struct TargetManager {
    state: RwLock<TermState>,
    store: Arc<dyn TermStore>,
    fuzz: FuzzConfig,
}

impl TargetManager {
    pub fn new(store: Arc<dyn TermStore>, fuzz: FuzzConfig) -> Self {
        Self {
            state: RwLock::new(TermState::default()),
            store,
            fuzz,
        }
    }

    /// Load base terms from the store, seeding `defaults` only when the store
    /// has never been written.
    pub async fn restore<S: AsRef<str>>(&self, defaults: &[S]) -> RestoreOutcome {
        let mut state = self.state.write().await;
        match self.store.load().await {
            Ok(Some(terms)) => {
                state.base_terms = terms.into_iter().collect();
                if state.base_terms.is_empty() {
                    info!("📂 Target file is empty. Starting with 0 targets.");
                    state.pool = Arc::new(TargetPool::default());
                } else {
                    info!("📂 Restored {} base terms from file.", state.base_terms.len());
                    state.rebuild(&self.fuzz);
                }
                RestoreOutcome::Loaded {
                    terms: state.base_terms.len(),
                }
            }
            Ok(None) => {
                info!("First run. Loading {} default terms...", defaults.len());
                state.base_terms = defaults
                    .iter()
                    .map(|t| t.as_ref().trim())
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                state.rebuild(&self.fuzz);
                self.persist(&state.base_terms).await;
                RestoreOutcome::FirstRun {
                    seeded: state.base_terms.len(),
                }
            }
            Err(e) => {
                error!("Error loading targets, starting empty: {}", e);
                RestoreOutcome::Unreadable
            }
        }
    }

    /// Add a base term. Rejections are logged and reported, never raised.
    pub async fn add_term(&self, term: &str, fuzz: bool) -> AddOutcome {
        let term = term.trim();
        if term.is_empty() {
            return AddOutcome::Empty;
        }

        let key = storage_key(term, fuzz);
        let mut state = self.state.write().await;
        if state.base_terms.contains(&key) {
            info!("'{}' is already in your list.", term);
            return AddOutcome::Duplicate;
        }

        let clean = normalize(term);
        if clean.is_empty() {
            warn!("'{}' contains no valid characters.", term);
            return AddOutcome::Unmappable;
        }

        state.base_terms.insert(key.clone());
        state.rebuild(&self.fuzz);
        self.persist(&state.base_terms).await;

        let preview: Vec<String> = if fuzz {
            expand(term, &self.fuzz).into_iter().take(PREVIEW_LEN).collect()
        } else {
            vec![clean]
        };
        if fuzz {
            info!("➕ Added '{}' + fuzz. Vars: {}...", term, preview.join(", "));
        } else {
            info!("➕ Added EXACT match: '{}'", preview.join(""));
        }
        AddOutcome::Added { key, preview }
    }

    /// Remove both the fuzzed and the exact form of `term`.
    pub async fn remove_term(&self, term: &str) -> RemoveOutcome {
        let term = term.trim();
        let mut state = self.state.write().await;

        let removed_fuzzed = state.base_terms.remove(term);
        let removed_exact = state.base_terms.remove(&storage_key(term, false));
        if !(removed_fuzzed || removed_exact) {
            info!("'{}' not found in base terms list.", term);
            return RemoveOutcome::NotFound;
        }

        info!("➖ Removed '{}' and all variants.", term);
        state.rebuild(&self.fuzz);
        self.persist(&state.base_terms).await;
        RemoveOutcome::Removed
    }

    /// Forget every base term and empty the pool.
    pub async fn clear_all(&self) {
        let mut state = self.state.write().await;
        state.base_terms.clear();
        state.pool = Arc::new(TargetPool::default());
        self.persist(&state.base_terms).await;
        info!("🧹 Cleared all targets.");
    }

    /// The currently published pool.
    pub async fn snapshot(&self) -> Arc<TargetPool> {
        self.state.read().await.pool.clone()
    }

    /// Storage keys in sorted order.
    pub async fn base_terms(&self) -> Vec<String> {
        self.state.read().await.base_terms.iter().cloned().collect()
    }

    /// `(base terms, variants)`
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.base_terms.len(), state.pool.len())
    }

    /// Persistence failures only cost durability; memory stays authoritative.
    async fn persist(&self, terms: &BTreeSet<String>) {
        let terms: Vec<String> = terms.iter().cloned().collect();
        if let Err(e) = self.store.save(&terms).await {
            error!("Error saving targets (changes may be lost on restart): {}", e);
        }
    }
}
