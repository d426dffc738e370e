//! Term Store
//!
//! Flat-file persistence of base terms: one storage key per line, exact
//! terms keep their `!` marker. A missing file and an empty file mean
//! different things (first run vs. operator cleared the list), so `load`
//! keeps them apart.

use async_trait::async_trait;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tokio::{fs, task};
use tracing::debug;

use crate::error::{RotorError, RotorResult};

#[async_trait]
pub trait TermStore: Send + Sync {
    /// `Ok(None)` when nothing has ever been saved.
    async fn load(&self) -> RotorResult<Option<Vec<String>>>;

    /// Replace the stored list.
    async fn save(&self, terms: &[String]) -> RotorResult<()>;
}

pub struct FileTermStore {
    path: PathBuf,
}

impl FileTermStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TermStore for FileTermStore {
    async fn load(&self) -> RotorResult<Option<Vec<String>>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RotorError::store(&self.path, e)),
        };

        let terms: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        debug!("Loaded {} base terms from {}", terms.len(), self.path.display());
        Ok(Some(terms))
    }

    async fn save(&self, terms: &[String]) -> RotorResult<()> {
        let path = self.path.clone();
        let terms = terms.to_vec();

        task::spawn_blocking(move || write_atomically(&path, &terms).map_err(|e| RotorError::store(&path, e)))
            .await
            .map_err(|e| RotorError::store(&self.path, std::io::Error::other(e)))?
    }
}

/// Write to a sibling temp file, then rename over the target so a crash never
/// leaves a half-written list behind.
fn write_atomically(path: &Path, terms: &[String]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp_file = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(temp_file.as_file());
        for term in terms {
            writeln!(writer, "{term}")?;
        }
        writer.flush()?;
    }
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-process store, handy for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryTermStore {
    terms: Mutex<Option<Vec<String>>>,
}

impl MemoryTermStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            terms: Mutex::new(Some(terms.into_iter().map(Into::into).collect())),
        }
    }

    pub fn snapshot(&self) -> Option<Vec<String>> {
        self.terms.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TermStore for MemoryTermStore {
    async fn load(&self) -> RotorResult<Option<Vec<String>>> {
        Ok(self.snapshot())
    }

    async fn save(&self, terms: &[String]) -> RotorResult<()> {
        if let Ok(mut slot) = self.terms.lock() {
            *slot = Some(terms.to_vec());
        }
        Ok(())
    }
}
