//! Rotor Configuration
//!
//! Everything tunable about the rotation lives here. Values come from a JSON
//! file (written with defaults on first run) and can be overridden by
//! `ROTOR_*` environment variables, typically via `.env`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::error::{RotorError, RotorResult};

/// Default location of the config file
pub const CONFIG_FILENAME: &str = "rotor.json";

/// How base terms are fuzzed into variants
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FuzzConfig {
    /// Prefix lengths tried on words longer than four characters
    pub prefix_lengths: Vec<usize>,
    /// Hard stop for the substitution product
    pub max_substitutions: usize,
    /// How many variants (in sorted order) get decorated
    pub decoration_sample: usize,
    pub decorations: Vec<String>,
    /// Decorated variants longer than this are discarded
    pub max_decorated_len: usize,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            prefix_lengths: vec![4, 5, 6],
            max_substitutions: 100,
            decoration_sample: 20,
            decorations: ["69", "369", "42c", "42D", "6", "9", "3", "7", "247"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_decorated_len: 7,
        }
    }
}

/// How the external search worker is invoked
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub program: String,
    /// Fixed flags placed before the per-batch constraints
    pub base_args: Vec<String>,
    /// Flag repeated once per batch element
    pub constraint_flag: String,
    /// Merged onto the inherited environment
    pub env: BTreeMap<String, String>,
    /// Output lines matching any of these regexes are swallowed
    pub noise_patterns: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let program = if cfg!(windows) { "python" } else { "python3" };
        Self {
            program: program.to_string(),
            base_args: [
                "main.py",
                "search-pubkey",
                "--select-device",
                "--count",
                "1000000000",
                "--is-case-sensitive",
                "false",
                "--iteration-bits",
                "25",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            constraint_flag: "--starts-with".to_string(),
            env: BTreeMap::from([("CHOSEN_OPENCL_DEVICES".to_string(), "0:0".to_string())]),
            noise_patterns: vec![
                "BrokenPipeError".to_string(),
                "WinError 232".to_string(),
                "Traceback".to_string(),
                "multiprocessing".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RotorConfig {
    /// Flat list of base terms, one per line
    pub targets_file: PathBuf,
    /// Seeded on the very first run only
    pub default_terms: Vec<String>,
    pub batch_size: usize,
    pub rotate_interval_secs: u64,
    pub tick_millis: u64,
    /// Upper bound on the summed length of the worker argument vector
    pub max_command_len: usize,
    /// Directory for the rolling log file; console only when unset
    pub log_dir: Option<PathBuf>,
    pub worker: WorkerConfig,
    pub fuzz: FuzzConfig,
}

impl Default for RotorConfig {
    fn default() -> Self {
        Self {
            targets_file: PathBuf::from("vanity_targets.txt"),
            default_terms: ["ElonMusk", "CryptoRap", "Savage", "MemeGod"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            batch_size: 15,
            rotate_interval_secs: 60,
            tick_millis: 1000,
            max_command_len: 32_000,
            log_dir: Some(PathBuf::from("logs")),
            worker: WorkerConfig::default(),
            fuzz: FuzzConfig::default(),
        }
    }
}

impl RotorConfig {
    pub fn rotate_interval(&self) -> Duration {
        Duration::from_secs(self.rotate_interval_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Apply `ROTOR_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> RotorResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> RotorResult<()> {
        if let Some(path) = lookup("ROTOR_TARGETS_FILE") {
            self.targets_file = PathBuf::from(path);
        }
        if let Some(program) = lookup("ROTOR_WORKER_PROGRAM") {
            self.worker.program = program;
        }
        if let Some(raw) = lookup("ROTOR_BATCH_SIZE") {
            self.batch_size = parse_number("ROTOR_BATCH_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("ROTOR_ROTATE_INTERVAL_SECS") {
            self.rotate_interval_secs = parse_number("ROTOR_ROTATE_INTERVAL_SECS", &raw)?;
        }
        Ok(())
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> RotorResult<()> {
        if self.batch_size == 0 {
            return Err(RotorError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.rotate_interval_secs == 0 {
            return Err(RotorError::InvalidConfig("rotate_interval_secs must be at least 1".into()));
        }
        if self.tick_millis == 0 {
            return Err(RotorError::InvalidConfig("tick_millis must be at least 1".into()));
        }
        if self.worker.program.trim().is_empty() {
            return Err(RotorError::InvalidConfig("worker.program is empty".into()));
        }
        regex::RegexSet::new(&self.worker.noise_patterns)?;
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> RotorResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| RotorError::InvalidConfig(format!("{key}={raw:?} is not a number")))
}

pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `ROTOR_CONFIG` if set, else `rotor.json` in the working directory
    pub fn default_path() -> PathBuf {
        std::env::var("ROTOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config file, writing defaults if it does not exist yet.
    pub async fn load(&self) -> Result<RotorConfig> {
        if !self.path.exists() {
            let default = RotorConfig::default();
            self.save(&default).await?;
            return Ok(default);
        }
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read config file {}", self.path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", self.path.display()))?;
        Ok(config)
    }

    pub async fn save(&self, config: &RotorConfig) -> Result<()> {
        let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write config file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_stock_worker() {
        let config = RotorConfig::default();
        assert_eq!(config.batch_size, 15);
        assert_eq!(config.rotate_interval(), Duration::from_secs(60));
        assert_eq!(config.tick(), Duration::from_secs(1));
        assert_eq!(config.worker.constraint_flag, "--starts-with");
        assert_eq!(config.worker.env.get("CHOSEN_OPENCL_DEVICES").map(String::as_str), Some("0:0"));
        assert_eq!(config.fuzz.max_substitutions, 100);
        assert_eq!(config.fuzz.max_decorated_len, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ROTOR_BATCH_SIZE", "4"),
            ("ROTOR_TARGETS_FILE", "/tmp/terms.txt"),
            ("ROTOR_ROTATE_INTERVAL_SECS", " 5 "),
        ]);
        let mut config = RotorConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.rotate_interval_secs, 5);
        assert_eq!(config.targets_file, PathBuf::from("/tmp/terms.txt"));
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = RotorConfig::default();
        let err = config
            .apply_overrides(|k| (k == "ROTOR_BATCH_SIZE").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, RotorError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = RotorConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = RotorConfig::default();
        config.worker.noise_patterns.push("(unclosed".to_string());
        assert!(matches!(config.validate(), Err(RotorError::NoisePattern(_))));
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: RotorConfig = serde_json::from_str(r#"{"batch_size": 3, "worker": {"program": "sh"}}"#).unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.worker.program, "sh");
        assert_eq!(config.worker.constraint_flag, "--starts-with");
        assert_eq!(config.fuzz, FuzzConfig::default());
    }

    #[tokio::test]
    async fn test_config_load_writes_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("rotor.json");
        let manager = ConfigManager::new(path.clone());

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded, RotorConfig::default());
        assert!(path.exists());

        let mut changed = loaded.clone();
        changed.batch_size = 7;
        manager.save(&changed).await.unwrap();
        assert_eq!(manager.load().await.unwrap().batch_size, 7);
    }
}
