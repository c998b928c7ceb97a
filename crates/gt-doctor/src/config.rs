use gt_core::{Town, Version};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "doctor.toml";

// Ten years; keeps the chrono duration in range.
const MAX_THRESHOLD_MINUTES: u64 = 60 * 24 * 365 * 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Tunables read from `<town>/mayor/doctor.toml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoctorConfig {
    pub stuck_threshold_minutes: u64,
    pub drift_ratio: f64,
    pub ephemeral_fraction: f64,
    pub dolt_binary: String,
    pub min_dolt_version: String,
    pub probe_timeout_secs: u64,
    pub skip: Vec<String>,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            stuck_threshold_minutes: 60,
            drift_ratio: 10.0,
            ephemeral_fraction: 0.5,
            dolt_binary: "dolt".to_string(),
            min_dolt_version: "1.82.4".to_string(),
            probe_timeout_secs: 10,
            skip: Vec::new(),
        }
    }
}

impl DoctorConfig {
    pub fn path_for(town: &Town) -> PathBuf {
        town.mayor_dir().join(CONFIG_FILE)
    }

    /// Defaults when the file does not exist; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_for(town: &Town) -> Result<Self, ConfigError> {
        Self::load(&Self::path_for(town))
    }

    pub fn stuck_threshold(&self) -> chrono::Duration {
        let minutes = self.stuck_threshold_minutes.min(MAX_THRESHOLD_MINUTES);
        chrono::Duration::minutes(minutes as i64)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn min_dolt_version(&self) -> Version {
        Version::parse(&self.min_dolt_version)
    }

    pub fn is_skipped(&self, check: &str) -> bool {
        self.skip.iter().any(|name| name == check)
    }
}
