// Configuration loading and parsing (boxline.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire boxline.toml file. Every
/// section is optional; missing sections fall back to defaults so a bare
/// `[season]` table is a usable config.
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    storage: StorageSection,
    #[serde(default)]
    pipeline: PipelineSection,
    #[serde(default)]
    baseline: BaselineSection,
    #[serde(default)]
    season: SeasonSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// SQLite file path; `:memory:` for an ephemeral store.
    pub path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: "boxline.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Games fetched concurrently per batch. 0 means use the number of
    /// available CPU cores.
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    pub batch_pause_ms: u64,
    /// Per-record write attempts before a write is declared permanently
    /// failed.
    pub max_write_attempts: usize,
    /// Base backoff between write attempts, doubled each retry.
    pub base_backoff_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            batch_size: 0,
            batch_pause_ms: 250,
            max_write_attempts: 4,
            base_backoff_ms: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaselineSection {
    /// Minimum plate appearances for a player to enter batting baselines.
    pub min_pa: u32,
    /// Minimum outs recorded for a player to enter pitching baselines.
    pub min_outs: u32,
    /// Baselines older than this are recomputed before use.
    pub staleness_secs: i64,
    /// Refresh baselines every N games processed.
    pub game_interval: u64,
}

impl Default for BaselineSection {
    fn default() -> Self {
        Self {
            min_pa: 50,
            min_outs: 45,
            staleness_secs: 1800,
            game_interval: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeasonSection {
    pub year: u16,
    /// Directory holding schedule.json and per-game box score files.
    pub data_dir: String,
    /// Inclusive date range to process, ISO dates.
    pub start: String,
    pub end: String,
    /// Optional salary CSV (team,season,name,salary).
    pub salary_csv: Option<String>,
}

impl Default for SeasonSection {
    fn default() -> Self {
        Self {
            year: 2025,
            data_dir: "data/games".into(),
            start: "2025-03-27".into(),
            end: "2025-09-28".into(),
            salary_csv: None,
        }
    }
}

/// The assembled application config.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub storage: StorageSection,
    pub pipeline: PipelineSection,
    pub baseline: BaselineSection,
    pub season: SeasonSection,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
                path: path.to_path_buf(),
            })?;
        let file: ConfigFile =
            toml::from_str(&text).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        let config = Config {
            storage: file.storage,
            pipeline: file.pipeline,
            baseline: file.baseline,
            season: file.season,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Effective batch size: configured value, or the number of available
    /// CPU cores when set to 0.
    pub fn effective_batch_size(&self) -> usize {
        if self.pipeline.batch_size > 0 {
            self.pipeline.batch_size
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.path.is_empty() {
            return Err(ConfigError::ValidationError {
                field: "storage.path".into(),
                message: "must not be empty".into(),
            });
        }

        if self.pipeline.max_write_attempts == 0 {
            return Err(ConfigError::ValidationError {
                field: "pipeline.max_write_attempts".into(),
                message: "must be > 0".into(),
            });
        }

        if self.baseline.game_interval == 0 {
            return Err(ConfigError::ValidationError {
                field: "baseline.game_interval".into(),
                message: "must be > 0".into(),
            });
        }

        if self.baseline.staleness_secs <= 0 {
            return Err(ConfigError::ValidationError {
                field: "baseline.staleness_secs".into(),
                message: format!("must be > 0, got {}", self.baseline.staleness_secs),
            });
        }

        for (field, value) in [
            ("season.start", &self.season.start),
            ("season.end", &self.season.end),
        ] {
            if chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
                return Err(ConfigError::ValidationError {
                    field: field.into(),
                    message: format!("must be an ISO date (YYYY-MM-DD), got `{value}`"),
                });
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
