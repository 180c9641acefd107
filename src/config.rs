//! Runtime configuration.
//!
//! Every knob has a default, so an empty JSON object (or no file at all) is a
//! valid configuration. Durations are stored as milliseconds to keep the file
//! format flat.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AmoebaError, AmoebaResult, StorageError, ValidationError};

/// Bounds shared by the command constructor, the tuner, and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Minimum number of tokens in a generated command.
    pub cmd_min: usize,
    /// Maximum number of tokens in a generated command.
    pub cmd_max: usize,
    /// Minimum vocabulary sampling percentage.
    pub scope_min: u8,
    /// Maximum vocabulary sampling percentage.
    pub scope_max: u8,
    /// Upper bound on worker threads.
    pub max_threads: usize,
    /// Maximum number of tokens kept from one tokenized output.
    pub line_capacity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            cmd_min: 1,
            cmd_max: 10,
            scope_min: 1,
            scope_max: 100,
            max_threads: 8,
            line_capacity: 100,
        }
    }
}

impl Limits {
    /// Checks that the bounds are internally consistent.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.cmd_min == 0 {
            return Err(ValidationError::InvalidLimits {
                reason: "cmd_min must be at least 1".to_string(),
            });
        }
        if self.cmd_min > self.cmd_max {
            return Err(ValidationError::InvalidLimits {
                reason: format!("cmd_min ({}) exceeds cmd_max ({})", self.cmd_min, self.cmd_max),
            });
        }
        if self.scope_max > 100 || self.scope_min > self.scope_max {
            return Err(ValidationError::InvalidLimits {
                reason: format!(
                    "scope bounds must satisfy 0 <= min <= max <= 100 (got {}..={})",
                    self.scope_min, self.scope_max
                ),
            });
        }
        if self.max_threads == 0 {
            return Err(ValidationError::InvalidLimits {
                reason: "max_threads must be at least 1".to_string(),
            });
        }
        if self.line_capacity == 0 {
            return Err(ValidationError::InvalidLimits {
                reason: "line_capacity must be at least 1".to_string(),
            });
        }
        Ok(self)
    }

    /// Clamps a desired command length into `[cmd_min, cmd_max]`.
    #[must_use]
    pub fn clamp_length(&self, length: i64) -> usize {
        let min = i64::try_from(self.cmd_min).unwrap_or(i64::MAX);
        let max = i64::try_from(self.cmd_max).unwrap_or(i64::MAX);
        usize::try_from(length.clamp(min, max)).unwrap_or(self.cmd_min)
    }

    /// Clamps a sampling percentage into `[scope_min, scope_max]`.
    #[must_use]
    pub fn clamp_scope(&self, scope: i64) -> u8 {
        u8::try_from(scope.clamp(i64::from(self.scope_min), i64::from(self.scope_max)))
            .unwrap_or(self.scope_min)
    }

    /// Clamps a worker count into `[1, max_threads]`.
    #[must_use]
    pub fn clamp_threads(&self, threads: i64) -> usize {
        let max = i64::try_from(self.max_threads).unwrap_or(i64::MAX);
        usize::try_from(threads.clamp(1, max)).unwrap_or(1)
    }
}

/// Reward shaping and redundancy detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Reward for output that is not redundant.
    pub reward: i64,
    /// Penalty subtracted for redundant output.
    pub penalty: i64,
    /// Reward used when the output contains no known word.
    pub default_reward: i64,
    /// Similarity percentage at or above which output is redundant.
    pub redundancy_threshold: f32,
    /// Keep redundant lines in the observation store.
    pub store_redundant: bool,
    /// Number of rewards kept by the trend tracker.
    pub trend_window: usize,
    /// Minimum difference between half-window means to report a trend.
    pub trend_epsilon: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            reward: 10,
            penalty: 1,
            default_reward: 1,
            redundancy_threshold: 75.0,
            store_redundant: true,
            trend_window: 10,
            trend_epsilon: 0.5,
        }
    }
}

/// Execution sandbox settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Command interpreter invoked as `<shell> -c <command>`.
    pub shell: PathBuf,
    /// Wall-clock budget before escalation starts (ms).
    pub runtime_budget_ms: u64,
    /// Poll tick of the output loop, also the escalation retry interval (ms).
    pub poll_interval_ms: u64,
    /// Number of SIGKILL attempts after the initial SIGTERM.
    pub kill_attempts: u32,
    /// Start escalation when global shutdown is requested.
    pub escalate_on_shutdown: bool,
    /// Captured output beyond this many bytes is read and discarded.
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            runtime_budget_ms: 10_000,
            poll_interval_ms: 100,
            kill_attempts: 3,
            escalate_on_shutdown: true,
            max_output_bytes: 1 << 20,
        }
    }
}

impl SandboxConfig {
    /// Runtime budget as a `Duration`.
    #[must_use]
    pub const fn runtime_budget(&self) -> Duration {
        Duration::from_millis(self.runtime_budget_ms)
    }

    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Worker pool and tuner settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads (and concurrency permits).
    pub workers: usize,
    /// Initial desired command length.
    pub default_length: usize,
    /// Initial sampling scope percentage.
    pub default_scope: u8,
    /// Interval between tuner adjustments (ms).
    pub tuner_interval_ms: u64,
    /// Sleep when no command can be built (ms).
    pub idle_backoff_ms: u64,
    /// Slice used while waiting for a concurrency permit (ms).
    pub permit_poll_ms: u64,
    /// Stop after this many executed commands.
    pub max_cycles: Option<u64>,
    /// Bytes of command output shown in logs.
    pub output_preview_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            default_length: 1,
            default_scope: 50,
            tuner_interval_ms: 1_500,
            idle_backoff_ms: 50,
            permit_poll_ms: 200,
            max_cycles: None,
            output_preview_bytes: 200,
        }
    }
}

impl RuntimeConfig {
    /// Tuner interval as a `Duration`.
    #[must_use]
    pub const fn tuner_interval(&self) -> Duration {
        Duration::from_millis(self.tuner_interval_ms)
    }

    /// Idle backoff as a `Duration`.
    #[must_use]
    pub const fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    /// Permit wait slice as a `Duration`.
    #[must_use]
    pub const fn permit_poll(&self) -> Duration {
        Duration::from_millis(self.permit_poll_ms)
    }
}

/// Snapshot file locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the snapshot files.
    pub data_dir: PathBuf,
    /// Vocabulary file name.
    pub tokens_file: String,
    /// Association file name.
    pub values_file: String,
    /// Observation file name.
    pub observations_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            tokens_file: "tokens.txt".to_string(),
            values_file: "values.csv".to_string(),
            observations_file: "observations.csv".to_string(),
        }
    }
}

/// Vocabulary seeding from a PATH-like directory list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Maximum additions per directory (0 = unlimited).
    pub max_per_dir: usize,
    /// Give up on a directory after this long (ms, 0 = no timeout).
    pub dir_timeout_ms: u64,
    /// Ignore symbolic links.
    pub skip_symlinks: bool,
    /// Log progress every N processed entries (0 = never).
    pub log_every: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            max_per_dir: 5_000,
            dir_timeout_ms: 8_000,
            skip_symlinks: true,
            log_every: 200,
        }
    }
}

impl SeedConfig {
    /// Per-directory timeout, `None` when disabled.
    #[must_use]
    pub const fn dir_timeout(&self) -> Option<Duration> {
        if self.dir_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.dir_timeout_ms))
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmoebaConfig {
    /// Bounds.
    pub limits: Limits,
    /// Learning.
    pub learning: LearningConfig,
    /// Sandbox.
    pub sandbox: SandboxConfig,
    /// Worker pool.
    pub runtime: RuntimeConfig,
    /// Snapshot files.
    pub storage: StorageConfig,
    /// Seeding.
    pub seed: SeedConfig,
}

impl AmoebaConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> AmoebaResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            AmoebaError::Validation(ValidationError::InvalidConfig {
                field: "file",
                reason: format!("{}: {e}", path.display()),
            })
        })
    }

    /// Validates cross-field constraints.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let limits = self.limits.validate()?;

        if self.learning.trend_window < 2 {
            return Err(ValidationError::InvalidConfig {
                field: "learning.trend_window",
                reason: format!("must be at least 2 (got {})", self.learning.trend_window),
            });
        }
        if !(0.0..=100.0).contains(&self.learning.redundancy_threshold) {
            return Err(ValidationError::InvalidConfig {
                field: "learning.redundancy_threshold",
                reason: format!("must be a percentage (got {})", self.learning.redundancy_threshold),
            });
        }
        if self.learning.penalty < 0 || self.learning.reward < 0 {
            return Err(ValidationError::InvalidConfig {
                field: "learning.reward",
                reason: "reward and penalty are magnitudes and must be non-negative".to_string(),
            });
        }
        if self.sandbox.poll_interval_ms == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "sandbox.poll_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.runtime.workers == 0 || self.runtime.workers > limits.max_threads {
            return Err(ValidationError::InvalidConfig {
                field: "runtime.workers",
                reason: format!("must be in 1..={} (got {})", limits.max_threads, self.runtime.workers),
            });
        }
        if self.runtime.permit_poll_ms == 0 || self.runtime.tuner_interval_ms == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "runtime",
                reason: "permit_poll_ms and tuner_interval_ms must be at least 1".to_string(),
            });
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AmoebaConfig::default().validate().is_ok());
    }

    #[test]
    fn clamps_follow_bounds() {
        let limits = Limits::default();
        assert_eq!(limits.clamp_length(-4), 1);
        assert_eq!(limits.clamp_length(4), 4);
        assert_eq!(limits.clamp_length(400), 10);
        assert_eq!(limits.clamp_scope(0), 1);
        assert_eq!(limits.clamp_scope(250), 100);
        assert_eq!(limits.clamp_threads(0), 1);
        assert_eq!(limits.clamp_threads(64), 8);
    }

    #[test]
    fn rejects_inverted_limits() {
        let limits = Limits {
            cmd_min: 5,
            cmd_max: 2,
            ..Limits::default()
        };
        assert!(matches!(limits.validate(), Err(ValidationError::InvalidLimits { .. })));

        let limits = Limits {
            scope_min: 60,
            scope_max: 40,
            ..Limits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn rejects_too_many_workers() {
        let mut config = AmoebaConfig::default();
        config.runtime.workers = 32;
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("runtime.workers"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amoeba.json");
        std::fs::write(&path, r#"{ "sandbox": { "runtime_budget_ms": 250 }, "runtime": { "workers": 2 } }"#)
            .unwrap();

        let config = AmoebaConfig::from_json_file(&path).unwrap().validate().unwrap();
        assert_eq!(config.sandbox.runtime_budget(), Duration::from_millis(250));
        assert_eq!(config.sandbox.kill_attempts, 3);
        assert_eq!(config.runtime.workers, 2);
        assert_eq!(config.storage.tokens_file, "tokens.txt");
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = AmoebaConfig::from_json_file(&path).unwrap_err();
        assert!(err.is_validation());
    }
}
