//! Layered batch configuration.
//!
//! Precedence, lowest first: built-in defaults, an optional TOML file,
//! environment variables, then CLI overrides applied by the caller.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default progress log location.
pub const DEFAULT_LOG_FILE: &str = "/var/log/tagbatch/batch_process.log";
/// File name of the job store inside `data_dir`.
pub const STORE_FILE_NAME: &str = "music_tagger.db";
/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TAGBATCH_CONFIG";

/// Invalid or missing configuration. Fatal: the batch never starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("MUSIC_DIR is not set (environment, config file or --music-dir)")]
    MissingMusicDir,
    #[error("invalid value {value:?} for {var}: expected {expected}")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("SUBMIT_COMMAND is empty")]
    EmptySubmitCommand,
}

/// What a failed queue/store query means to the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryFailurePolicy {
    /// A failed query reads as zero. A backend outage looks like a drained queue.
    #[default]
    FailOpen,
    /// Retry with backoff; a persistent failure reads as "unknown", never zero.
    FailClosed,
}

impl FromStr for QueryFailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "fail_open" | "open" => Ok(Self::FailOpen),
            "fail-closed" | "fail_closed" | "closed" => Ok(Self::FailClosed),
            _ => Err(()),
        }
    }
}

/// What the orchestrator does after a segment's submission fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitFailurePolicy {
    /// Log the failure and move on to the next artist.
    #[default]
    Continue,
    /// Stop the batch after the failing artist.
    Halt,
}

impl FromStr for SubmitFailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "halt" | "stop" => Ok(Self::Halt),
            _ => Err(()),
        }
    }
}

/// Retry parameters for fail-closed queries (optional `[retry]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per query (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
        }
    }
}

/// Full batch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Library root; each immediate subdirectory is one artist.
    pub music_dir: Option<PathBuf>,
    /// Progress log, appended to and mirrored on stdout.
    pub log_file: PathBuf,
    /// Pause between artists, in seconds.
    pub delay_between_artists_secs: u64,
    /// Queue depth poll interval, in seconds.
    pub poll_interval_secs: u64,
    /// Wait after submission before the first poll, in seconds.
    pub grace_period_secs: u64,
    /// Directory holding the job store.
    pub data_dir: PathBuf,
    pub redis_url: String,
    /// rq queue name; the Redis key is `rq:queue:<name>`.
    pub queue_name: String,
    /// Submission program followed by its leading arguments.
    pub submit_command: Vec<String>,
    /// Forward `--dry-run` to the submission program.
    pub dry_run: bool,
    pub query_failure_policy: QueryFailurePolicy,
    pub submit_failure_policy: SubmitFailurePolicy,
    /// Also pause after an artist that was skipped.
    pub pause_after_skipped: bool,
    pub retry: Option<RetryConfig>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            music_dir: None,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            delay_between_artists_secs: 180,
            poll_interval_secs: 30,
            grace_period_secs: 10,
            data_dir: PathBuf::from("/data"),
            redis_url: "redis://redis:6379".to_string(),
            queue_name: "analysis".to_string(),
            submit_command: vec!["python".to_string(), "seed.py".to_string()],
            dry_run: false,
            query_failure_policy: QueryFailurePolicy::FailOpen,
            submit_failure_policy: SubmitFailurePolicy::Continue,
            pause_after_skipped: true,
            retry: None,
        }
    }
}

impl BatchConfig {
    pub fn delay_between_artists(&self) -> Duration {
        Duration::from_secs(self.delay_between_artists_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Path of the SQLite job store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryPolicy::from)
            .unwrap_or_else(|| RetryPolicy::from(&RetryConfig::default()))
    }

    pub fn require_music_dir(&self) -> Result<&Path, ConfigError> {
        self.music_dir
            .as_deref()
            .ok_or(ConfigError::MissingMusicDir)
    }

    /// Overlay values from environment-style variables. `lookup` returns the
    /// raw value of a variable, if set.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MUSIC_DIR") {
            self.music_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("LOG_FILE") {
            self.log_file = PathBuf::from(v);
        }
        if let Some(v) = get("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DELAY_BETWEEN_ARTISTS") {
            self.delay_between_artists_secs = parse_secs("DELAY_BETWEEN_ARTISTS", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL") {
            self.poll_interval_secs = parse_secs("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = get("GRACE_PERIOD") {
            self.grace_period_secs = parse_secs("GRACE_PERIOD", &v)?;
        }
        if let Some(v) = get("REDIS_URL") {
            self.redis_url = v;
        }
        if let Some(v) = get("QUEUE_NAME") {
            self.queue_name = v.trim().to_string();
        }
        if let Some(v) = get("SUBMIT_COMMAND") {
            self.submit_command = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = get("DRY_RUN") {
            self.dry_run = parse_bool("DRY_RUN", &v)?;
        }
        if let Some(v) = get("PAUSE_AFTER_SKIPPED") {
            self.pause_after_skipped = parse_bool("PAUSE_AFTER_SKIPPED", &v)?;
        }
        if let Some(v) = get("QUERY_FAILURE_POLICY") {
            self.query_failure_policy = v.parse().map_err(|()| ConfigError::InvalidValue {
                var: "QUERY_FAILURE_POLICY",
                value: v.clone(),
                expected: "fail-open or fail-closed",
            })?;
        }
        if let Some(v) = get("SUBMIT_FAILURE_POLICY") {
            self.submit_failure_policy = v.parse().map_err(|()| ConfigError::InvalidValue {
                var: "SUBMIT_FAILURE_POLICY",
                value: v.clone(),
                expected: "continue or halt",
            })?;
        }
        Ok(())
    }

    /// Check invariants that defaults and overlays cannot guarantee.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.require_music_dir()?;
        if self.submit_command.is_empty() {
            return Err(ConfigError::EmptySubmitCommand);
        }
        Ok(())
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            expected: "a whole number of seconds",
        })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            expected: "true or false",
        }),
    }
}

/// Default config file location, if one exists.
pub fn default_config_path() -> Option<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tagbatch").ok()?;
    xdg_dirs.find_config_file("config.toml")
}

/// Read a config file. Unset keys keep their defaults.
pub fn load_file(path: &Path) -> Result<BatchConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let cfg: BatchConfig =
        toml::from_str(&data).with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(cfg)
}

/// Load configuration: explicit file, else `TAGBATCH_CONFIG`, else the XDG
/// default when present; then overlay the process environment.
pub fn load(explicit: Option<&Path>) -> Result<BatchConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(default_config_path);

    let mut cfg = match path {
        Some(path) => load_file(&path)?,
        None => BatchConfig::default(),
    };
    cfg.apply_env(|var| std::env::var(var).ok())?;
    Ok(cfg)
}
