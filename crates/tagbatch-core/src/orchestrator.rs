//! Top-level batch loop: one artist at a time, paced, drain-gated.
//!
//! Artists are enumerated once per run and processed in order. Nothing is
//! checkpointed; a restarted run walks the whole list again and relies on
//! the skip checks to pass over finished artists.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BatchConfig, SubmitFailurePolicy};
use crate::oracle::{ProgressOracle, RedisQueueDepth, SqliteCompletionStore};
use crate::processor::{SegmentOutcome, SegmentProcessor};
use crate::segment::{list_segments, LibraryError, Segment};
use crate::submitter::CommandSubmitter;
use crate::waiter::CompletionWaiter;

/// Fatal batch errors; anything else stays inside its artist.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error("halting batch: submission for '{segment}' {reason}")]
    SubmissionHalted { segment: String, reason: String },
}

/// Loop settings that are not part of an individual artist's processing.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub delay_between_segments: Duration,
    pub pause_after_skipped: bool,
    pub submit_failure_policy: SubmitFailurePolicy,
    /// Restrict the run to these artists; empty means all.
    pub only: Vec<String>,
}

impl From<&BatchConfig> for BatchOptions {
    fn from(cfg: &BatchConfig) -> Self {
        Self {
            delay_between_segments: cfg.delay_between_artists(),
            pause_after_skipped: cfg.pause_after_skipped,
            submit_failure_policy: cfg.submit_failure_policy,
            only: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRecord {
    pub name: String,
    pub outcome: SegmentOutcome,
}

/// Everything one run did, in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub segments: Vec<SegmentRecord>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.segments
            .iter()
            .filter(|r| !r.outcome.was_skipped())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.segments
            .iter()
            .filter(|r| r.outcome.was_skipped())
            .count()
    }

    pub fn failed_submissions(&self) -> usize {
        self.segments
            .iter()
            .filter(|r| r.outcome.failed_submission().is_some())
            .count()
    }
}

#[derive(Debug)]
pub struct BatchOrchestrator {
    music_dir: PathBuf,
    processor: SegmentProcessor,
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(music_dir: impl Into<PathBuf>, processor: SegmentProcessor, options: BatchOptions) -> Self {
        Self {
            music_dir: music_dir.into(),
            processor,
            options,
        }
    }

    /// Wire the production collaborators: Redis queue, SQLite store, seeding program.
    pub fn from_config(cfg: &BatchConfig) -> Result<Self> {
        cfg.validate()?;
        let music_dir = cfg.require_music_dir()?.to_path_buf();

        let queue = RedisQueueDepth::new(&cfg.redis_url, &cfg.queue_name)
            .context("invalid REDIS_URL")?;
        let store = SqliteCompletionStore::open(cfg.store_path());
        tracing::debug!(
            "queue key {}, job store {}",
            queue.key(),
            store.path().display()
        );

        let oracle = ProgressOracle::new(
            Arc::new(queue),
            Arc::new(store),
            &music_dir,
            cfg.query_failure_policy,
            cfg.retry_policy(),
        );
        let submitter = CommandSubmitter::from_command_line(&cfg.submit_command, cfg.dry_run)
            .context("SUBMIT_COMMAND is empty")?;
        let waiter = CompletionWaiter::new(cfg.grace_period(), cfg.poll_interval());

        let processor = SegmentProcessor::new(oracle, Arc::new(submitter), waiter);
        Ok(Self::new(music_dir, processor, BatchOptions::from(cfg)))
    }

    pub fn with_only(mut self, only: Vec<String>) -> Self {
        self.options.only = only;
        self
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    pub fn oracle(&self) -> &ProgressOracle {
        self.processor.oracle()
    }

    /// Enumerate artists, applying the `only` filter.
    pub fn segments(&self) -> Result<Vec<String>, LibraryError> {
        let mut names = list_segments(&self.music_dir)?;
        if !self.options.only.is_empty() {
            for wanted in &self.options.only {
                if !names.contains(wanted) {
                    tracing::warn!("artist folder not found: '{}'", wanted);
                }
            }
            names.retain(|n| self.options.only.contains(n));
        }
        Ok(names)
    }

    /// Counts and derived status of every artist, without submitting anything.
    pub async fn survey(&self) -> Result<Vec<Segment>, LibraryError> {
        let mut out = Vec::new();
        for name in self.segments()? {
            out.push(self.oracle().survey(&name).await);
        }
        Ok(out)
    }

    pub async fn run(&self) -> Result<BatchReport, BatchError> {
        let names = self.segments()?;
        let total = names.len();
        tracing::info!(
            "Starting batch: {} artists in {}",
            total,
            self.music_dir.display()
        );

        let mut report = BatchReport::default();
        for (idx, name) in names.iter().enumerate() {
            tracing::info!("[{}/{}] Artist: '{}'", idx + 1, total, name);
            let outcome = self.processor.process(name).await;

            let halt_reason = match (outcome.failed_submission(), self.options.submit_failure_policy) {
                (Some(result), SubmitFailurePolicy::Halt) => Some(result.to_string()),
                _ => None,
            };
            let skipped = outcome.was_skipped();
            report.segments.push(SegmentRecord {
                name: name.clone(),
                outcome,
            });

            if let Some(reason) = halt_reason {
                return Err(BatchError::SubmissionHalted {
                    segment: name.clone(),
                    reason,
                });
            }

            let is_last = idx + 1 == total;
            if !is_last && (self.options.pause_after_skipped || !skipped) {
                let delay = self.options.delay_between_segments;
                tracing::info!("Sleeping {}s before next artist", delay.as_secs());
                tokio::time::sleep(delay).await;
            }
        }

        tracing::info!(
            "Batch complete: {} processed, {} skipped, {} failed submissions",
            report.processed(),
            report.skipped(),
            report.failed_submissions()
        );
        Ok(report)
    }
}
