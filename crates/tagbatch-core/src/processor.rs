//! Per-artist state machine.
//!
//! ```text
//! Start ─┬─ total == 0 ───────────────► NoWork       (SKIP)
//!        ├─ completed >= total > 0 ───► AlreadyDone  (SKIP)
//!        └─ otherwise ─► Submitting ─► Waiting ─► Done
//! ```
//!
//! There is no retry state. An artist whose completed count is still short
//! of its total after the queue drains is reported `Done` with the partial
//! count.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::oracle::ProgressOracle;
use crate::segment::SegmentStatus;
use crate::submitter::{JobSubmitter, SubmissionResult};
use crate::waiter::CompletionWaiter;

/// Terminal state of one artist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SegmentOutcome {
    NoWork,
    AlreadyDone {
        completed: u64,
        total: u64,
    },
    Done {
        /// `None` if the store could not be read after the wait.
        completed: Option<u64>,
        total: u64,
        submission: SubmissionResult,
        polls: u32,
    },
}

impl SegmentOutcome {
    pub fn was_skipped(&self) -> bool {
        matches!(self, SegmentOutcome::NoWork | SegmentOutcome::AlreadyDone { .. })
    }

    /// The submission result, when one was attempted and did not succeed.
    pub fn failed_submission(&self) -> Option<&SubmissionResult> {
        match self {
            SegmentOutcome::Done { submission, .. } if !submission.is_success() => Some(submission),
            _ => None,
        }
    }
}

/// `7` or `?` for an unknown count.
struct Count(Option<u64>);

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, "{}", n),
            None => write!(f, "?"),
        }
    }
}

/// Runs one artist through skip detection, submission and drain.
pub struct SegmentProcessor {
    oracle: ProgressOracle,
    submitter: Arc<dyn JobSubmitter>,
    waiter: CompletionWaiter,
}

impl fmt::Debug for SegmentProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentProcessor")
            .field("oracle", &self.oracle)
            .field("waiter", &self.waiter)
            .finish_non_exhaustive()
    }
}

impl SegmentProcessor {
    pub fn new(
        oracle: ProgressOracle,
        submitter: Arc<dyn JobSubmitter>,
        waiter: CompletionWaiter,
    ) -> Self {
        Self {
            oracle,
            submitter,
            waiter,
        }
    }

    pub fn oracle(&self) -> &ProgressOracle {
        &self.oracle
    }

    pub async fn process(&self, name: &str) -> SegmentOutcome {
        let segment = self.oracle.survey(name).await;
        let total = segment.total_items;

        match segment.status() {
            SegmentStatus::NoWork => {
                tracing::info!("SKIP: '{}' - no music files found", name);
                return SegmentOutcome::NoWork;
            }
            SegmentStatus::AlreadyComplete => {
                let completed = segment.completed_items.unwrap_or(total);
                tracing::info!(
                    "SKIP: '{}' - already processed ({}/{} tracks)",
                    name,
                    completed,
                    total
                );
                return SegmentOutcome::AlreadyDone { completed, total };
            }
            SegmentStatus::Pending => {}
        }

        tracing::info!(
            "PROCESSING: '{}' - {}/{} tracks done, submitting",
            name,
            Count(segment.completed_items),
            total
        );
        let submission = self.submitter.submit(name).await;
        if !submission.is_success() {
            tracing::warn!("submission for '{}' {}", name, submission);
        }

        // Even a failed submission may have enqueued part of the artist.
        let drain = self.waiter.wait_for_drain(&self.oracle).await;

        let completed = self.oracle.completed_count(name).await;
        tracing::info!("DONE: '{}' - {}/{}", name, Count(completed), total);

        SegmentOutcome::Done {
            completed,
            total,
            submission,
            polls: drain.polls,
        }
    }
}
