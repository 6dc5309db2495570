//! Block until the analysis queue drains.
//!
//! Sleep-poll on the queue depth: a grace period first so freshly submitted
//! jobs are visible, then one reading per interval until a reading of zero.
//! There is no timeout and no cancellation.

use std::time::Duration;

use crate::oracle::ProgressOracle;

/// What a finished wait observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Queue depth readings taken, including the final zero.
    pub polls: u32,
    /// Readings that were unknown (fail-closed only).
    pub unknown_readings: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionWaiter {
    grace_period: Duration,
    poll_interval: Duration,
}

impl CompletionWaiter {
    pub fn new(grace_period: Duration, poll_interval: Duration) -> Self {
        Self {
            grace_period,
            poll_interval,
        }
    }

    pub async fn wait_for_drain(&self, oracle: &ProgressOracle) -> DrainReport {
        if !self.grace_period.is_zero() {
            tracing::debug!(
                "waiting {}s for submitted jobs to reach the queue",
                self.grace_period.as_secs()
            );
            tokio::time::sleep(self.grace_period).await;
        }

        let mut report = DrainReport::default();
        loop {
            report.polls += 1;
            match oracle.queue_depth().await {
                Some(0) => {
                    tracing::info!("Queue depth: 0 - drained");
                    return report;
                }
                Some(depth) => tracing::info!(
                    "Queue depth: {} - waiting {}s",
                    depth,
                    self.poll_interval.as_secs()
                ),
                None => {
                    report.unknown_readings += 1;
                    tracing::warn!(
                        "Queue depth: unknown - waiting {}s",
                        self.poll_interval.as_secs()
                    );
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
