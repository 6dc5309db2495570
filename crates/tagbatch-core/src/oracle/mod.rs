//! Progress signals from the job backend and the job store.
//!
//! Each collaborator sits behind a single-method trait so the control loop
//! can run against stubs. [`ProgressOracle`] applies the configured
//! [`QueryFailurePolicy`] on top of the raw sources.

mod error;
mod redis_queue;
mod store;

pub use error::QueryError;
pub use redis_queue::{queue_key, RedisQueueDepth};
pub use store::{done_path_pattern, SqliteCompletionStore};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::QueryFailurePolicy;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::segment::{count_tracks, Segment};

/// Pending entry count of the analysis work queue.
#[async_trait]
pub trait QueueDepthSource: Send + Sync {
    async fn queue_depth(&self) -> Result<u64, QueryError>;
}

/// Number of `done` job records under an artist folder.
#[async_trait]
pub trait CompletionCountSource: Send + Sync {
    async fn completed_count(&self, segment: &str) -> Result<u64, QueryError>;
}

/// Reads progress signals and applies the query failure policy.
///
/// Readings are `Option<u64>`: `None` only happens under fail-closed, when
/// a query kept failing after retries.
#[derive(Clone)]
pub struct ProgressOracle {
    queue: Arc<dyn QueueDepthSource>,
    store: Arc<dyn CompletionCountSource>,
    music_dir: PathBuf,
    policy: QueryFailurePolicy,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ProgressOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressOracle")
            .field("music_dir", &self.music_dir)
            .field("policy", &self.policy)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ProgressOracle {
    pub fn new(
        queue: Arc<dyn QueueDepthSource>,
        store: Arc<dyn CompletionCountSource>,
        music_dir: impl Into<PathBuf>,
        policy: QueryFailurePolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            store,
            music_dir: music_dir.into(),
            policy,
            retry,
        }
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    pub fn policy(&self) -> QueryFailurePolicy {
        self.policy
    }

    /// Current queue depth.
    pub async fn queue_depth(&self) -> Option<u64> {
        let res = match self.policy {
            QueryFailurePolicy::FailOpen => self.queue.queue_depth().await,
            QueryFailurePolicy::FailClosed => {
                run_with_retry(&self.retry, || self.queue.queue_depth()).await
            }
        };
        self.settle("queue depth", res)
    }

    /// Completed record count for one artist.
    pub async fn completed_count(&self, segment: &str) -> Option<u64> {
        let res = match self.policy {
            QueryFailurePolicy::FailOpen => self.store.completed_count(segment).await,
            QueryFailurePolicy::FailClosed => {
                run_with_retry(&self.retry, || self.store.completed_count(segment)).await
            }
        };
        self.settle("completed count", res)
    }

    /// Eligible tracks on disk for one artist. Runs the walk off the async workers.
    pub async fn total_items(&self, segment: &str) -> u64 {
        let dir = self.music_dir.join(segment);
        match tokio::task::spawn_blocking(move || count_tracks(&dir)).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("counting tracks for '{}' failed: {}", segment, e);
                0
            }
        }
    }

    /// Observe both counts for one artist.
    pub async fn survey(&self, segment: &str) -> Segment {
        let total_items = self.total_items(segment).await;
        let completed_items = if total_items == 0 {
            Some(0)
        } else {
            self.completed_count(segment).await
        };
        Segment {
            name: segment.to_string(),
            total_items,
            completed_items,
        }
    }

    fn settle(&self, what: &str, res: Result<u64, QueryError>) -> Option<u64> {
        match (res, self.policy) {
            (Ok(n), _) => Some(n),
            (Err(e), QueryFailurePolicy::FailOpen) => {
                tracing::warn!("{} query failed, treating as 0: {}", what, e);
                Some(0)
            }
            (Err(e), QueryFailurePolicy::FailClosed) => {
                tracing::warn!("{} query failed after retries, value unknown: {}", what, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Flaky {
        failures_left: AtomicU32,
        value: u64,
    }

    impl Flaky {
        fn new(failures: u32, value: u64) -> Arc<Self> {
            Arc::new(Self {
                failures_left: AtomicU32::new(failures),
                value,
            })
        }

        fn next(&self) -> Result<u64, QueryError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(QueryError::Unavailable("connection refused".into()));
            }
            Ok(self.value)
        }
    }

    #[async_trait]
    impl QueueDepthSource for Flaky {
        async fn queue_depth(&self) -> Result<u64, QueryError> {
            self.next()
        }
    }

    #[async_trait]
    impl CompletionCountSource for Flaky {
        async fn completed_count(&self, _segment: &str) -> Result<u64, QueryError> {
            self.next()
        }
    }

    fn oracle(src: Arc<Flaky>, policy: QueryFailurePolicy) -> ProgressOracle {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        ProgressOracle::new(src.clone(), src, "/nonexistent", policy, retry)
    }

    #[tokio::test]
    async fn fail_open_reads_failure_as_zero() {
        let o = oracle(Flaky::new(1, 42), QueryFailurePolicy::FailOpen);
        assert_eq!(o.queue_depth().await, Some(0));
        assert_eq!(o.queue_depth().await, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_closed_retries_before_trusting() {
        let o = oracle(Flaky::new(2, 42), QueryFailurePolicy::FailClosed);
        assert_eq!(o.queue_depth().await, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_closed_never_reports_zero_on_failure() {
        let o = oracle(Flaky::new(10, 42), QueryFailurePolicy::FailClosed);
        assert_eq!(o.queue_depth().await, None);
        assert_eq!(o.completed_count("Alpha").await, None);
    }

    #[tokio::test]
    async fn survey_skips_store_for_empty_artist() {
        // The store would report 42; an artist with no tracks never asks it.
        let o = oracle(Flaky::new(0, 42), QueryFailurePolicy::FailOpen);
        let seg = o.survey("Nobody").await;
        assert_eq!(seg.total_items, 0);
        assert_eq!(seg.completed_items, Some(0));
    }
}
