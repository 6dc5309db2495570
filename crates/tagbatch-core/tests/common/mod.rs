//! Deterministic collaborators for orchestrator tests.
//!
//! All three stubs append to one shared [`EventLog`], so tests can check the
//! order in which the loop submitted work and read queue depths.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tagbatch_core::config::{QueryFailurePolicy, SubmitFailurePolicy};
use tagbatch_core::logging::BracketedTimestamp;
use tagbatch_core::oracle::{CompletionCountSource, ProgressOracle, QueryError, QueueDepthSource};
use tagbatch_core::orchestrator::{BatchOptions, BatchOrchestrator};
use tagbatch_core::processor::SegmentProcessor;
use tagbatch_core::retry::RetryPolicy;
use tagbatch_core::submitter::{JobSubmitter, SubmissionResult};
use tagbatch_core::waiter::CompletionWaiter;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Submitted(String),
    Depth(u64),
    DepthFailed,
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, e: Event) {
        self.0.lock().unwrap().push(e);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Submitted(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

/// Queue whose readings are scripted; once the script runs out it reads 0.
/// `None` in a script fails that query.
#[derive(Clone)]
pub struct ScriptedQueue {
    readings: Arc<Mutex<VecDeque<Option<u64>>>>,
    log: EventLog,
}

impl ScriptedQueue {
    pub fn new(log: &EventLog) -> Self {
        Self {
            readings: Arc::default(),
            log: log.clone(),
        }
    }

    pub fn push_script(&self, readings: &[Option<u64>]) {
        self.readings.lock().unwrap().extend(readings.iter().copied());
    }
}

#[async_trait]
impl QueueDepthSource for ScriptedQueue {
    async fn queue_depth(&self) -> Result<u64, QueryError> {
        let next = self.readings.lock().unwrap().pop_front().unwrap_or(Some(0));
        match next {
            Some(n) => {
                self.log.push(Event::Depth(n));
                Ok(n)
            }
            None => {
                self.log.push(Event::DepthFailed);
                Err(QueryError::Unavailable("connection refused".into()))
            }
        }
    }
}

/// Completed counts per artist, settable while the batch runs.
#[derive(Clone, Default)]
pub struct Completions(Arc<Mutex<HashMap<String, u64>>>);

impl Completions {
    pub fn set(&self, artist: &str, done: u64) {
        self.0.lock().unwrap().insert(artist.to_string(), done);
    }
}

#[async_trait]
impl CompletionCountSource for Completions {
    async fn completed_count(&self, segment: &str) -> Result<u64, QueryError> {
        Ok(self.0.lock().unwrap().get(segment).copied().unwrap_or(0))
    }
}

/// A scripted backend reaction to one submission.
#[derive(Clone)]
pub struct Reaction {
    pub depths: Vec<Option<u64>>,
    pub completed_after: u64,
    pub result: SubmissionResult,
}

/// Records submissions and plays the backend: on submit it scripts the
/// queue's drain and the store's completed count for that artist.
#[derive(Clone)]
pub struct RecordingSubmitter {
    log: EventLog,
    queue: ScriptedQueue,
    completions: Completions,
    reactions: Arc<Mutex<HashMap<String, Reaction>>>,
}

impl RecordingSubmitter {
    pub fn new(log: &EventLog, queue: &ScriptedQueue, completions: &Completions) -> Self {
        Self {
            log: log.clone(),
            queue: queue.clone(),
            completions: completions.clone(),
            reactions: Arc::default(),
        }
    }

    pub fn on(&self, artist: &str, reaction: Reaction) {
        self.reactions
            .lock()
            .unwrap()
            .insert(artist.to_string(), reaction);
    }
}

#[async_trait]
impl JobSubmitter for RecordingSubmitter {
    async fn submit(&self, segment: &str) -> SubmissionResult {
        self.log.push(Event::Submitted(segment.to_string()));
        let reaction = self.reactions.lock().unwrap().get(segment).cloned();
        match reaction {
            Some(r) => {
                self.queue.push_script(&r.depths);
                self.completions.set(segment, r.completed_after);
                r.result
            }
            None => SubmissionResult::Succeeded,
        }
    }
}

/// Create `count` empty tracks for `artist` under `root`.
pub fn add_tracks(root: &Path, artist: &str, count: usize) {
    let album = root.join(artist).join("Album");
    fs::create_dir_all(&album).unwrap();
    for i in 0..count {
        fs::write(album.join(format!("{:02}.mp3", i + 1)), b"").unwrap();
    }
}

pub const GRACE: Duration = Duration::from_secs(10);
pub const POLL: Duration = Duration::from_secs(30);
pub const DELAY: Duration = Duration::from_secs(180);

/// Everything a test needs to drive and inspect one batch.
pub struct Harness {
    pub log: EventLog,
    pub queue: ScriptedQueue,
    pub completions: Completions,
    pub submitter: RecordingSubmitter,
}

impl Harness {
    pub fn new() -> Self {
        let log = EventLog::default();
        let queue = ScriptedQueue::new(&log);
        let completions = Completions::default();
        let submitter = RecordingSubmitter::new(&log, &queue, &completions);
        Self {
            log,
            queue,
            completions,
            submitter,
        }
    }

    pub fn orchestrator(&self, music_dir: &Path, policy: QueryFailurePolicy) -> BatchOrchestrator {
        self.orchestrator_with(
            music_dir,
            policy,
            BatchOptions {
                delay_between_segments: DELAY,
                pause_after_skipped: true,
                submit_failure_policy: SubmitFailurePolicy::Continue,
                only: Vec::new(),
            },
        )
    }

    pub fn orchestrator_with(
        &self,
        music_dir: &Path,
        policy: QueryFailurePolicy,
        options: BatchOptions,
    ) -> BatchOrchestrator {
        let oracle = ProgressOracle::new(
            Arc::new(self.queue.clone()),
            Arc::new(self.completions.clone()),
            music_dir,
            policy,
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(1),
            },
        );
        let processor = SegmentProcessor::new(
            oracle,
            Arc::new(self.submitter.clone()),
            CompletionWaiter::new(GRACE, POLL),
        );
        BatchOrchestrator::new(music_dir, processor, options)
    }
}

/// In-memory sink for the production log format.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl LogCapture {
    /// Route this thread's `info` and above here until the guard drops.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .event_format(BracketedTimestamp)
            .with_max_level(tracing::Level::INFO)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Captured messages with the `[YYYY-MM-DD HH:MM:SS] ` prefix removed.
    pub fn messages(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| {
                assert!(line.starts_with('[') && &line[20..22] == "] ", "{line}");
                line[22..].to_string()
            })
            .collect()
    }
}

