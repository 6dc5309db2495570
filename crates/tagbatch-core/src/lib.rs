//! tagbatch core: drive a music-tagging analysis backend one artist at a time.
//!
//! Enumerate artist folders, skip the ones already done, submit the rest
//! through the seeding program and wait for the analysis queue to drain
//! before moving on.

pub mod config;
pub mod logging;

pub mod oracle;
pub mod orchestrator;
pub mod processor;
pub mod retry;
pub mod segment;
pub mod submitter;
pub mod waiter;
