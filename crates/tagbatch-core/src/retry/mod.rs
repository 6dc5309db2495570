//! Retry and backoff policy for collaborator queries.
//!
//! Only used under the fail-closed query policy: the queue and store
//! adapters are retried with capped exponential backoff before a reading
//! is declared unknown.

mod classify;
mod policy;
mod run;

pub use classify::classify;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
