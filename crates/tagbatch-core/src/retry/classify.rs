//! Classify collaborator query errors into retry policy error kinds.

use crate::oracle::QueryError;
use crate::retry::policy::ErrorKind;

/// Classify a sqlx error from the job store.
fn classify_store_error(e: &sqlx::Error) -> ErrorKind {
    match e {
        sqlx::Error::PoolTimedOut => ErrorKind::Timeout,
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            ErrorKind::Connection
        }
        // SQLITE_BUSY / SQLITE_LOCKED while a worker holds the write lock,
        // or the file appearing once the worker initialises it.
        sqlx::Error::Database(_) => ErrorKind::Connection,
        _ => ErrorKind::Other,
    }
}

/// Classify a Redis error. Type and parse errors in a reply are not transient.
fn classify_backend_error(e: &redis::RedisError) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::Timeout
    } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        ErrorKind::Connection
    } else {
        ErrorKind::Other
    }
}

/// Classify a query error into an ErrorKind.
pub fn classify(e: &QueryError) -> ErrorKind {
    match e {
        QueryError::Backend(re) => classify_backend_error(re),
        QueryError::Unavailable(_) => ErrorKind::Connection,
        QueryError::Store(se) => classify_store_error(se),
        QueryError::Malformed(_) => ErrorKind::Other,
    }
}
