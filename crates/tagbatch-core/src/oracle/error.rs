//! Error type for collaborator queries.

/// A queue or store query did not produce a count.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("job backend: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("job store: {0}")]
    Store(#[from] sqlx::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}
