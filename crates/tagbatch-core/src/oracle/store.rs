//! Completed-record counts from the worker's SQLite job store (read-only).

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{CompletionCountSource, QueryError};

/// `LIKE` pattern matching any path with `segment` as a whole path component.
///
/// `%`, `_` and the escape character itself are escaped so artist names such
/// as `100%_Pure` only match literally.
pub fn done_path_pattern(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len() + 4);
    for c in segment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("%/{escaped}/%")
}

/// Read-only handle to the job store.
///
/// The pool connects lazily: a store that does not exist yet reads as a
/// query error on first use rather than failing construction.
#[derive(Debug, Clone)]
pub struct SqliteCompletionStore {
    path: PathBuf,
    pool: Pool<Sqlite>,
}

impl SqliteCompletionStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);
        Self { path, pool }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CompletionCountSource for SqliteCompletionStore {
    async fn completed_count(&self, segment: &str) -> Result<u64, QueryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM jobs
            WHERE status = 'done' AND path LIKE ?1 ESCAPE '\'
            "#,
        )
        .bind(done_path_pattern(segment))
        .fetch_one(&self.pool)
        .await?;

        u64::try_from(count).map_err(|_| QueryError::Malformed(format!("negative count {count}")))
    }
}
