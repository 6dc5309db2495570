//! Queue depth straight from Redis: `LLEN rq:queue:<name>`.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::fmt;
use tokio::sync::Mutex;

use super::{QueryError, QueueDepthSource};

/// Redis key rq uses for a named queue.
pub fn queue_key(queue_name: &str) -> String {
    format!("rq:queue:{queue_name}")
}

/// Reads the depth of an rq queue.
///
/// The connection is established on first use and dropped after any error,
/// so a backend that was down at startup (or restarted mid-run) is picked up
/// again on the next poll.
pub struct RedisQueueDepth {
    client: redis::Client,
    key: String,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl fmt::Debug for RedisQueueDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQueueDepth")
            .field("key", &self.key)
            .field("connection", &"MultiplexedConnection")
            .finish()
    }
}

impl RedisQueueDepth {
    /// Fails only on a malformed URL; no connection is made here.
    pub fn new(redis_url: &str, queue_name: &str) -> Result<Self, QueryError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key: queue_key(queue_name),
            conn: Mutex::new(None),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueryError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        tracing::debug!("connected to job backend for {}", self.key);
        *guard = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl QueueDepthSource for RedisQueueDepth {
    async fn queue_depth(&self) -> Result<u64, QueryError> {
        let mut conn = self.connection().await?;
        let res: redis::RedisResult<u64> = conn.llen(self.key.as_str()).await;
        match res {
            Ok(depth) => Ok(depth),
            Err(e) => {
                *self.conn.lock().await = None;
                Err(e.into())
            }
        }
    }
}
