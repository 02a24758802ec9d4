//! Exception event stream: one named topic, delivered in publish order.
//!
//! Provides `StreamConsumer` / `StreamPublisher` traits with implementations for:
//! - **PostgreSQL**: `stream_messages` log plus per-group committed offsets in
//!   `stream_offsets`. Delivery is at-least-once: anything fetched but not yet
//!   committed is delivered again after a restart. A group seen for the first
//!   time starts at the head of the log, not the beginning. Every write must go
//!   through `PgTopicPublisher`, which holds a per-topic lock until commit.
//! - **Channel**: in-process bounded queue for dev mode and tests.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::StreamConfig;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stream closed")]
    Closed,
}

/// One raw message as delivered by the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub offset: i64,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait StreamConsumer: Send {
    /// Wait for the next message. `Ok(None)` means the stream has ended for good.
    async fn next_message(&mut self) -> Result<Option<StreamMessage>, StreamError>;

    /// Record that `message` has been handled.
    async fn commit(&mut self, message: &StreamMessage) -> Result<(), StreamError>;

    fn topic(&self) -> &str;
}

#[async_trait]
pub trait StreamPublisher: Send + Sync {
    /// Append a payload to the topic, returning its offset.
    async fn publish(&self, payload: &[u8]) -> Result<i64, StreamError>;

    fn topic(&self) -> &str;
}

// ============================================================================
// PostgreSQL topic log
// ============================================================================

pub struct PgTopicConsumer {
    pool: PgPool,
    topic: String,
    group_id: String,
    position: i64,
    poll_interval: Duration,
    batch_size: i64,
    buffer: VecDeque<StreamMessage>,
}

impl PgTopicConsumer {
    /// Join `config.group_id` on `config.topic`, resuming from its committed offset.
    pub async fn subscribe(pool: PgPool, config: &StreamConfig) -> Result<Self, StreamError> {
        let committed: Option<i64> = sqlx::query_scalar(
            "SELECT last_offset FROM stream_offsets WHERE group_id = $1 AND topic = $2",
        )
        .bind(&config.group_id)
        .bind(&config.topic)
        .fetch_optional(&pool)
        .await?;

        let position = match committed {
            Some(offset) => offset,
            None => {
                let head: i64 = sqlx::query_scalar(
                    "SELECT COALESCE(MAX(id), 0)::bigint FROM stream_messages WHERE topic = $1",
                )
                .bind(&config.topic)
                .fetch_one(&pool)
                .await?;

                sqlx::query(
                    r#"
                    INSERT INTO stream_offsets (group_id, topic, last_offset)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (group_id, topic) DO NOTHING
                    "#,
                )
                .bind(&config.group_id)
                .bind(&config.topic)
                .bind(head)
                .execute(&pool)
                .await?;
                head
            }
        };

        tracing::info!(
            topic = %config.topic,
            group_id = %config.group_id,
            offset = position,
            "Subscribed to stream"
        );

        Ok(Self {
            pool,
            topic: config.topic.clone(),
            group_id: config.group_id.clone(),
            position,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            batch_size: i64::from(config.batch_size),
            buffer: VecDeque::new(),
        })
    }

    async fn fetch_batch(&mut self) -> Result<(), StreamError> {
        let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as(
            r#"
            SELECT id, payload
            FROM stream_messages
            WHERE topic = $1 AND id > $2
            ORDER BY id
            LIMIT $3
            "#,
        )
        .bind(&self.topic)
        .bind(self.position)
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await?;

        if let Some((last, _)) = rows.last() {
            self.position = *last;
        }
        self.buffer.extend(
            rows.into_iter()
                .map(|(offset, payload)| StreamMessage { offset, payload }),
        );
        Ok(())
    }
}

#[async_trait]
impl StreamConsumer for PgTopicConsumer {
    async fn next_message(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        loop {
            if let Some(message) = self.buffer.pop_front() {
                return Ok(Some(message));
            }
            self.fetch_batch().await?;
            if self.buffer.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    async fn commit(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
        sqlx::query(
            r#"
            INSERT INTO stream_offsets (group_id, topic, last_offset)
            VALUES ($1, $2, $3)
            ON CONFLICT (group_id, topic) DO UPDATE
            SET last_offset = GREATEST(stream_offsets.last_offset, EXCLUDED.last_offset),
                updated_at = NOW()
            "#,
        )
        .bind(&self.group_id)
        .bind(&self.topic)
        .bind(message.offset)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

#[derive(Debug, Clone)]
pub struct PgTopicPublisher {
    pool: PgPool,
    topic: String,
}

impl PgTopicPublisher {
    pub fn new(pool: PgPool, topic: impl Into<String>) -> Self {
        Self {
            pool,
            topic: topic.into(),
        }
    }
}

/// Append one message inside the caller's transaction.
///
/// Takes a per-topic transaction-scoped advisory lock before the id is drawn,
/// so ids on a topic become visible in allocation order. Consumers never look
/// behind their position, which relies on this.
pub(crate) async fn append_locked(
    conn: &mut PgConnection,
    topic: &str,
    payload: &[u8],
) -> Result<i64, sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
        .bind(topic)
        .execute(&mut *conn)
        .await?;

    sqlx::query_scalar("INSERT INTO stream_messages (topic, payload) VALUES ($1, $2) RETURNING id")
        .bind(topic)
        .bind(payload)
        .fetch_one(&mut *conn)
        .await
}

#[async_trait]
impl StreamPublisher for PgTopicPublisher {
    async fn publish(&self, payload: &[u8]) -> Result<i64, StreamError> {
        let mut tx = self.pool.begin().await?;
        let id = append_locked(&mut *tx, &self.topic, payload).await?;
        tx.commit().await?;
        Ok(id)
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

// ============================================================================
// In-process channel
// ============================================================================

pub struct ChannelPublisher {
    tx: mpsc::Sender<StreamMessage>,
    topic: String,
    next_offset: AtomicI64,
}

pub struct ChannelConsumer {
    rx: mpsc::Receiver<StreamMessage>,
    topic: String,
}

/// Build a connected publisher/consumer pair. The consumer sees the end of the
/// stream once every publisher clone has been dropped.
pub fn channel_stream(
    topic: impl Into<String>,
    capacity: usize,
) -> (ChannelPublisher, ChannelConsumer) {
    let topic = topic.into();
    let (tx, rx) = mpsc::channel(capacity);
    (
        ChannelPublisher {
            tx,
            topic: topic.clone(),
            next_offset: AtomicI64::new(0),
        },
        ChannelConsumer { rx, topic },
    )
}

#[async_trait]
impl StreamPublisher for ChannelPublisher {
    async fn publish(&self, payload: &[u8]) -> Result<i64, StreamError> {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx
            .send(StreamMessage {
                offset,
                payload: payload.to_vec(),
            })
            .await
            .map_err(|_| StreamError::Closed)?;
        Ok(offset)
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl StreamConsumer for ChannelConsumer {
    async fn next_message(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        Ok(self.rx.recv().await)
    }

    async fn commit(&mut self, _message: &StreamMessage) -> Result<(), StreamError> {
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

// ============================================================================
// TESTS
// ============================================================================
