//! Summary cache: append-only store of enrichment results keyed by exception kind.
//!
//! Provides a `SummaryCache` trait with implementations for:
//! - **PostgreSQL**: durable table, newest row per kind wins
//! - **Memory**: process-local store for dev mode and tests

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::StorageError;
use crate::models::{RecordId, SummaryRecord};

#[async_trait]
pub trait SummaryCache: Send + Sync {
    /// Most recently appended record for `kind`, if any. Never mutates the store.
    async fn lookup_latest(&self, kind: &str) -> Result<Option<SummaryRecord>, StorageError>;

    /// Persist a new record. Existing records are never overwritten or removed.
    async fn append(&self, record: &SummaryRecord) -> Result<RecordId, StorageError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// PgSummaryCache
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgSummaryCache {
    pool: PgPool,
    lookup_sql: String,
    insert_sql: String,
}

impl PgSummaryCache {
    /// `table` must already have passed `config::is_sql_identifier`.
    pub fn new(pool: PgPool, table: &str) -> Self {
        let lookup_sql = format!(
            r#"
            SELECT exception_name, exception_date, exception_file,
                   exception_method, exception_line, exception_summary
            FROM {table}
            WHERE exception_name = $1
            ORDER BY id DESC
            LIMIT 1
            "#
        );
        let insert_sql = format!(
            r#"
            INSERT INTO {table}
                (exception_name, exception_date, exception_file,
                 exception_method, exception_line, exception_summary)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#
        );

        Self {
            pool,
            lookup_sql,
            insert_sql,
        }
    }
}

#[async_trait]
impl SummaryCache for PgSummaryCache {
    async fn lookup_latest(&self, kind: &str) -> Result<Option<SummaryRecord>, StorageError> {
        let record = sqlx::query_as::<_, SummaryRecord>(&self.lookup_sql)
            .bind(kind)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn append(&self, record: &SummaryRecord) -> Result<RecordId, StorageError> {
        let id: i64 = sqlx::query_scalar(&self.insert_sql)
            .bind(&record.kind)
            .bind(&record.created_at)
            .bind(&record.source_file)
            .bind(&record.source_method)
            .bind(&record.source_line)
            .bind(&record.summary_text)
            .fetch_one(&self.pool)
            .await?;
        Ok(RecordId(id))
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// MemorySummaryCache
// ============================================================================

/// In-process store. Each kind keeps its full history in insertion order.
#[derive(Debug, Default)]
pub struct MemorySummaryCache {
    records: RwLock<HashMap<String, Vec<(RecordId, SummaryRecord)>>>,
    next_id: AtomicI64,
}

impl MemorySummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored for `kind`, including superseded ones.
    pub fn count(&self, kind: &str) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[async_trait]
impl SummaryCache for MemorySummaryCache {
    async fn lookup_latest(&self, kind: &str) -> Result<Option<SummaryRecord>, StorageError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(kind)
            .and_then(|history| history.last())
            .map(|(_, record)| record.clone()))
    }

    async fn append(&self, record: &SummaryRecord) -> Result<RecordId, StorageError> {
        let id = RecordId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(record.kind.clone())
            .or_default()
            .push((id, record.clone()));
        Ok(id)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// TESTS
// ============================================================================
