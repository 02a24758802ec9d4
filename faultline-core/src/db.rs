use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create the summary table and the stream log tables if they do not exist yet.
///
/// `summary_table` must already have passed `config::is_sql_identifier`.
pub async fn ensure_schema(pool: &PgPool, summary_table: &str) -> Result<(), sqlx::Error> {
    let statements = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {summary_table} (
                id BIGSERIAL PRIMARY KEY,
                exception_name TEXT NOT NULL,
                exception_date TEXT NOT NULL,
                exception_file TEXT NOT NULL,
                exception_method TEXT NOT NULL,
                exception_line TEXT NOT NULL,
                exception_summary TEXT NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {summary_table}_name_idx ON {summary_table} (exception_name, id DESC)"
        ),
        r#"
        CREATE TABLE IF NOT EXISTS stream_messages (
            id BIGSERIAL PRIMARY KEY,
            topic TEXT NOT NULL,
            payload BYTEA NOT NULL,
            published_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS stream_messages_topic_idx ON stream_messages (topic, id)"
            .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS stream_offsets (
            group_id TEXT NOT NULL,
            topic TEXT NOT NULL,
            last_offset BIGINT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (group_id, topic)
        )
        "#
        .to_string(),
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::debug!(summary_table, "Schema ensured");
    Ok(())
}
