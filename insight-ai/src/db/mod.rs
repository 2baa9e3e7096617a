//! Database access for insight-ai

pub mod records;
pub mod settings;

pub use records::SqliteRecordStore;

use insight_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool and insight-ai tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = insight_common::db::open_pool(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the settings and analysis_records tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    insight_common::db::create_settings_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_records (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            payload_ref TEXT NOT NULL,
            status TEXT NOT NULL,
            result TEXT,
            error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analysis_records_status ON analysis_records(status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analysis_records_owner ON analysis_records(owner_id, kind, updated_at)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (settings, analysis_records)");

    Ok(())
}
