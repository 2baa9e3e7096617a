//! Database Test Utilities
//!
//! Temporary SQLite databases with the insight-ai schema applied

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create temporary test database with all tables created
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_insight.db");

    let pool = insight_ai::db::init_database_pool(&db_path).await?;

    Ok((temp_dir, pool))
}

/// Get all table names in database
pub async fn get_table_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let tables = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(tables)
}

/// Check if table has specific column
pub async fn has_column(pool: &SqlitePool, table_name: &str, column_name: &str) -> Result<bool> {
    let query = format!("SELECT name FROM pragma_table_info('{}')", table_name);
    let columns = sqlx::query_scalar::<_, String>(&query).fetch_all(pool).await?;
    Ok(columns.iter().any(|c| c == column_name))
}
