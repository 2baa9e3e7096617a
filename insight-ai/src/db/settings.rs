//! Settings database operations
//!
//! Get/set accessors for the key-value `settings` table.

use sqlx::{Pool, Sqlite};
use insight_common::{Error, Result};

const INFERENCE_API_KEY: &str = "inference_api_key";
const STORE_MAX_LOCK_WAIT_MS: &str = "store_max_lock_wait_ms";

/// Get inference API key from database
///
/// **Returns:** Some(key) if set, None otherwise
pub async fn get_inference_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, INFERENCE_API_KEY).await
}

/// Set inference API key in database
pub async fn set_inference_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, INFERENCE_API_KEY, key).await
}

/// Maximum time a locked write is retried
///
/// **Default:** 5000 ms
pub async fn get_store_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, STORE_MAX_LOCK_WAIT_MS)
        .await
        .map(|opt| opt.unwrap_or(5000))
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
