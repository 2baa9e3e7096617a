//! Analysis record database operations
//!
//! SQLite-backed [`RecordStore`]. Timestamps are stored as fixed-width RFC 3339
//! (microseconds, `Z`) so text ordering matches time ordering. Status
//! transitions go through `retry_on_lock` to ride out transient lock
//! contention.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use insight_common::{Error, Result};

use crate::models::{AnalyzableRecord, PayloadRef, RecordKind, RecordStatus, RecordUpdate};
use crate::store::{RecordFilter, RecordStore};
use crate::utils::retry_on_lock;

const SELECT_COLUMNS: &str = "SELECT id, owner_id, kind, payload_ref, status, result, error, created_at, updated_at FROM analysis_records";

/// Record store over the shared SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete a record (external writers use this; the pipeline never does)
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM analysis_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn to_json_text<T: serde::Serialize>(what: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", what, e)))
}

fn row_to_record(row: &SqliteRow) -> Result<AnalyzableRecord> {
    let kind: String = row.try_get("kind")?;
    let kind: RecordKind = kind.parse().map_err(Error::Internal)?;

    let status: String = row.try_get("status")?;
    let status: RecordStatus = status.parse().map_err(Error::Internal)?;

    let payload_ref: String = row.try_get("payload_ref")?;
    let payload_ref: PayloadRef = serde_json::from_str(&payload_ref)
        .map_err(|e| Error::Internal(format!("Failed to deserialize payload_ref: {}", e)))?;

    let result: Option<String> = row.try_get("result")?;
    let result = result
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize result: {}", e)))?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(AnalyzableRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        kind,
        payload_ref,
        status,
        result,
        error: row.try_get("error")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

/// Decode a result set, skipping rows that do not form a valid record
///
/// Each failure is logged with the row id and dropped.
fn decode_rows(query: &str, rows: &[SqliteRow]) -> Vec<AnalyzableRecord> {
    rows.iter()
        .filter_map(|row| match row_to_record(row) {
            Ok(record) => Some(record),
            Err(e) => {
                let id: Option<String> = row.try_get("id").ok();
                tracing::warn!(
                    query,
                    record_id = id.as_deref().unwrap_or("<unreadable>"),
                    error = %e,
                    "Skipping undecodable analysis record"
                );
                None
            }
        })
        .collect()
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &AnalyzableRecord) -> Result<()> {
        let payload_ref = to_json_text("payload_ref", &record.payload_ref)?;
        let result = record
            .result
            .as_ref()
            .map(|r| to_json_text("result", r))
            .transpose()?;
        let created_at = format_timestamp(&record.created_at);
        let updated_at = format_timestamp(&record.updated_at);

        retry_on_lock("insert_record", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO analysis_records (
                    id, owner_id, kind, payload_ref, status, result, error, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.owner_id)
            .bind(record.kind.as_str())
            .bind(&payload_ref)
            .bind(record.status.as_str())
            .bind(&result)
            .bind(&record.error)
            .bind(&created_at)
            .bind(&updated_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AnalyzableRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn update(&self, id: &str, update: &RecordUpdate) -> Result<bool> {
        let result = update
            .result
            .as_ref()
            .map(|r| to_json_text("result", r))
            .transpose()?;
        let updated_at = format_timestamp(&update.updated_at);

        retry_on_lock("update_record_status", self.max_lock_wait_ms, || async {
            let outcome = sqlx::query(
                r#"
                UPDATE analysis_records
                SET status = ?, result = ?, error = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(update.status.as_str())
            .bind(&result)
            .bind(&update.error)
            .bind(&updated_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            Ok(outcome.rows_affected() > 0)
        })
        .await
    }

    async fn find_all_by_status(&self, statuses: &[RecordStatus]) -> Result<Vec<AnalyzableRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        builder.push(" WHERE status IN (");
        let mut separated = builder.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(") ORDER BY created_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(decode_rows("find_all_by_status", &rows))
    }

    async fn find_recent_by_owner(
        &self,
        owner_id: &str,
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<AnalyzableRecord>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        builder.push(" WHERE owner_id = ").push_bind(owner_id);

        if !filter.kinds.is_empty() {
            builder.push(" AND kind IN (");
            let mut separated = builder.separated(", ");
            for kind in &filter.kinds {
                separated.push_bind(kind.as_str());
            }
            separated.push_unseparated(")");
        }

        if !filter.statuses.is_empty() {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }

        builder
            .push(" ORDER BY updated_at DESC, id ASC LIMIT ")
            .push_bind(limit as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(decode_rows("find_recent_by_owner", &rows))
    }
}
