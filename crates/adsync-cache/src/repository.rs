//! SQLite implementation of IUserStore and IReportSink
//!
//! ## Type Mapping
//!
//! | Domain Type      | SQL Type | Strategy                                   |
//! |------------------|----------|--------------------------------------------|
//! | LocalUserId      | INTEGER  | `as_u64()` checked into `i64`              |
//! | metadata         | rows     | one `user_meta` row per key                |
//! | DateTime<Utc>    | TEXT     | ISO 8601 via `to_rfc3339()`                |
//! | BatchReport      | TEXT     | serde_json serialization                   |

use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use adsync_core::domain::{BatchReport, LocalUser, LocalUserId};
use adsync_core::ports::{IReportSink, IUserStore, UserFilter};

use crate::CacheError;

/// SQLite-based local user store
///
/// Also records batch history, so one database holds everything the
/// engine persists.
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn id_to_sql(id: LocalUserId) -> Result<i64, CacheError> {
    i64::try_from(id.as_u64())
        .map_err(|_| CacheError::SerializationError(format!("user id {id} out of range")))
}

fn id_from_sql(raw: i64) -> Result<LocalUserId, CacheError> {
    u64::try_from(raw)
        .map(LocalUserId::new)
        .map_err(|_| CacheError::SerializationError(format!("negative user id {raw}")))
}

/// Folds `users LEFT JOIN user_meta` rows, ordered by user id, into users
fn users_from_rows(rows: &[SqliteRow]) -> Result<Vec<LocalUser>, CacheError> {
    let mut users: Vec<LocalUser> = Vec::new();

    for row in rows {
        let id = id_from_sql(row.try_get("id")?)?;
        if users.last().map(LocalUser::id) != Some(id) {
            let login: String = row.try_get("login")?;
            let user = LocalUser::new(id, login)
                .map_err(|e| CacheError::SerializationError(e.to_string()))?;
            users.push(user);
        }

        let key: Option<String> = row.try_get("meta_key")?;
        let value: Option<String> = row.try_get("meta_value")?;
        if let (Some(key), Some(value), Some(user)) = (key, value, users.last_mut()) {
            user.set_metadata(key, value);
        }
    }

    Ok(users)
}

fn report_from_row(row: &SqliteRow) -> Result<BatchReport, CacheError> {
    let json: String = row.try_get("report")?;
    serde_json::from_str(&json).map_err(|e| {
        CacheError::SerializationError(format!("Failed to deserialize batch report: {}", e))
    })
}

// ============================================================================
// IUserStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IUserStore for SqliteUserStore {
    async fn query_users(&self, filter: &UserFilter) -> anyhow::Result<Vec<LocalUser>> {
        let mut sql = String::from(
            "SELECT u.id, u.login, m.meta_key, m.meta_value \
             FROM users u LEFT JOIN user_meta m ON m.user_id = u.id WHERE 1=1",
        );
        let mut ids: Vec<i64> = Vec::new();

        if filter.non_empty_meta.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM user_meta f WHERE f.user_id = u.id \
                 AND f.meta_key = ? AND TRIM(f.meta_value) <> '')",
            );
        }

        if !filter.exclude.is_empty() {
            let placeholders = vec!["?"; filter.exclude.len()].join(", ");
            sql.push_str(&format!(" AND u.id NOT IN ({placeholders})"));
            for id in &filter.exclude {
                ids.push(id_to_sql(*id)?);
            }
        }

        if let Some(id) = filter.include {
            sql.push_str(" AND u.id = ?");
            ids.push(id_to_sql(id)?);
        }

        sql.push_str(" ORDER BY u.id ASC, m.meta_key ASC");

        let mut query = sqlx::query(&sql);
        if let Some(key) = &filter.non_empty_meta {
            query = query.bind(key);
        }
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(users_from_rows(&rows)?)
    }

    async fn get_user(&self, id: LocalUserId) -> anyhow::Result<Option<LocalUser>> {
        let users = self.query_users(&UserFilter::new().only(id)).await?;
        Ok(users.into_iter().next())
    }

    async fn find_by_login(&self, login: &str) -> anyhow::Result<Option<LocalUser>> {
        // `login` is declared COLLATE NOCASE
        let row = sqlx::query("SELECT id FROM users WHERE login = ?")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let id = id_from_sql(row.try_get("id")?)?;
                self.get_user(id).await
            }
            None => Ok(None),
        }
    }

    async fn read_metadata(&self, id: LocalUserId, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT meta_value FROM user_meta WHERE user_id = ? AND meta_key = ?",
        )
        .bind(id_to_sql(id)?)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn write_metadata(
        &self,
        id: LocalUserId,
        key: &str,
        value: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_meta (user_id, meta_key, meta_value)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value
            "#,
        )
        .bind(id_to_sql(id)?)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write '{key}' for user {id}"))?;

        tracing::trace!(user_id = %id, key, "Wrote user metadata");
        Ok(())
    }

    async fn create_user(&self, login: &str) -> anyhow::Result<LocalUser> {
        anyhow::ensure!(!login.trim().is_empty(), "login cannot be empty");

        let result = sqlx::query("INSERT INTO users (login, created_at) VALUES (?, ?)")
            .bind(login)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to create user '{login}'"))?;

        let id = id_from_sql(result.last_insert_rowid())?;
        tracing::debug!(user_id = %id, login, "Created local user");
        Ok(LocalUser::new(id, login)?)
    }
}

// ============================================================================
// IReportSink implementation
// ============================================================================

#[async_trait::async_trait]
impl IReportSink for SqliteUserStore {
    async fn record_batch(&self, report: &BatchReport) -> anyhow::Result<()> {
        let json = serde_json::to_string(report).map_err(|e| {
            CacheError::SerializationError(format!("Failed to serialize batch report: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO sync_runs
                (kind, started_at, finished_at, elapsed_ms, processed, failed, aborted, report)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.kind.to_string())
        .bind(report.started_at.to_rfc3339())
        .bind(report.finished_at.to_rfc3339())
        .bind(i64::try_from(report.elapsed_ms).unwrap_or(i64::MAX))
        .bind(report.processed() as i64)
        .bind(report.counts.failed as i64)
        .bind(report.aborted.as_deref())
        .bind(json)
        .execute(&self.pool)
        .await?;

        tracing::trace!(kind = %report.kind, processed = report.processed(), "Recorded batch report");
        Ok(())
    }

    async fn recent_batches(&self, limit: u32) -> anyhow::Result<Vec<BatchReport>> {
        let rows = sqlx::query("SELECT report FROM sync_runs ORDER BY id DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in &rows {
            reports.push(report_from_row(row)?);
        }
        Ok(reports)
    }
}
