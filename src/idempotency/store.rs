//! Persistence for idempotency records.
//!
//! The UNIQUE constraint on `idempotency_keys.key` is the only mutual
//! exclusion here. There is no application-level lock: the first request
//! to insert a key owns the execution, every other request observes the
//! record it left behind. This stays correct across multiple server
//! processes sharing one database.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Lifecycle of a claimed key.
///
/// IN_PROGRESS is written by the exclusive insert; the middleware settles
/// the record to COMPLETED or FAILED once the downstream handler responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::InProgress => "IN_PROGRESS",
            IdempotencyStatus::Completed => "COMPLETED",
            IdempotencyStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(IdempotencyStatus::InProgress),
            "COMPLETED" => Some(IdempotencyStatus::Completed),
            "FAILED" => Some(IdempotencyStatus::Failed),
            _ => None,
        }
    }
}

/// One row of `idempotency_keys`.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key: String,
    pub method: String,
    pub path: String,
    pub request_body_hash: String,
    pub status: IdempotencyStatus,
    pub status_code: Option<i32>,
    pub response_body: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// An expired record is treated as absent: it no longer replays, and
    /// whatever state it holds (including a wedged IN_PROGRESS left by a
    /// crashed process) is discarded on the next request for the key.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

fn row_to_record(row: &PgRow) -> Result<IdempotencyRecord, sqlx::Error> {
    let status_str: String = row.get("status");
    let status = IdempotencyStatus::parse(&status_str).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "status".into(),
        source: format!("unknown idempotency status: {}", status_str).into(),
    })?;

    Ok(IdempotencyRecord {
        key: row.get("key"),
        method: row.get("method"),
        path: row.get("path"),
        request_body_hash: row.get("request_body_hash"),
        status,
        status_code: row.get("status_code"),
        response_body: row.get("response_body"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

/// Data access for the `idempotency_keys` table.
pub struct IdempotencyStore;

impl IdempotencyStore {
    pub async fn find(pool: &PgPool, key: &str) -> Result<Option<IdempotencyRecord>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT key, method, path, request_body_hash, status,
                   status_code, response_body, created_at, expires_at
            FROM idempotency_keys
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// Insert-if-absent claim on a key.
    ///
    /// Returns the fresh IN_PROGRESS record when this caller won the key,
    /// or `None` when a concurrent request inserted it first.
    pub async fn try_create(
        pool: &PgPool,
        key: &str,
        method: &str,
        path: &str,
        request_body_hash: &str,
        ttl_hours: i64,
    ) -> Result<Option<IdempotencyRecord>, sqlx::Error> {
        let expires_at = Utc::now() + Duration::hours(ttl_hours);

        let row = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, method, path, request_body_hash, status, expires_at)
            VALUES ($1, $2, $3, $4, 'IN_PROGRESS', $5)
            ON CONFLICT (key) DO NOTHING
            RETURNING key, method, path, request_body_hash, status,
                      status_code, response_body, created_at, expires_at
            "#,
        )
        .bind(key)
        .bind(method)
        .bind(path)
        .bind(request_body_hash)
        .bind(expires_at)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn mark_completed(
        pool: &PgPool,
        key: &str,
        status_code: i32,
        response_body: Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = 'COMPLETED', status_code = $2, response_body = $3
            WHERE key = $1
            "#,
        )
        .bind(key)
        .bind(status_code)
        .bind(response_body)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Error outcomes keep no body; a FAILED record is deleted on the next
    /// request for the key so the caller can retry.
    pub async fn mark_failed(
        pool: &PgPool,
        key: &str,
        status_code: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = 'FAILED', status_code = $2, response_body = NULL
            WHERE key = $1
            "#,
        )
        .bind(key)
        .bind(status_code)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &PgPool, key: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM idempotency_keys WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Drop every expired record regardless of status. Runs on a timer;
    /// this is what eventually frees keys a crashed process left
    /// IN_PROGRESS.
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
