//! Persistence for payments.
//!
//! Status transitions are plain conditional UPDATEs: the guard in the
//! WHERE clause is what keeps two workers from both fulfilling a payment,
//! so every transition reports whether it actually happened.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::status::PaymentStatus;

/// One row of `payments`, as exposed by the API.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub source: String,
    pub description: String,
    pub status: PaymentStatus,
    pub idempotency_key: Option<String>,
    /// Ledger transaction that settled this payment; set atomically with
    /// the SUCCESS transition.
    pub transaction_id: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_payment(row: &PgRow) -> Result<Payment, sqlx::Error> {
    let status_str: String = row.get("status");
    let status = PaymentStatus::parse(&status_str).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "status".into(),
        source: format!("unknown payment status: {}", status_str).into(),
    })?;

    Ok(Payment {
        id: row.get("id"),
        merchant_id: row.get("merchant_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        source: row.get("source"),
        description: row.get("description"),
        status,
        idempotency_key: row.get("idempotency_key"),
        transaction_id: row.get("transaction_id"),
        failure_reason: row.get("failure_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Data access for the `payments` table.
pub struct PaymentRepository;

impl PaymentRepository {
    /// Insert a new PENDING payment.
    pub async fn create(
        pool: &PgPool,
        merchant_id: Uuid,
        amount: i64,
        currency: &str,
        source: &str,
        description: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<Payment, sqlx::Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO payments (merchant_id, amount, currency, source, description, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, merchant_id, amount, currency, source, description, status,
                      idempotency_key, transaction_id, failure_reason, created_at, updated_at
            "#,
        )
        .bind(merchant_id)
        .bind(amount)
        .bind(currency)
        .bind(source)
        .bind(description.unwrap_or("API Payment"))
        .bind(idempotency_key)
        .fetch_one(pool)
        .await?;

        row_to_payment(&row)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Payment>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, merchant_id, amount, currency, source, description, status,
                   idempotency_key, transaction_id, failure_reason, created_at, updated_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    /// Claim a payment for fulfillment.
    ///
    /// Returns `false` when the payment is already terminal, in which case
    /// the caller must not touch it again. Re-claiming a payment that is
    /// stuck in PROCESSING is allowed: that is how crashed work is resumed.
    pub async fn mark_processing(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'PROCESSING', updated_at = NOW()
            WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a successful settlement: the SUCCESS transition and the
    /// ledger transaction that backs it, on the caller's open transaction.
    ///
    /// Committed together with the transfer itself, so a crash can never
    /// leave a settled payment looking re-fulfillable.
    pub async fn mark_succeeded(
        conn: &mut PgConnection,
        id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Payment, sqlx::Error> {
        let row = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'SUCCESS', transaction_id = $2, failure_reason = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING id, merchant_id, amount, currency, source, description, status,
                      idempotency_key, transaction_id, failure_reason, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(transaction_id)
        .fetch_one(&mut *conn)
        .await?;

        row_to_payment(&row)
    }

    /// Unconditional status write, returning the updated payment.
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: PaymentStatus,
        failure_reason: Option<&str>,
    ) -> Result<Payment, sqlx::Error> {
        let row = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, failure_reason = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, merchant_id, amount, currency, source, description, status,
                      idempotency_key, transaction_id, failure_reason, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(failure_reason)
        .fetch_one(pool)
        .await?;

        row_to_payment(&row)
    }

    /// Find payments stuck in a non-terminal state for too long.
    ///
    /// Used by the recovery scan to re-enqueue work lost to a crash or a
    /// full queue.
    pub async fn find_stale(
        pool: &PgPool,
        stale_after_secs: i64,
        batch_size: i64,
    ) -> Result<Vec<Payment>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, merchant_id, amount, currency, source, description, status,
                   idempotency_key, transaction_id, failure_reason, created_at, updated_at
            FROM payments
            WHERE status IN ('PENDING', 'PROCESSING')
              AND updated_at < NOW() - INTERVAL '1 second' * $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(stale_after_secs)
        .bind(batch_size)
        .fetch_all(pool)
        .await?;

        let mut payments = Vec::with_capacity(rows.len());
        for row in rows {
            payments.push(row_to_payment(&row)?);
        }
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::Database;
    use crate::ledger::AccountStore;

    async fn test_db() -> Database {
        let config = DatabaseConfig::default();
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| config.url.clone());
        let db = Database::connect(&url, &config)
            .await
            .expect("Failed to connect");
        db.ensure_schema().await.expect("Failed to ensure schema");
        db
    }

    async fn test_merchant(db: &Database) -> Uuid {
        let name = format!("merchant_{}", Uuid::new_v4());
        AccountStore::create(db.pool(), &name, "USD", false)
            .await
            .expect("Should create account")
            .id
    }

    #[tokio::test]
    #[ignore] // Requires PostgreSQL
    async fn test_create_defaults_to_pending() {
        let db = test_db().await;
        let merchant_id = test_merchant(&db).await;

        let payment = PaymentRepository::create(
            db.pool(),
            merchant_id,
            2500,
            "USD",
            "tok_visa",
            None,
            None,
        )
        .await
        .expect("Should create payment");

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, 2500);
        assert_eq!(payment.description, "API Payment");
        assert!(payment.failure_reason.is_none());

        let fetched = PaymentRepository::find_by_id(db.pool(), payment.id)
            .await
            .expect("Should query")
            .expect("Payment should exist");
        assert_eq!(fetched.merchant_id, merchant_id);
    }

    #[tokio::test]
    #[ignore]
    async fn test_mark_processing_rejects_terminal() {
        let db = test_db().await;
        let merchant_id = test_merchant(&db).await;

        let payment = PaymentRepository::create(
            db.pool(),
            merchant_id,
            100,
            "USD",
            "tok_visa",
            None,
            None,
        )
        .await
        .expect("Should create payment");

        // PENDING -> PROCESSING, and PROCESSING again (crash recovery).
        assert!(PaymentRepository::mark_processing(db.pool(), payment.id)
            .await
            .expect("Should update"));
        assert!(PaymentRepository::mark_processing(db.pool(), payment.id)
            .await
            .expect("Should update"));

        PaymentRepository::update_status(db.pool(), payment.id, PaymentStatus::Success, None)
            .await
            .expect("Should update");

        assert!(!PaymentRepository::mark_processing(db.pool(), payment.id)
            .await
            .expect("Should update"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_update_status_records_failure_reason() {
        let db = test_db().await;
        let merchant_id = test_merchant(&db).await;

        let payment = PaymentRepository::create(
            db.pool(),
            merchant_id,
            100,
            "USD",
            "tok_visa",
            None,
            None,
        )
        .await
        .expect("Should create payment");

        let failed = PaymentRepository::update_status(
            db.pool(),
            payment.id,
            PaymentStatus::Failed,
            Some("Insufficient balance"),
        )
        .await
        .expect("Should update");

        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("Insufficient balance"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_find_stale_sees_pending_payment() {
        let db = test_db().await;
        let merchant_id = test_merchant(&db).await;

        let payment = PaymentRepository::create(
            db.pool(),
            merchant_id,
            100,
            "USD",
            "tok_visa",
            None,
            None,
        )
        .await
        .expect("Should create payment");

        let stale = PaymentRepository::find_stale(db.pool(), 0, 1000)
            .await
            .expect("Should query");
        assert!(stale.iter().any(|p| p.id == payment.id));

        PaymentRepository::update_status(db.pool(), payment.id, PaymentStatus::Success, None)
            .await
            .expect("Should update");

        let stale = PaymentRepository::find_stale(db.pool(), 0, 1000)
            .await
            .expect("Should query");
        assert!(!stale.iter().any(|p| p.id == payment.id));
    }
}
