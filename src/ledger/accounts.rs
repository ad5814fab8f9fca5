//! Account persistence: point lookups, locked reads, atomic balance deltas.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// A ledger account. `balance` is in minor currency units (cents).
///
/// Balances change only through `LedgerCore::transfer`; an account with
/// `allow_negative = false` never leaves a committed transfer below zero.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub balance: i64,
    pub currency: String,
    pub allow_negative: bool,
    pub created_at: DateTime<Utc>,
}

pub struct AccountStore;

impl AccountStore {
    /// Create a new account with zero balance.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        currency: &str,
        allow_negative: bool,
    ) -> Result<Account, sqlx::Error> {
        let account: Account = sqlx::query_as(
            r#"INSERT INTO accounts (name, currency, allow_negative)
               VALUES ($1, $2, $3)
               RETURNING id, name, balance, currency, allow_negative, created_at"#,
        )
        .bind(name)
        .bind(currency)
        .bind(allow_negative)
        .fetch_one(pool)
        .await?;

        Ok(account)
    }

    /// Get account by ID (unlocked read).
    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT id, name, balance, currency, allow_negative, created_at
               FROM accounts WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Read an account under an exclusive row lock. Must run on a
    /// transaction connection; the lock is held until commit/rollback.
    /// The returned row is the lock-protected state.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT id, name, balance, currency, allow_negative, created_at
               FROM accounts WHERE id = $1
               FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Apply a relative balance change. The caller holds the row lock.
    pub async fn apply_delta(
        conn: &mut PgConnection,
        id: Uuid,
        delta: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE id = $1")
            .bind(id)
            .bind(delta)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// The single privileged account allowed to go negative; settlements
    /// are funded from it. Oldest wins if several exist, so every caller
    /// resolves the same account.
    pub async fn find_settlement(pool: &PgPool) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT id, name, balance, currency, allow_negative, created_at
               FROM accounts WHERE allow_negative = true
               ORDER BY created_at ASC
               LIMIT 1"#,
        )
        .fetch_optional(pool)
        .await
    }

    /// Sum of all balances. Constant across transfers; used by audits
    /// and conservation tests.
    pub async fn total_balance(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let total: Option<i64> = sqlx::query_scalar("SELECT SUM(balance)::BIGINT FROM accounts")
            .fetch_one(pool)
            .await?;
        Ok(total.unwrap_or(0))
    }
}
