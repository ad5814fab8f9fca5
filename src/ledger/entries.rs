//! Append-only ledger entries.
//!
//! Rows are written only as matched DEBIT/CREDIT pairs sharing one
//! transaction_id, and are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

/// Side of a double-entry pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEBIT" => Some(EntryType::Debit),
            "CREDIT" => Some(EntryType::Credit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub entry_type: EntryType,
    pub created_at: DateTime<Utc>,
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, sqlx::Error> {
    let type_str: String = row.get("type");
    let entry_type = EntryType::parse(&type_str).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "type".into(),
        source: format!("unknown entry type: {}", type_str).into(),
    })?;

    Ok(LedgerEntry {
        id: row.get("id"),
        transaction_id: row.get("transaction_id"),
        account_id: row.get("account_id"),
        amount: row.get("amount"),
        entry_type,
        created_at: row.get("created_at"),
    })
}

pub struct LedgerEntries;

impl LedgerEntries {
    /// Insert the matched pair for one transfer: a DEBIT against the
    /// source and a CREDIT for the destination, equal amounts, one
    /// transaction_id. A single statement so the pair can never be
    /// half-written.
    pub async fn append_pair(
        conn: &mut PgConnection,
        transaction_id: Uuid,
        debit_account: Uuid,
        credit_account: Uuid,
        amount: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO ledger_entries (transaction_id, account_id, amount, type)
               VALUES ($1, $2, $3, 'DEBIT'), ($1, $4, $3, 'CREDIT')"#,
        )
        .bind(transaction_id)
        .bind(debit_account)
        .bind(amount)
        .bind(credit_account)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// All entries for one transaction, DEBIT row first.
    pub async fn find_by_transaction(
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"SELECT id, transaction_id, account_id, amount, type, created_at
               FROM ledger_entries
               WHERE transaction_id = $1
               ORDER BY type DESC"#,
        )
        .bind(transaction_id)
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}
