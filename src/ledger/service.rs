//! The double-entry transfer protocol.
//!
//! A transfer debits one account and credits another inside a single
//! database transaction. Row locks are always acquired in canonical
//! (identifier) order, independent of transfer direction, so two
//! concurrent transfers over the same pair of accounts can never form a
//! lock wait cycle.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::accounts::AccountStore;
use super::entries::LedgerEntries;
use crate::error::AppError;

/// Outcome of a committed transfer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransferReceipt {
    pub transaction_id: Uuid,
    pub from_account: Uuid,
    pub to_account: Uuid,
    pub amount: i64,
    pub currency: String,
}

/// Canonical lock order for a pair of accounts. Total and
/// direction-independent: both (a, b) and (b, a) map to the same pair.
fn lock_order(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b { (a, b) } else { (b, a) }
}

pub struct LedgerCore;

impl LedgerCore {
    /// Move `amount` minor units from `from_account` to `to_account`.
    ///
    /// All-or-nothing: balance deltas and the DEBIT/CREDIT entry pair
    /// commit together or not at all. Fails with `InvalidAmount` for a
    /// non-positive amount (before any storage access), `AccountNotFound`,
    /// `CurrencyMismatch`, or `InsufficientBalance` when the source may
    /// not go negative.
    pub async fn transfer(
        pool: &PgPool,
        from_account: Uuid,
        to_account: Uuid,
        amount: i64,
        currency: &str,
    ) -> Result<TransferReceipt, AppError> {
        // Preconditions, checked before touching storage
        Self::validate(from_account, to_account, amount)?;

        let mut tx = pool.begin().await?;
        let receipt = Self::transfer_in(&mut tx, from_account, to_account, amount, currency).await?;
        tx.commit().await?;

        tracing::info!(
            transaction_id = %receipt.transaction_id,
            from = %from_account,
            to = %to_account,
            amount,
            currency,
            "transfer committed"
        );

        Ok(receipt)
    }

    /// Run the transfer protocol on an already-open transaction without
    /// committing it. Lets a caller make further writes (e.g. marking the
    /// payment that triggered the transfer) atomic with the transfer
    /// itself. The caller owns the commit.
    pub async fn transfer_in(
        conn: &mut PgConnection,
        from_account: Uuid,
        to_account: Uuid,
        amount: i64,
        currency: &str,
    ) -> Result<TransferReceipt, AppError> {
        // 1. Preconditions
        Self::validate(from_account, to_account, amount)?;

        // 2. Acquire both row locks in canonical order. The locked row is
        //    the authoritative re-read of each account's state.
        let (first_id, second_id) = lock_order(from_account, to_account);
        let first = AccountStore::lock(&mut *conn, first_id).await?;
        let second = AccountStore::lock(&mut *conn, second_id).await?;

        let (src, dst) = if first_id == from_account {
            (first, second)
        } else {
            (second, first)
        };

        // 3. Both accounts must exist
        let src = src.ok_or_else(|| AppError::AccountNotFound(from_account.to_string()))?;
        let dst = dst.ok_or_else(|| AppError::AccountNotFound(to_account.to_string()))?;

        // 4. Single-currency transfers only
        if src.currency != currency {
            return Err(AppError::CurrencyMismatch(format!(
                "source account holds {}, transfer is {}",
                src.currency, currency
            )));
        }
        if dst.currency != currency {
            return Err(AppError::CurrencyMismatch(format!(
                "destination account holds {}, transfer is {}",
                dst.currency, currency
            )));
        }

        // 5. Funds check unless the source is the settlement account
        if !src.allow_negative && src.balance < amount {
            return Err(AppError::InsufficientBalance);
        }

        // 6. Apply the deltas under the held locks
        AccountStore::apply_delta(&mut *conn, src.id, -amount).await?;
        AccountStore::apply_delta(&mut *conn, dst.id, amount).await?;

        // 7. Record the matched DEBIT/CREDIT pair
        let transaction_id = Uuid::new_v4();
        LedgerEntries::append_pair(&mut *conn, transaction_id, src.id, dst.id, amount).await?;

        Ok(TransferReceipt {
            transaction_id,
            from_account,
            to_account,
            amount,
            currency: currency.to_string(),
        })
    }

    fn validate(from_account: Uuid, to_account: Uuid, amount: i64) -> Result<(), AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount);
        }
        if from_account == to_account {
            return Err(AppError::SameAccount);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_order_is_direction_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(lock_order(a, b), lock_order(b, a));
    }

    #[test]
    fn test_lock_order_is_total() {
        let a = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let b = Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap();
        assert_eq!(lock_order(a, b), (a, b));
        assert_eq!(lock_order(b, a), (a, b));
    }
}
