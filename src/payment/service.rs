//! Payment orchestration.
//!
//! The API path persists an accepted payment and hands it to the queue;
//! a worker later settles it against the ledger. Splitting accept from
//! settle keeps request latency flat and survives crashes: the payment
//! row, not the queue, is the durable source of truth.

use sqlx::PgPool;
use uuid::Uuid;

use super::repository::{Payment, PaymentRepository};
use super::status::PaymentStatus;
use crate::error::AppError;
use crate::ledger::{AccountStore, LedgerCore};
use crate::queue::{JobQueue, PaymentJob};

/// Input for payment creation, already shape-validated at the API
/// boundary.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub merchant_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub source: String,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

pub struct PaymentService;

impl PaymentService {
    /// Persist a PENDING payment and enqueue its settlement job.
    ///
    /// A full queue does not fail the request: the payment is accepted
    /// anyway and the recovery scan re-enqueues it later.
    pub async fn create_and_queue(
        pool: &PgPool,
        queue: &JobQueue,
        new: NewPayment,
    ) -> Result<Payment, AppError> {
        if new.amount <= 0 {
            return Err(AppError::InvalidAmount);
        }
        AccountStore::get_by_id(pool, new.merchant_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(new.merchant_id.to_string()))?;

        let payment = PaymentRepository::create(
            pool,
            new.merchant_id,
            new.amount,
            &new.currency,
            &new.source,
            new.description.as_deref(),
            new.idempotency_key.as_deref(),
        )
        .await?;

        if !queue.enqueue(PaymentJob::new(payment.id)) {
            tracing::warn!(
                payment_id = %payment.id,
                "job queue rejected payment; recovery scan will pick it up"
            );
        }

        tracing::info!(
            payment_id = %payment.id,
            merchant_id = %payment.merchant_id,
            amount = payment.amount,
            currency = %payment.currency,
            source = %payment.source,
            "payment accepted"
        );
        Ok(payment)
    }

    pub async fn get_by_id(pool: &PgPool, payment_id: Uuid) -> Result<Payment, AppError> {
        PaymentRepository::find_by_id(pool, payment_id)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(payment_id.to_string()))
    }

    /// Settle one payment. Called by a worker.
    ///
    /// Business failures are terminal: the payment is marked FAILED with
    /// the reason recorded and returned as a normal outcome. Only
    /// infrastructure errors propagate, so the caller's retry policy fires
    /// for faults that a retry can actually fix.
    pub async fn fulfill(pool: &PgPool, payment_id: Uuid) -> Result<Payment, AppError> {
        if !PaymentRepository::mark_processing(pool, payment_id).await? {
            // Already terminal: duplicate delivery or a stale replay.
            return PaymentRepository::find_by_id(pool, payment_id)
                .await?
                .ok_or_else(|| AppError::PaymentNotFound(payment_id.to_string()));
        }

        let payment = PaymentRepository::find_by_id(pool, payment_id)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(payment_id.to_string()))?;

        match Self::settle(pool, &payment).await {
            Ok(settled) => {
                tracing::info!(
                    payment_id = %payment_id,
                    transaction_id = ?settled.transaction_id,
                    amount = payment.amount,
                    currency = %payment.currency,
                    "payment settled"
                );
                Ok(settled)
            }
            Err(e) if e.is_permanent() => {
                tracing::warn!(payment_id = %payment_id, error = %e, "payment failed");
                let failed = PaymentRepository::update_status(
                    pool,
                    payment_id,
                    PaymentStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                Ok(failed)
            }
            Err(e) => Err(e),
        }
    }

    /// Move funds from the settlement account to the merchant.
    ///
    /// A real processor would authorize against a card network first;
    /// here the settlement account stands in for that external rail.
    ///
    /// The transfer and the SUCCESS transition commit in one database
    /// transaction: a payment marked PROCESSING has never moved money, so
    /// redelivering it cannot credit the merchant twice.
    async fn settle(pool: &PgPool, payment: &Payment) -> Result<Payment, AppError> {
        let settlement = AccountStore::find_settlement(pool)
            .await?
            .ok_or(AppError::SettlementUnconfigured)?;

        let mut tx = pool.begin().await?;
        let receipt = LedgerCore::transfer_in(
            &mut tx,
            settlement.id,
            payment.merchant_id,
            payment.amount,
            &payment.currency,
        )
        .await?;
        let settled =
            PaymentRepository::mark_succeeded(&mut tx, payment.id, receipt.transaction_id).await?;
        tx.commit().await?;
        Ok(settled)
    }
}
