//! Asynchronous execution of payment settlement.
//!
//! The queue itself is a bounded lock-free ring plus a dedup set keyed by
//! payment id; durability lives in the `payments` table, not here. A job
//! lost to a crash or a full ring is re-admitted by the recovery scan, so
//! dropping a job is always safe.

pub mod worker;

pub use worker::{spawn_recovery, spawn_workers};

use crossbeam_queue::ArrayQueue;
use dashmap::DashSet;
use std::time::Duration;
use uuid::Uuid;

/// One settlement job. The payment id doubles as the dedup key: the same
/// payment is never queued or running twice in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentJob {
    pub payment_id: Uuid,
    /// 1-based, compared against the configured attempt budget.
    pub attempt: u32,
}

impl PaymentJob {
    pub fn new(payment_id: Uuid) -> Self {
        Self {
            payment_id,
            attempt: 1,
        }
    }

    pub(crate) fn next_attempt(self) -> Self {
        Self {
            payment_id: self.payment_id,
            attempt: self.attempt + 1,
        }
    }
}

/// Delay before the attempt after `attempt`: base, then doubling.
pub fn retry_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Bounded in-process job queue with per-payment deduplication.
pub struct JobQueue {
    jobs: ArrayQueue<PaymentJob>,
    in_flight: DashSet<Uuid>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: ArrayQueue::new(capacity),
            in_flight: DashSet::new(),
        }
    }

    /// Admit a payment unless it already has a job queued or running.
    ///
    /// Returns `false` when the job was not admitted, either because the
    /// payment is already in flight or because the ring is full. Callers
    /// rely on the recovery scan for the second case.
    pub fn enqueue(&self, job: PaymentJob) -> bool {
        if !self.in_flight.insert(job.payment_id) {
            return false;
        }
        if self.jobs.push(job).is_err() {
            self.in_flight.remove(&job.payment_id);
            return false;
        }
        true
    }

    pub fn pop(&self) -> Option<PaymentJob> {
        self.jobs.pop()
    }

    /// Push a popped job back for another attempt.
    ///
    /// The dedup claim from the original enqueue stays held across the
    /// gap, which keeps the recovery scan from double-queuing a payment
    /// that is merely waiting out its backoff.
    pub(crate) fn requeue(&self, job: PaymentJob) -> bool {
        self.jobs.push(job).is_ok()
    }

    /// Release a payment's dedup claim once its job is done with the
    /// queue: settled, given up, or dropped.
    pub fn complete(&self, payment_id: Uuid) {
        self.in_flight.remove(&payment_id);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
