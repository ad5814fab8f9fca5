//! Worker pool and recovery scan.
//!
//! A fixed number of worker tasks drain the job queue and drive payment
//! fulfillment. Transient infrastructure failures are retried with
//! exponential backoff; business failures are already terminal by the
//! time they reach the worker (the lifecycle records them as FAILED), so
//! retrying them would only repeat a permanent verdict.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{JobQueue, PaymentJob, retry_delay};
use crate::config::{QueueConfig, RecoveryConfig};
use crate::db::Database;
use crate::payment::{PaymentRepository, PaymentService, PaymentStatus};

/// Start the settlement worker pool.
pub fn spawn_workers(
    db: Arc<Database>,
    queue: Arc<JobQueue>,
    config: QueueConfig,
) -> Vec<JoinHandle<()>> {
    (0..config.workers)
        .map(|worker_id| {
            let db = db.clone();
            let queue = queue.clone();
            let config = config.clone();
            tokio::spawn(async move {
                tracing::info!(worker_id, "settlement worker started");
                run_worker(worker_id, &db, &queue, &config).await;
            })
        })
        .collect()
}

async fn run_worker(worker_id: usize, db: &Database, queue: &Arc<JobQueue>, config: &QueueConfig) {
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    loop {
        match queue.pop() {
            Some(job) => handle_job(worker_id, db, queue, config, job).await,
            None => tokio::time::sleep(poll_interval).await,
        }
    }
}

/// Fulfill one job, deciding between completion, retry, and giving up.
async fn handle_job(
    worker_id: usize,
    db: &Database,
    queue: &Arc<JobQueue>,
    config: &QueueConfig,
    job: PaymentJob,
) {
    tracing::debug!(worker_id, payment_id = %job.payment_id, attempt = job.attempt, "job picked up");

    match PaymentService::fulfill(db.pool(), job.payment_id).await {
        Ok(payment) => {
            tracing::info!(
                worker_id,
                payment_id = %payment.id,
                status = %payment.status,
                "job completed"
            );
            queue.complete(job.payment_id);
        }
        Err(e) if job.attempt < config.max_attempts => {
            let delay = retry_delay(job.attempt, config.backoff_base_ms);
            tracing::warn!(
                worker_id,
                payment_id = %job.payment_id,
                attempt = job.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "transient failure, retrying"
            );
            // Requeue from a timer task so this worker keeps draining
            // instead of sleeping out the backoff. The dedup claim stays
            // held across the gap.
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if !queue.requeue(job.next_attempt()) {
                    // Full ring: give the payment back to the recovery scan.
                    queue.complete(job.payment_id);
                }
            });
        }
        Err(e) => {
            tracing::error!(
                worker_id,
                payment_id = %job.payment_id,
                attempts = job.attempt,
                error = %e,
                "retries exhausted, marking payment failed"
            );
            if let Err(update_err) = PaymentRepository::update_status(
                db.pool(),
                job.payment_id,
                PaymentStatus::Failed,
                Some(&e.to_string()),
            )
            .await
            {
                // Left non-terminal; the recovery scan re-enqueues it once
                // the database is reachable again.
                tracing::error!(
                    payment_id = %job.payment_id,
                    error = %update_err,
                    "failed to record terminal failure"
                );
            }
            queue.complete(job.payment_id);
        }
    }
}

/// Start the stale-payment recovery scan.
///
/// Re-enqueues payments stuck in PENDING or PROCESSING longer than the
/// configured threshold: work lost to a crash, a full ring, or a worker
/// that died mid-fulfillment. Re-delivery is safe because fulfillment
/// refuses to touch terminal payments.
pub fn spawn_recovery(
    db: Arc<Database>,
    queue: Arc<JobQueue>,
    config: RecoveryConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(config.scan_interval_secs);
        tracing::info!(
            scan_interval_secs = config.scan_interval_secs,
            stale_after_secs = config.stale_after_secs,
            "recovery scan started"
        );
        loop {
            tokio::time::sleep(interval).await;
            match PaymentRepository::find_stale(
                db.pool(),
                config.stale_after_secs as i64,
                config.batch_size,
            )
            .await
            {
                Ok(stale) => {
                    let mut requeued = 0usize;
                    for payment in &stale {
                        if queue.enqueue(PaymentJob::new(payment.id)) {
                            requeued += 1;
                        }
                    }
                    if requeued > 0 {
                        tracing::info!(found = stale.len(), requeued, "re-enqueued stale payments");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "recovery scan failed");
                }
            }
        }
    })
}
