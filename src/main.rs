//! atompay server entry point.
//!
//! Bootstrap order: args → config → logging → database (+ schema) →
//! background tasks (workers, recovery scan, idempotency purger) →
//! HTTP gateway. The gateway call blocks until shutdown is requested;
//! background tasks are then stopped explicitly.

use std::sync::Arc;
use std::time::Duration;

use atompay::config::AppConfig;
use atompay::db::Database;
use atompay::error::set_verbose_errors;
use atompay::gateway::{run_server, state::AppState};
use atompay::idempotency::IdempotencyStore;
use atompay::queue::{JobQueue, spawn_recovery, spawn_workers};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = atompay::logging::init_logging(&config);
    set_verbose_errors(env == "dev");

    tracing::info!(env = %env, version = env!("GIT_HASH"), "starting atompay");

    let db = Arc::new(Database::connect(&config.database_url(), &config.database).await?);
    db.ensure_schema().await?;

    let queue = Arc::new(JobQueue::new(config.queue.capacity));

    let workers = spawn_workers(db.clone(), queue.clone(), config.queue.clone());
    let recovery = spawn_recovery(db.clone(), queue.clone(), config.recovery.clone());
    let purger = spawn_purger(
        db.clone(),
        Duration::from_secs(config.idempotency.purge_interval_secs),
    );

    let port = get_port_override().unwrap_or(config.gateway.port);
    let state = Arc::new(AppState::new(config, db, queue));
    run_server(state, port).await?;

    // The server has drained; stop the background loops.
    recovery.abort();
    purger.abort();
    for handle in &workers {
        handle.abort();
    }
    futures::future::join_all(workers).await;

    tracing::info!("atompay stopped");
    Ok(())
}

/// Periodically delete expired idempotency records. This is also what
/// eventually frees keys a crashed process left IN_PROGRESS.
fn spawn_purger(db: Arc<Database>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match IdempotencyStore::purge_expired(db.pool()).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "purged expired idempotency records"),
                Err(e) => tracing::error!(error = %e, "idempotency purge failed"),
            }
        }
    })
}
