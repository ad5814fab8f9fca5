//! atompay - atomic payment-processing backend.
//!
//! ```text
//! ┌─────────┐   ┌────────────┐   ┌─────────────┐   ┌────────────┐
//! │ Gateway │──▶│ RateLimiter │──▶│ Idempotency │──▶│  Payment   │
//! │ (axum)  │   │ (fixed win) │   │   Guard     │   │ (PENDING)  │
//! └─────────┘   └────────────┘   └─────────────┘   └─────┬──────┘
//!                                                        │ enqueue
//!                              ┌────────────┐      ┌─────▼──────┐
//!                              │ LedgerCore │◀─────│  Workers   │
//!                              │ (2-entry)  │      │  (pool)    │
//!                              └────────────┘      └────────────┘
//! ```
//!
//! # Modules
//!
//! - [`ledger`] - double-entry transfers over locked account rows
//! - [`idempotency`] - per-key request-outcome cache with exclusive claim
//! - [`ratelimit`] - fixed-window admission control
//! - [`payment`] - payment lifecycle (PENDING → PROCESSING → terminal)
//! - [`queue`] - job queue, worker pool, recovery scan
//! - [`auth`] - API-key bearer authentication
//! - [`gateway`] - HTTP surface, envelope, middleware stack

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod ledger;
pub mod logging;
pub mod payment;
pub mod queue;
pub mod ratelimit;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use db::Database;
pub use error::AppError;
pub use gateway::state::AppState;
pub use ledger::{Account, AccountStore, LedgerCore, LedgerEntries, TransferReceipt};
pub use payment::{Payment, PaymentService, PaymentStatus};
pub use queue::{JobQueue, PaymentJob};
