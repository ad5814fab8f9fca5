//! Payment lifecycle: accepted as PENDING on the API path, settled
//! asynchronously by the worker pool against the double-entry ledger.

pub mod repository;
pub mod service;
pub mod status;

pub use repository::{Payment, PaymentRepository};
pub use service::{NewPayment, PaymentService};
pub use status::PaymentStatus;
