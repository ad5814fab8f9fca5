//! Payment lifecycle states.
//!
//! Stored in PostgreSQL as VARCHAR, matching the strings the API exposes.

use serde::Serialize;
use std::fmt;

/// Payment states
///
/// PENDING is set at creation by the API path; a worker moves the payment
/// to PROCESSING and then exactly once to a terminal state. A payment left
/// PENDING or PROCESSING by a crash is re-fulfillable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl PaymentStatus {
    /// Check if no more transitions are possible from this state.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    /// The string stored in the `payments.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// Convert from the stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
