//! Double-entry ledger.
//!
//! ```text
//! ┌──────────────┐   transfer()   ┌──────────────┐
//! │  LedgerCore  │───────────────▶│ AccountStore │  FOR UPDATE + delta
//! │  (protocol)  │                └──────────────┘
//! │              │───────────────▶┌──────────────┐
//! └──────────────┘  append_pair() │LedgerEntries │  DEBIT + CREDIT rows
//!                                 └──────────────┘
//! ```
//!
//! Every balance change goes through `LedgerCore::transfer`, which moves
//! funds between exactly two accounts inside one database transaction and
//! records a matched DEBIT/CREDIT pair. The sum of all balances is
//! invariant across any transfer.

pub mod accounts;
pub mod entries;
pub mod service;

pub use accounts::{Account, AccountStore};
pub use entries::{EntryType, LedgerEntries, LedgerEntry};
pub use service::{LedgerCore, TransferReceipt};
