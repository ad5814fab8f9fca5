pub mod accounts;
pub mod health;
pub mod payments;

pub use accounts::{create_account, get_account};
pub use health::health_check;
pub use payments::{create_payment, get_payment};
