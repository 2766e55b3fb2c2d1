pub mod billing;
pub mod money;

pub use billing::{normalize_cdt_code, BillingRow, RowError};
pub use money::Money;
