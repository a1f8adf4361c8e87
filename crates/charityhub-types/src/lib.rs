pub mod status;
pub mod totals;

pub use status::{DonationStatus, RefundStatus, UnknownStatus};
pub use totals::{AggregateTotals, Contribution};
