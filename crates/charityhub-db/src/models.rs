//! Database row types. These map directly to SQLite rows and keep the raw
//! column values, including statuses the domain enums do not recognise.

use charityhub_types::{DonationStatus, UnknownStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DonationRow {
    pub id: i64,
    pub donor_id: i64,
    pub campaign_id: Option<i64>,
    pub charity_id: Option<i64>,
    pub amount: i64,
    pub status: String,
    pub is_refunded: bool,
    pub refunded_at: Option<String>,
}

impl DonationRow {
    pub fn parsed_status(&self) -> Result<DonationStatus, UnknownStatus> {
        self.status.parse()
    }

    /// Status and stored flag both say refunded.
    pub fn is_marked_refunded(&self) -> bool {
        self.parsed_status() == Ok(DonationStatus::Refunded) && self.is_refunded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundRequestRow {
    pub id: i64,
    pub donation_id: i64,
    pub user_id: i64,
    pub status: String,
    pub reviewed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DonorRow {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// An approved refund with its donation and donor eagerly loaded.
/// `donation` is `None` when the referenced row has been deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedRefundRow {
    pub refund: RefundRequestRow,
    pub donation: Option<DonationRow>,
    pub donor: Option<DonorRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DonationCounts {
    pub total: i64,
    pub completed: i64,
    pub refunded_by_status: i64,
    pub refunded_by_flag: i64,
}

impl DonationCounts {
    pub fn mismatch(&self) -> bool {
        self.refunded_by_status != self.refunded_by_flag
    }
}
