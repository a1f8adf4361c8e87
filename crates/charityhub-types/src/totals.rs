use serde::Serialize;
use std::collections::BTreeSet;

use crate::status::DonationStatus;

/// One donation as seen by the aggregate computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub donor_id: i64,
    pub amount: i64,
    /// Raw status column. Unknown statuses never count.
    pub status: String,
    pub is_refunded: bool,
}

impl Contribution {
    pub fn counts(&self) -> bool {
        !self.is_refunded
            && self
                .status
                .parse::<DonationStatus>()
                .is_ok_and(DonationStatus::counts_toward_totals)
    }
}

/// Denormalized totals cached on campaigns and charities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateTotals {
    pub total_donations_received: i64,
    pub donors_count: i64,
}

impl AggregateTotals {
    /// Derive totals from a donation set: the amount sum and the distinct
    /// donor count over completed, non-refunded donations.
    pub fn compute<'a, I>(contributions: I) -> Self
    where
        I: IntoIterator<Item = &'a Contribution>,
    {
        let mut total = 0i64;
        let mut donors = BTreeSet::new();

        for c in contributions.into_iter().filter(|c| c.counts()) {
            total += c.amount;
            donors.insert(c.donor_id);
        }

        Self {
            total_donations_received: total,
            donors_count: donors.len() as i64,
        }
    }
}
