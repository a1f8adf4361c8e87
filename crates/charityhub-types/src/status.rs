use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a donation row.
///
/// The status is the authoritative fact about a donation. The stored
/// `is_refunded` column mirrors it and is always written from
/// [`DonationStatus::refunded_flag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl DonationStatus {
    pub const ALL: [DonationStatus; 4] = [
        DonationStatus::Pending,
        DonationStatus::Completed,
        DonationStatus::Failed,
        DonationStatus::Refunded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Value the `is_refunded` column must hold for this status.
    pub fn refunded_flag(self) -> bool {
        self == Self::Refunded
    }

    /// Whether a donation in this state contributes to campaign and
    /// charity totals (given its stored flag is also clear).
    pub fn counts_toward_totals(self) -> bool {
        self == Self::Completed
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus {
                kind: "donation",
                value: s.to_string(),
            })
    }
}

/// Review state of a donor's refund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Approved,
    Denied,
    Cancelled,
}

impl RefundStatus {
    pub const ALL: [RefundStatus; 4] = [
        RefundStatus::Pending,
        RefundStatus::Approved,
        RefundStatus::Denied,
        RefundStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefundStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus {
                kind: "refund",
                value: s.to_string(),
            })
    }
}

/// A status string found in storage that this workspace does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} status '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_statuses() {
        assert_eq!("refunded".parse::<DonationStatus>(), Ok(DonationStatus::Refunded));
        assert_eq!("approved".parse::<RefundStatus>(), Ok(RefundStatus::Approved));
    }

    #[test]
    fn rejects_unknown_and_mixed_case() {
        let err = "Refunded".parse::<DonationStatus>().unwrap_err();
        assert_eq!(err.kind, "donation");
        assert_eq!(err.to_string(), "unknown donation status 'Refunded'");
        assert!("on_hold".parse::<RefundStatus>().is_err());
    }

    #[test]
    fn refunded_flag_follows_status() {
        for status in DonationStatus::ALL {
            assert_eq!(status.refunded_flag(), status == DonationStatus::Refunded);
        }
        assert!(DonationStatus::Completed.counts_toward_totals());
        assert!(!DonationStatus::Refunded.counts_toward_totals());
    }
}
