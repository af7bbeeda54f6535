//! Payment status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of a payment.
///
/// Status transitions:
/// ```text
/// pending ──┬──► success
///           ├──► failed
///           └──► challenge ──┬──► success
///                            └──► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Waiting for the customer to pay.
    #[default]
    Pending,

    /// The gateway's fraud check wants a manual review.
    Challenge,

    /// Money captured (terminal).
    Success,

    /// Denied, cancelled or expired (terminal).
    Failed,
}

/// What to do when a notification asks to move a payment to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// A legal forward transition.
    Apply,
    /// Still pending, nothing to change.
    Unchanged,
    /// The requested status is already recorded.
    Duplicate,
    /// The request contradicts the recorded status.
    Contradiction,
}

impl PaymentStatus {
    /// Returns true for statuses no notification may move away from.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    /// Classifies a requested move from this status to `target`.
    pub fn change_to(&self, target: PaymentStatus) -> StatusChange {
        use PaymentStatus::*;

        match (self, target) {
            (Pending, Pending) => StatusChange::Unchanged,
            (current, target) if *current == target => StatusChange::Duplicate,
            (Success | Failed, _) => StatusChange::Contradiction,
            (Challenge, Pending) => StatusChange::Contradiction,
            (Pending, _) | (Challenge, _) => StatusChange::Apply,
        }
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Challenge => "challenge",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "challenge" => Ok(PaymentStatus::Challenge),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::UnknownPaymentStatus(other.to_string())),
        }
    }
}
