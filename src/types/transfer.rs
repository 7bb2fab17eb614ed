//! Transfer-related types for the payments bridge
//!
//! This module defines the transfer state machine states, the reasons a
//! transfer can fail, and the Transfer record tracked by the lifecycle
//! manager.

use super::ids::{AccountId, TransferId};
use chrono::{DateTime, Utc};
use std::fmt;

/// Amount in the smallest currency unit (cents)
pub type Cents = u64;

/// Lifecycle state of a transfer
///
/// `Pending` is the initial state. `Finalized` and `Failed` are terminal:
/// once reached, a transfer never changes state again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Value is held on the ledger, settlement not yet confirmed
    Pending,

    /// Settlement confirmed and the held value posted
    Finalized,

    /// Settlement rejected, mismatched or timed out; the hold was released
    Failed,
}

impl TransferState {
    /// True for `Finalized` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Finalized | TransferState::Failed)
    }

    /// Lowercase name used in logs and CSV output
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pending => "pending",
            TransferState::Finalized => "finalized",
            TransferState::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transfer ended up `Failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The payment initiator declined or errored
    SettlementRejected,

    /// The settlement window elapsed before finalization
    SettlementTimeout,

    /// The network reported a settled amount different from the transfer amount
    AmountMismatch {
        /// Amount reported by the payment network
        reported: Cents,
    },
}

impl FailureReason {
    /// Stable snake_case label used in result output
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::SettlementRejected => "settlement_rejected",
            FailureReason::SettlementTimeout => "settlement_timeout",
            FailureReason::AmountMismatch { .. } => "amount_mismatch",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::SettlementRejected => f.write_str("settlement rejected"),
            FailureReason::SettlementTimeout => f.write_str("settlement timeout"),
            FailureReason::AmountMismatch { reported } => {
                write!(f, "amount mismatch (reported {})", reported)
            }
        }
    }
}

/// A movement of value from a payer wallet to the merchant account
///
/// The amount is fixed at creation. Only `state` and the settlement
/// bookkeeping fields (`correlation_id`, `reported_amount`, `failure`)
/// change afterwards, and only through the lifecycle manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    /// Random 128-bit id of the pending ledger transfer
    pub id: TransferId,

    /// Payer wallet
    pub debit_account: AccountId,

    /// Merchant account
    pub credit_account: AccountId,

    /// Strictly positive amount in cents
    pub amount: Cents,

    /// Current lifecycle state
    pub state: TransferState,

    /// Creation time, start of the settlement window
    pub created_at: DateTime<Utc>,

    /// Correlation id returned by the payment initiator, once initiated
    pub correlation_id: Option<String>,

    /// Settled amount reported by the payment network, once reported
    pub reported_amount: Option<Cents>,

    /// Set when `state` is `Failed`
    pub failure: Option<FailureReason>,
}

impl Transfer {
    /// Create a new pending transfer record
    pub fn pending(
        id: TransferId,
        debit_account: AccountId,
        credit_account: AccountId,
        amount: Cents,
        created_at: DateTime<Utc>,
    ) -> Self {
        Transfer {
            id,
            debit_account,
            credit_account,
            amount,
            state: TransferState::Pending,
            created_at,
            correlation_id: None,
            reported_amount: None,
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::pending(TransferState::Pending, false)]
    #[case::finalized(TransferState::Finalized, true)]
    #[case::failed(TransferState::Failed, true)]
    fn test_is_terminal(#[case] state: TransferState, #[case] expected: bool) {
        assert_eq!(state.is_terminal(), expected);
    }

    #[test]
    fn test_pending_constructor() {
        let transfer = Transfer::pending(
            TransferId::new(9),
            AccountId::new(2),
            AccountId::new(1),
            500,
            Utc::now(),
        );

        assert_eq!(transfer.state, TransferState::Pending);
        assert_eq!(transfer.amount, 500);
        assert!(transfer.correlation_id.is_none());
        assert!(transfer.failure.is_none());
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::AmountMismatch { reported: 99 };
        assert_eq!(reason.to_string(), "amount mismatch (reported 99)");
    }
}
