//! Error types for the payments bridge
//!
//! This module defines the closed error taxonomy for the payment lifecycle
//! and the classification of errors coming back from the ledger.
//!
//! # Error Categories
//!
//! - **Validation**: `InvalidAmount`, never reaches the ledger
//! - **Ledger**: `LedgerUnavailable` (retryable), `DuplicateAccount`,
//!   `DuplicateTransfer` and `LedgerRejected` (permanent)
//! - **State machine**: `InvalidTransition`
//! - **Settlement**: `SettlementRejected`, `SettlementTimeout`
//! - **Inputs**: merchant profile, currency conversion, CSV and file I/O

use super::ids::{AccountId, TransferId};
use super::transfer::TransferState;
use thiserror::Error;

/// Message shown to end users for any failed payment
///
/// Internal detail (ledger addresses, secret paths) never leaves the service.
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred while processing the payment";

/// Errors reported by a ledger client
///
/// Mirrors the result codes of a two-phase accounting ledger. Only
/// `Unavailable` is transient; every other variant is a permanent refusal
/// of that exact request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The ledger could not be reached or did not acknowledge in time
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// An account or transfer with this id already exists
    #[error("id {0:032x} already exists")]
    DuplicateId(u128),

    /// A referenced account does not exist
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// Debit and credit accounts are the same
    #[error("debit and credit accounts must differ")]
    SameAccount,

    /// Transfer amount is zero
    #[error("transfer amount must be positive")]
    ZeroAmount,

    /// The pending transfer referenced by a post/void does not exist
    #[error("pending transfer {0} not found")]
    PendingTransferNotFound(TransferId),

    /// The pending transfer was already posted
    #[error("pending transfer {0} already posted")]
    PendingTransferAlreadyPosted(TransferId),

    /// The pending transfer was already voided
    #[error("pending transfer {0} already voided")]
    PendingTransferAlreadyVoided(TransferId),

    /// The pending transfer's timeout elapsed and the ledger released it
    #[error("pending transfer {0} expired")]
    PendingTransferExpired(TransferId),

    /// Applying the transfer would overflow a balance of this account
    #[error("transfer would overflow balance of account {0}")]
    BalanceOverflow(AccountId),
}

impl LedgerError {
    /// True if the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

/// Main error type for the payment lifecycle
///
/// A closed set of variants so callers branch on the kind of failure
/// instead of matching on strings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaymentError {
    /// Amount is zero, negative or not a whole number of cents
    ///
    /// Rejected locally; the ledger is never called.
    #[error("Invalid amount '{amount}'")]
    InvalidAmount {
        /// The offending amount as given
        amount: String,
    },

    /// The ledger is temporarily unreachable
    ///
    /// The caller may retry the whole operation with a fresh id.
    #[error("Ledger unavailable: {message}")]
    LedgerUnavailable {
        /// Transport-level description
        message: String,
    },

    /// Account id collision; never retry with the same id
    #[error("Account {id} already exists")]
    DuplicateAccount {
        /// The colliding account id
        id: AccountId,
    },

    /// Transfer id collision; never retry with the same id
    #[error("Transfer {id} already exists")]
    DuplicateTransfer {
        /// The colliding transfer id
        id: TransferId,
    },

    /// Permanent ledger refusal other than an id collision
    #[error("Ledger rejected request: {reason}")]
    LedgerRejected {
        /// The ledger's reason
        reason: String,
    },

    /// State machine violation (unknown transfer, terminal state, or a lost race)
    #[error("Invalid transition of transfer {transfer} from {} to {to}", describe_state(.from))]
    InvalidTransition {
        /// The transfer the transition was attempted on
        transfer: TransferId,
        /// Current state, `None` when the transfer is unknown
        from: Option<TransferState>,
        /// Requested target state
        to: TransferState,
    },

    /// The payment initiator declined the payment
    #[error("Settlement of transfer {transfer} rejected: {reason}")]
    SettlementRejected {
        /// The transfer that was driven to Failed
        transfer: TransferId,
        /// Initiator's reason
        reason: String,
    },

    /// The settlement window elapsed before finalization
    #[error("Settlement window of transfer {transfer} elapsed")]
    SettlementTimeout {
        /// The expired transfer
        transfer: TransferId,
    },

    /// A settlement report referenced a correlation id this service never issued
    #[error("Unknown settlement correlation id '{correlation_id}'")]
    UnknownCorrelation {
        /// The unmatched correlation id
        correlation_id: String,
    },

    /// No merchant profile is configured
    #[error("Merchant profile is not configured")]
    MerchantProfileMissing,

    /// The merchant profile could not be read or is malformed
    #[error("Invalid merchant profile: {message}")]
    InvalidProfile {
        /// Description of the problem
        message: String,
    },

    /// Currency conversion failed (unknown pair, overflow)
    #[error("Cannot convert {from} to {to}: {reason}")]
    CurrencyConversion {
        /// Source currency code
        from: String,
        /// Target currency code
        to: String,
        /// Why the conversion failed
        reason: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV or JSON parsing error
    #[error("Parse error{}: {message}", .line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

fn describe_state(state: &Option<TransferState>) -> String {
    state
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl From<std::io::Error> for PaymentError {
    fn from(error: std::io::Error) -> Self {
        PaymentError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for PaymentError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        PaymentError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(error: serde_json::Error) -> Self {
        PaymentError::ParseError {
            line: Some(error.line() as u64),
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl PaymentError {
    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: impl ToString) -> Self {
        PaymentError::InvalidAmount {
            amount: amount.to_string(),
        }
    }

    /// Create an InvalidTransition error
    pub fn invalid_transition(
        transfer: TransferId,
        from: Option<TransferState>,
        to: TransferState,
    ) -> Self {
        PaymentError::InvalidTransition { transfer, from, to }
    }

    /// Create a CurrencyConversion error
    pub fn conversion(from: &str, to: &str, reason: &str) -> Self {
        PaymentError::CurrencyConversion {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Classify a ledger error raised while creating an account
    pub fn from_account_ledger_error(error: LedgerError, id: AccountId) -> Self {
        match error {
            LedgerError::Unavailable(message) => PaymentError::LedgerUnavailable { message },
            LedgerError::DuplicateId(_) => PaymentError::DuplicateAccount { id },
            other => PaymentError::LedgerRejected {
                reason: other.to_string(),
            },
        }
    }

    /// Classify a ledger error raised while creating a transfer
    pub fn from_transfer_ledger_error(error: LedgerError, id: TransferId) -> Self {
        match error {
            LedgerError::Unavailable(message) => PaymentError::LedgerUnavailable { message },
            LedgerError::DuplicateId(_) => PaymentError::DuplicateTransfer { id },
            other => PaymentError::LedgerRejected {
                reason: other.to_string(),
            },
        }
    }

    /// Stable snake_case label of the error kind, free of internal detail
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidAmount { .. } => "invalid_amount",
            PaymentError::LedgerUnavailable { .. } => "ledger_unavailable",
            PaymentError::DuplicateAccount { .. } => "duplicate_account",
            PaymentError::DuplicateTransfer { .. } => "duplicate_transfer",
            PaymentError::LedgerRejected { .. } => "ledger_rejected",
            PaymentError::InvalidTransition { .. } => "invalid_transition",
            PaymentError::SettlementRejected { .. } => "settlement_rejected",
            PaymentError::SettlementTimeout { .. } => "settlement_timeout",
            PaymentError::UnknownCorrelation { .. } => "unknown_correlation",
            PaymentError::MerchantProfileMissing => "merchant_profile_missing",
            PaymentError::InvalidProfile { .. } => "invalid_profile",
            PaymentError::CurrencyConversion { .. } => "currency_conversion",
            PaymentError::IoError { .. } => "io_error",
            PaymentError::ParseError { .. } => "parse_error",
        }
    }

    /// True only for transient failures a caller may retry with a fresh id
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::LedgerUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::invalid_amount(
        PaymentError::invalid_amount("-5"),
        "Invalid amount '-5'"
    )]
    #[case::duplicate_account(
        PaymentError::DuplicateAccount { id: AccountId::new(255) },
        "Account 000000000000000000000000000000ff already exists"
    )]
    #[case::transition_from_known(
        PaymentError::invalid_transition(TransferId::new(1), Some(TransferState::Failed), TransferState::Finalized),
        "Invalid transition of transfer 00000000000000000000000000000001 from failed to finalized"
    )]
    #[case::transition_from_unknown(
        PaymentError::invalid_transition(TransferId::new(1), None, TransferState::Finalized),
        "Invalid transition of transfer 00000000000000000000000000000001 from unknown to finalized"
    )]
    #[case::parse_error_with_line(
        PaymentError::ParseError { line: Some(42), message: "Invalid field".to_string() },
        "Parse error at line 42: Invalid field"
    )]
    #[case::parse_error_without_line(
        PaymentError::ParseError { line: None, message: "Invalid field".to_string() },
        "Parse error: Invalid field"
    )]
    #[case::profile_missing(
        PaymentError::MerchantProfileMissing,
        "Merchant profile is not configured"
    )]
    fn test_error_display(#[case] error: PaymentError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::unavailable(LedgerError::Unavailable("down".into()), true)]
    #[case::duplicate(LedgerError::DuplicateId(3), false)]
    #[case::missing(LedgerError::AccountNotFound(AccountId::new(3)), false)]
    #[case::overflow(LedgerError::BalanceOverflow(AccountId::new(3)), false)]
    fn test_ledger_error_retryable(#[case] error: LedgerError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }

    #[test]
    fn test_account_classification() {
        let id = AccountId::new(5);

        assert_eq!(
            PaymentError::from_account_ledger_error(LedgerError::DuplicateId(5), id),
            PaymentError::DuplicateAccount { id }
        );
        assert!(PaymentError::from_account_ledger_error(
            LedgerError::Unavailable("timeout".into()),
            id
        )
        .is_retryable());
    }

    #[test]
    fn test_transfer_classification() {
        let id = TransferId::new(5);

        assert_eq!(
            PaymentError::from_transfer_ledger_error(LedgerError::DuplicateId(5), id),
            PaymentError::DuplicateTransfer { id }
        );
        assert!(matches!(
            PaymentError::from_transfer_ledger_error(LedgerError::SameAccount, id),
            PaymentError::LedgerRejected { .. }
        ));
        assert!(matches!(
            PaymentError::from_transfer_ledger_error(LedgerError::BalanceOverflow(AccountId::new(3)), id),
            PaymentError::LedgerRejected { .. }
        ));
    }

    #[rstest]
    #[case::amount(PaymentError::invalid_amount("0"), "invalid_amount")]
    #[case::timeout(PaymentError::SettlementTimeout { transfer: TransferId::new(1) }, "settlement_timeout")]
    #[case::profile(PaymentError::MerchantProfileMissing, "merchant_profile_missing")]
    fn test_error_code(#[case] error: PaymentError, #[case] expected: &str) {
        assert_eq!(error.code(), expected);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: PaymentError = io_error.into();
        assert!(matches!(error, PaymentError::IoError { .. }));
        assert!(!error.is_retryable());
    }
}
