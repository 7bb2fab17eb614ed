//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `ids`: 128-bit account and transfer identifiers
//! - `account`: Account descriptor and ledger classification constants
//! - `transfer`: Transfer record and its lifecycle states
//! - `request`: Inbound payment request/response shapes
//! - `profile`: Merchant profile
//! - `error`: Error types for the payments bridge

pub mod account;
pub mod error;
pub mod ids;
pub mod profile;
pub mod request;
pub mod transfer;

pub use account::{
    is_anonymous, Account, ACCOUNT_CODE, ANONYMOUS_USER, LEDGER_ID, MERCHANT_ACCOUNT_ID,
    TRANSFER_CODE,
};
pub use error::{LedgerError, PaymentError, GENERIC_FAILURE_MESSAGE};
pub use ids::{AccountId, ParseIdError, TransferId};
pub use profile::StoreManagerProfile;
pub use request::{cents_from_price, PaymentRequest, PaymentResponse};
pub use transfer::{Cents, FailureReason, Transfer, TransferState};
