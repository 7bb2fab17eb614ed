//! Boundary traits for the collaborators of the payment lifecycle
//!
//! This module defines the capability interfaces the core depends on, so the
//! ledger, the payment network, the currency lookup and the wallet mapping
//! can each be swapped for a real client or a test double.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;

use crate::types::{Account, AccountId, Cents, LedgerError, PaymentError, TransferId};

/// How a ledger transfer moves value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Post immediately
    Single,

    /// Reserve the amount; the ledger releases it on its own after `timeout`
    Pending {
        /// How long the ledger keeps the reservation
        timeout: Duration,
    },

    /// Post the full amount of an earlier pending transfer
    PostPending {
        /// The pending transfer being posted
        pending_id: TransferId,
    },

    /// Release an earlier pending transfer without moving value
    VoidPending {
        /// The pending transfer being voided
        pending_id: TransferId,
    },
}

/// A transfer as submitted to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransfer {
    /// Unique transfer id
    pub id: TransferId,
    /// Account debited
    pub debit_account_id: AccountId,
    /// Account credited
    pub credit_account_id: AccountId,
    /// Amount in cents
    pub amount: Cents,
    /// Ledger the transfer belongs to
    pub ledger: u32,
    /// Transfer class
    pub code: u16,
    /// Submission time, nanoseconds since the Unix epoch
    pub timestamp: u64,
    /// Single-phase or two-phase semantics
    pub kind: TransferKind,
}

/// Replicated accounting ledger
///
/// Calls may suspend; callers must not hold locks across them.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Create an account; `DuplicateId` if the id is taken
    async fn create_account(&self, account: &Account) -> Result<(), LedgerError>;

    /// Create a transfer of any [`TransferKind`]
    async fn create_transfer(&self, transfer: &LedgerTransfer) -> Result<(), LedgerError>;
}

/// Payment request sent to the external network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    /// Transfer this payment settles
    pub transfer_id: TransferId,
    /// Paying wallet's pointer
    pub payer_pointer: String,
    /// Merchant's pointer
    pub payee_pointer: String,
    /// Amount in cents
    pub amount: Cents,
}

/// Immediate answer of the payment network to an initiation
///
/// `accepted` only means the network took the request; it says nothing
/// about the payment having settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementAck {
    /// Network-side id used to correlate later reports
    pub correlation_id: String,
    /// Whether the network accepted the request
    pub accepted: bool,
}

/// Later report of what the network actually settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReport {
    /// Correlation id from the [`SettlementAck`]
    pub correlation_id: String,
    /// Settled amount in cents
    pub amount: Cents,
}

/// Error raised by a payment initiator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("payment initiation failed: {0}")]
pub struct InitiationError(pub String);

/// External payment network
#[async_trait]
pub trait PaymentInitiator: Send + Sync {
    /// Send a payment request; returns before the payment settles
    async fn initiate(&self, request: &SettlementRequest) -> Result<SettlementAck, InitiationError>;
}

/// Pure currency conversion
pub trait CurrencyConverter: Send + Sync {
    /// Convert `amount` from one currency code to another, rounded to two decimals
    fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, PaymentError>;
}

/// Persistent user id → account id mapping
///
/// `bind` is an insert-if-absent: concurrent binders for the same user all
/// receive the first binding that landed.
#[async_trait]
pub trait WalletMappingStore: Send + Sync + fmt::Debug {
    /// Account bound to `user_id`, if any
    async fn lookup(&self, user_id: &str) -> Result<Option<AccountId>, PaymentError>;

    /// Bind `user_id` to `account` unless already bound; returns the binding in effect
    async fn bind(&self, user_id: &str, account: AccountId) -> Result<AccountId, PaymentError>;
}
