//! Rust Payments Bridge Library
//! # Overview
//!
//! This library mediates micro-payments between end-user wallets and a
//! merchant account held on a double-entry ledger, and bridges that ledger
//! to an asynchronous payment network.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Transfer, ids, errors)
//! - [`cli`] - CLI arguments parsing
//! - [`config`] - Run configuration
//! - [`logging`] - Tracing subscriber setup
//! - [`core`] - Business logic components:
//!   - [`core::wallet_registry`] - User → wallet account resolution
//!   - [`core::lifecycle`] - Pending → Finalized / Failed transfer state machine
//!   - [`core::watchdog`] - Settlement-window timers
//!   - [`core::checkout`] - Inbound payment flow
//! - [`io`] - CSV request reading and result writing
//! - [`runner`] - Batch driver tying it all together
//!
//! # Transfer Lifecycle
//!
//! - **Pending**: value is held on the ledger while the network settles
//! - **Finalized**: the network reported the exact amount; the hold is posted
//! - **Failed**: the network declined, under/over-paid, or the settlement
//!   window elapsed; the hold is voided
//!
//! Posted ledger balances only ever include finalized payments.

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod runner;
pub mod types;

pub use config::BridgeConfig;
pub use core::{CheckoutService, TransactionLifecycleManager, WalletRegistry};
pub use io::write_results_csv;
pub use runner::{BridgeRunner, RunSummary};
pub use types::{
    Account, AccountId, PaymentError, PaymentRequest, PaymentResponse, Transfer, TransferId,
    TransferState,
};
