//! Core business logic module
//!
//! This module contains the payment lifecycle components:
//! - `traits` - Boundaries to the ledger, payment network, converter and mapping store
//! - `ledger` - In-memory two-phase accounting ledger
//! - `mapping_store` - Persistent user → wallet account mapping
//! - `wallet_registry` - Resolves users to wallet accounts
//! - `watchdog` - Settlement-window timers
//! - `lifecycle` - Pending → Finalized / Failed state machine
//! - `settlement` - Simulated payment network and report listener
//! - `converter` - Currency conversion
//! - `profile` - Merchant profile holder
//! - `checkout` - Inbound payment flow

pub mod checkout;
pub mod converter;
pub mod ledger;
pub mod lifecycle;
pub mod mapping_store;
pub mod profile;
pub mod settlement;
pub mod traits;
pub mod wallet_registry;
pub mod watchdog;

pub use checkout::{bootstrap_merchant_account, CheckoutService, PaymentReceipt};
pub use converter::{format_amount, RateTable, SOURCE_CURRENCY};
pub use ledger::{AccountBalance, InMemoryLedger, PendingStatus};
pub use lifecycle::{LifecycleConfig, SettlementHandle, TransactionLifecycleManager};
pub use mapping_store::{InMemoryMappingStore, JsonFileMappingStore};
pub use profile::MerchantProfile;
pub use settlement::{run_settlement_listener, NetworkBehavior, SimulatedNetwork};
pub use traits::{CurrencyConverter, LedgerClient, PaymentInitiator, WalletMappingStore};
pub use wallet_registry::WalletRegistry;
pub use watchdog::SettlementWatchdog;
