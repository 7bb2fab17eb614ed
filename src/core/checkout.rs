//! Inbound payment flow
//!
//! This module provides `CheckoutService`, which turns one inbound payment
//! request into a pending transfer with an initiated settlement.
//!
//! # Flow
//!
//! ```text
//! PaymentRequest
//!     ├── MerchantProfile::current()        (fail fast if absent)
//!     ├── cents_from_price()                (local validation)
//!     ├── CurrencyConverter::convert()      (display amount)
//!     ├── WalletRegistry::resolve_or_create_wallet()
//!     ├── TransactionLifecycleManager::open_pending_transfer()
//!     └── TransactionLifecycleManager::initiate_external_settlement()
//! ```
//!
//! Every step before `open_pending_transfer` is free of ledger side effects
//! except wallet creation, so a request that fails validation, conversion or
//! profile lookup never touches the ledger at all.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info};

use super::converter::SOURCE_CURRENCY;
use super::lifecycle::{SettlementHandle, TransactionLifecycleManager};
use super::profile::MerchantProfile;
use super::traits::{CurrencyConverter, LedgerClient};
use super::wallet_registry::WalletRegistry;
use crate::types::{
    cents_from_price, Account, Cents, LedgerError, PaymentError, PaymentRequest, PaymentResponse,
    Transfer,
};

/// Outcome of a successfully initiated payment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    /// The pending transfer
    pub transfer: Transfer,
    /// Settlement correlation
    pub settlement: SettlementHandle,
    /// Charged amount in source-currency cents
    pub amount_cents: Cents,
    /// Price converted to the buyer's currency
    pub local_amount: Decimal,
}

/// Processes inbound payment requests
#[derive(Clone)]
pub struct CheckoutService {
    profile: Arc<MerchantProfile>,
    wallets: WalletRegistry,
    lifecycle: TransactionLifecycleManager,
    converter: Arc<dyn CurrencyConverter>,
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService")
            .field("profile", &self.profile)
            .field("wallets", &self.wallets)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl CheckoutService {
    /// Create a checkout service
    ///
    /// # Arguments
    ///
    /// * `profile` - Merchant profile holder (may be empty)
    /// * `wallets` - Wallet registry for payer accounts
    /// * `lifecycle` - Lifecycle manager owning the transfers
    /// * `converter` - Converter used for the buyer-facing amount
    pub fn new(
        profile: Arc<MerchantProfile>,
        wallets: WalletRegistry,
        lifecycle: TransactionLifecycleManager,
        converter: Arc<dyn CurrencyConverter>,
    ) -> Self {
        Self {
            profile,
            wallets,
            lifecycle,
            converter,
        }
    }

    /// Lifecycle manager backing this service
    pub fn lifecycle(&self) -> &TransactionLifecycleManager {
        &self.lifecycle
    }

    /// Process one payment request
    ///
    /// # Returns
    ///
    /// * `Ok(PaymentReceipt)` - Transfer opened and settlement initiated
    /// * `Err(PaymentError::MerchantProfileMissing)` - No merchant profile; nothing was touched
    /// * `Err(PaymentError::InvalidAmount)` - Price is not a positive whole number of cents
    /// * `Err(PaymentError::CurrencyConversion)` - No rate for the buyer's currency
    /// * `Err(PaymentError::SettlementRejected)` - The network declined; the transfer is `Failed`
    /// * Ledger errors from wallet creation or opening the transfer
    pub async fn process(&self, request: &PaymentRequest) -> Result<PaymentReceipt, PaymentError> {
        let profile = self.profile.current()?;

        let amount_cents = cents_from_price(request.price)?;
        let ledger_amount =
            i64::try_from(amount_cents).map_err(|_| PaymentError::invalid_amount(request.price))?;

        let local_amount =
            self.converter
                .convert(request.price, SOURCE_CURRENCY, &request.target_currency)?;

        let wallet = self.wallets.resolve_or_create_wallet(&request.user).await?;
        let transfer = self
            .lifecycle
            .open_pending_transfer(&wallet, ledger_amount)
            .await?;
        let settlement = self
            .lifecycle
            .initiate_external_settlement(
                &transfer,
                &request.sender_pointer,
                &profile.payment_pointer,
            )
            .await?;

        info!(
            transfer_id = %transfer.id,
            user = %request.user,
            product = %request.product,
            amount = amount_cents,
            local_amount = %local_amount,
            currency = %request.target_currency,
            "Payment initiated"
        );

        Ok(PaymentReceipt {
            transfer,
            settlement,
            amount_cents,
            local_amount,
        })
    }

    /// Process a request and shape the outcome for the end user
    ///
    /// Failures are logged with their cause and answered with the generic
    /// failure message only.
    pub async fn respond(&self, request: &PaymentRequest) -> PaymentResponse {
        match self.process(request).await {
            Ok(receipt) => PaymentResponse::initiated(receipt.transfer.id),
            Err(e) => {
                error!(
                    user = %request.user,
                    product = %request.product,
                    error = %e,
                    "Payment request failed"
                );
                PaymentResponse::failure()
            }
        }
    }
}

/// Create the well-known merchant account on the ledger
///
/// An account that already exists is fine; every other ledger error is
/// returned.
pub async fn bootstrap_merchant_account(ledger: &dyn LedgerClient) -> Result<Account, PaymentError> {
    let merchant = Account::merchant();

    match ledger.create_account(&merchant).await {
        Ok(()) => info!(account_id = %merchant.id, "Merchant account created"),
        Err(LedgerError::DuplicateId(_)) => {
            debug!(account_id = %merchant.id, "Merchant account already exists")
        }
        Err(e) => return Err(PaymentError::from_account_ledger_error(e, merchant.id)),
    }

    Ok(merchant)
}
