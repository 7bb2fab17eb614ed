//! In-memory two-phase accounting ledger
//!
//! This module provides `InMemoryLedger`, a `LedgerClient` that follows the
//! semantics of a replicated double-entry ledger with pending transfers:
//!
//! - Account and transfer ids are unique for the lifetime of the ledger
//! - A pending transfer reserves value (`debits_pending` / `credits_pending`)
//!   without posting it
//! - A pending transfer is resolved exactly once, either posted or voided,
//!   or expires when its timeout elapses
//! - A transfer that would overflow any balance it touches is rejected whole
//!
//! # Design
//!
//! All ledger state sits behind a single mutex. A real ledger applies
//! requests one at a time through consensus; the mutex gives the same serial
//! order. The lock is never held across an await point.
//!
//! The ledger also carries two testing aids: an "unreachable" switch that
//! makes every call fail with `LedgerError::Unavailable`, and call counters
//! so tests can assert that validation failures never reached the ledger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::traits::{LedgerClient, LedgerTransfer, TransferKind};
use crate::types::{Account, AccountId, Cents, LedgerError, TransferId};

/// Balances of a ledger account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountBalance {
    /// Value reserved by unresolved pending debits
    pub debits_pending: Cents,
    /// Value debited for good
    pub debits_posted: Cents,
    /// Value reserved by unresolved pending credits
    pub credits_pending: Cents,
    /// Value credited for good
    pub credits_posted: Cents,
}

/// Resolution status of a pending transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    /// Not a pending transfer (single-phase, post or void)
    None,
    /// Reserved and unresolved
    Pending,
    /// Posted by a later transfer
    Posted,
    /// Voided by a later transfer
    Voided,
    /// Released by the ledger after its timeout
    Expired,
}

#[derive(Debug)]
struct StoredAccount {
    account: Account,
    balance: AccountBalance,
}

#[derive(Debug)]
struct StoredTransfer {
    transfer: LedgerTransfer,
    status: PendingStatus,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Book {
    accounts: HashMap<AccountId, StoredAccount>,
    transfers: HashMap<TransferId, StoredTransfer>,
}

impl Book {
    fn balance_mut(&mut self, id: AccountId) -> Result<&mut AccountBalance, LedgerError> {
        self.accounts
            .get_mut(&id)
            .map(|stored| &mut stored.balance)
            .ok_or(LedgerError::AccountNotFound(id))
    }

    /// Release a pending transfer whose timeout elapsed
    fn expire_if_due(&mut self, pending_id: TransferId, now: Instant) {
        let Some(stored) = self.transfers.get_mut(&pending_id) else {
            return;
        };
        let due = stored.status == PendingStatus::Pending
            && stored.expires_at.is_some_and(|deadline| now >= deadline);
        if !due {
            return;
        }

        stored.status = PendingStatus::Expired;
        let (debit, credit, amount) = (
            stored.transfer.debit_account_id,
            stored.transfer.credit_account_id,
            stored.transfer.amount,
        );
        if let Ok(balance) = self.balance_mut(debit) {
            balance.debits_pending = balance.debits_pending.saturating_sub(amount);
        }
        if let Ok(balance) = self.balance_mut(credit) {
            balance.credits_pending = balance.credits_pending.saturating_sub(amount);
        }
        debug!(pending_id = %pending_id, "Ledger: pending transfer expired");
    }

    fn apply(&mut self, transfer: &LedgerTransfer, now: Instant) -> Result<(), LedgerError> {
        if self.transfers.contains_key(&transfer.id) {
            return Err(LedgerError::DuplicateId(transfer.id.as_u128()));
        }

        match transfer.kind {
            TransferKind::Single | TransferKind::Pending { .. } => {
                if transfer.amount == 0 {
                    return Err(LedgerError::ZeroAmount);
                }
                if transfer.debit_account_id == transfer.credit_account_id {
                    return Err(LedgerError::SameAccount);
                }
                for id in [transfer.debit_account_id, transfer.credit_account_id] {
                    if !self.accounts.contains_key(&id) {
                        return Err(LedgerError::AccountNotFound(id));
                    }
                }

                let (status, expires_at) = match transfer.kind {
                    TransferKind::Pending { timeout } => {
                        (PendingStatus::Pending, Some(now + timeout))
                    }
                    _ => (PendingStatus::None, None),
                };
                let pending = status == PendingStatus::Pending;
                let (debit_id, credit_id, amount) = (
                    transfer.debit_account_id,
                    transfer.credit_account_id,
                    transfer.amount,
                );

                // Both balances are checked before either is written.
                let mut debit = *self.balance_mut(debit_id)?;
                let mut credit = *self.balance_mut(credit_id)?;
                if pending {
                    debit.debits_pending = add(debit.debits_pending, amount, debit_id)?;
                    credit.credits_pending = add(credit.credits_pending, amount, credit_id)?;
                } else {
                    debit.debits_posted = add(debit.debits_posted, amount, debit_id)?;
                    credit.credits_posted = add(credit.credits_posted, amount, credit_id)?;
                }
                *self.balance_mut(debit_id)? = debit;
                *self.balance_mut(credit_id)? = credit;

                self.transfers.insert(
                    transfer.id,
                    StoredTransfer {
                        transfer: transfer.clone(),
                        status,
                        expires_at,
                    },
                );
                Ok(())
            }
            TransferKind::PostPending { pending_id } | TransferKind::VoidPending { pending_id } => {
                self.expire_if_due(pending_id, now);

                let stored = self
                    .transfers
                    .get(&pending_id)
                    .ok_or(LedgerError::PendingTransferNotFound(pending_id))?;
                match stored.status {
                    PendingStatus::Pending => {}
                    PendingStatus::Posted => {
                        return Err(LedgerError::PendingTransferAlreadyPosted(pending_id))
                    }
                    PendingStatus::Voided => {
                        return Err(LedgerError::PendingTransferAlreadyVoided(pending_id))
                    }
                    PendingStatus::Expired => {
                        return Err(LedgerError::PendingTransferExpired(pending_id))
                    }
                    PendingStatus::None => {
                        return Err(LedgerError::PendingTransferNotFound(pending_id))
                    }
                }

                let post = matches!(transfer.kind, TransferKind::PostPending { .. });
                let (debit_id, credit_id, amount) = (
                    stored.transfer.debit_account_id,
                    stored.transfer.credit_account_id,
                    stored.transfer.amount,
                );

                let mut debit = *self.balance_mut(debit_id)?;
                let mut credit = *self.balance_mut(credit_id)?;
                debit.debits_pending = debit.debits_pending.saturating_sub(amount);
                credit.credits_pending = credit.credits_pending.saturating_sub(amount);
                if post {
                    debit.debits_posted = add(debit.debits_posted, amount, debit_id)?;
                    credit.credits_posted = add(credit.credits_posted, amount, credit_id)?;
                }
                *self.balance_mut(debit_id)? = debit;
                *self.balance_mut(credit_id)? = credit;

                if let Some(pending) = self.transfers.get_mut(&pending_id) {
                    pending.status = if post {
                        PendingStatus::Posted
                    } else {
                        PendingStatus::Voided
                    };
                }

                let mut resolution = transfer.clone();
                resolution.debit_account_id = debit_id;
                resolution.credit_account_id = credit_id;
                resolution.amount = amount;
                self.transfers.insert(
                    transfer.id,
                    StoredTransfer {
                        transfer: resolution,
                        status: PendingStatus::None,
                        expires_at: None,
                    },
                );
                Ok(())
            }
        }
    }
}

fn add(balance: Cents, amount: Cents, account: AccountId) -> Result<Cents, LedgerError> {
    balance
        .checked_add(amount)
        .ok_or(LedgerError::BalanceOverflow(account))
}

/// In-memory ledger with two-phase transfer support
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    book: Mutex<Book>,
    unavailable: AtomicBool,
    latency: Option<Duration>,
    account_calls: AtomicUsize,
    transfer_calls: AtomicUsize,
}

impl InMemoryLedger {
    /// Create an empty, reachable ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger that suspends for `latency` on every call
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Simulate losing (or regaining) the connection to the ledger
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `create_account` calls received, including failed ones
    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_transfer` calls received, including failed ones
    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    /// Number of accounts created
    pub fn account_count(&self) -> usize {
        self.book.lock().accounts.len()
    }

    /// Balances of `id`, if the account exists
    pub fn balance(&self, id: AccountId) -> Option<AccountBalance> {
        self.book.lock().accounts.get(&id).map(|stored| stored.balance)
    }

    /// Owner recorded for `id`, if the account exists
    pub fn account_owner(&self, id: AccountId) -> Option<String> {
        self.book
            .lock()
            .accounts
            .get(&id)
            .map(|stored| stored.account.owner.clone())
    }

    /// Pending status of transfer `id`, if it exists
    pub fn transfer_status(&self, id: TransferId) -> Option<PendingStatus> {
        let mut book = self.book.lock();
        book.expire_if_due(id, Instant::now());
        book.transfers.get(&id).map(|stored| stored.status)
    }

    async fn enter(&self) -> Result<(), LedgerError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(
                "no replica acknowledged the request".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn create_account(&self, account: &Account) -> Result<(), LedgerError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let mut book = self.book.lock();
        if book.accounts.contains_key(&account.id) {
            return Err(LedgerError::DuplicateId(account.id.as_u128()));
        }
        book.accounts.insert(
            account.id,
            StoredAccount {
                account: account.clone(),
                balance: AccountBalance::default(),
            },
        );
        trace!(account_id = %account.id, owner = %account.owner, "Ledger: account created");
        Ok(())
    }

    async fn create_transfer(&self, transfer: &LedgerTransfer) -> Result<(), LedgerError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let result = self.book.lock().apply(transfer, Instant::now());
        trace!(transfer_id = %transfer.id, kind = ?transfer.kind, ok = result.is_ok(), "Ledger: transfer applied");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LEDGER_ID, TRANSFER_CODE};
    use rstest::rstest;

    fn transfer(id: u128, debit: u128, credit: u128, amount: Cents, kind: TransferKind) -> LedgerTransfer {
        LedgerTransfer {
            id: TransferId::new(id),
            debit_account_id: AccountId::new(debit),
            credit_account_id: AccountId::new(credit),
            amount,
            ledger: LEDGER_ID,
            code: TRANSFER_CODE,
            timestamp: 0,
            kind,
        }
    }

    fn pending_kind() -> TransferKind {
        TransferKind::Pending {
            timeout: Duration::from_secs(60),
        }
    }

    async fn ledger_with_accounts() -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        ledger
            .create_account(&Account::new(AccountId::new(1), "merchant"))
            .await
            .unwrap();
        ledger
            .create_account(&Account::new(AccountId::new(2), "u1"))
            .await
            .unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_create_account_rejects_duplicate_id() {
        let ledger = ledger_with_accounts().await;

        let result = ledger
            .create_account(&Account::new(AccountId::new(2), "u2"))
            .await;

        assert_eq!(result, Err(LedgerError::DuplicateId(2)));
        assert_eq!(ledger.account_owner(AccountId::new(2)).as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_pending_transfer_reserves_without_posting() {
        let ledger = ledger_with_accounts().await;

        ledger
            .create_transfer(&transfer(10, 2, 1, 500, pending_kind()))
            .await
            .unwrap();

        let payer = ledger.balance(AccountId::new(2)).unwrap();
        let merchant = ledger.balance(AccountId::new(1)).unwrap();
        assert_eq!(payer.debits_pending, 500);
        assert_eq!(payer.debits_posted, 0);
        assert_eq!(merchant.credits_pending, 500);
        assert_eq!(merchant.credits_posted, 0);
        assert_eq!(
            ledger.transfer_status(TransferId::new(10)),
            Some(PendingStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_post_pending_moves_value_once() {
        let ledger = ledger_with_accounts().await;
        let pending_id = TransferId::new(10);
        ledger
            .create_transfer(&transfer(10, 2, 1, 500, pending_kind()))
            .await
            .unwrap();

        ledger
            .create_transfer(&transfer(11, 0, 0, 0, TransferKind::PostPending { pending_id }))
            .await
            .unwrap();
        let second = ledger
            .create_transfer(&transfer(12, 0, 0, 0, TransferKind::PostPending { pending_id }))
            .await;

        assert_eq!(second, Err(LedgerError::PendingTransferAlreadyPosted(pending_id)));
        let merchant = ledger.balance(AccountId::new(1)).unwrap();
        assert_eq!(merchant.credits_posted, 500);
        assert_eq!(merchant.credits_pending, 0);
    }

    #[tokio::test]
    async fn test_void_then_post_is_rejected() {
        let ledger = ledger_with_accounts().await;
        let pending_id = TransferId::new(10);
        ledger
            .create_transfer(&transfer(10, 2, 1, 500, pending_kind()))
            .await
            .unwrap();

        ledger
            .create_transfer(&transfer(11, 0, 0, 0, TransferKind::VoidPending { pending_id }))
            .await
            .unwrap();
        let post = ledger
            .create_transfer(&transfer(12, 0, 0, 0, TransferKind::PostPending { pending_id }))
            .await;

        assert_eq!(post, Err(LedgerError::PendingTransferAlreadyVoided(pending_id)));
        let payer = ledger.balance(AccountId::new(2)).unwrap();
        assert_eq!(payer, AccountBalance::default());
    }

    #[rstest]
    #[case::pending(pending_kind())]
    #[case::single(TransferKind::Single)]
    #[tokio::test]
    async fn test_overflowing_transfer_is_rejected_whole(#[case] kind: TransferKind) {
        let ledger = ledger_with_accounts().await;
        ledger
            .create_account(&Account::new(AccountId::new(3), "u2"))
            .await
            .unwrap();
        let amount = i64::MAX as Cents;

        ledger.create_transfer(&transfer(10, 2, 1, amount, kind)).await.unwrap();
        ledger.create_transfer(&transfer(11, 3, 1, amount, kind)).await.unwrap();
        let before = (
            ledger.balance(AccountId::new(1)).unwrap(),
            ledger.balance(AccountId::new(2)).unwrap(),
        );
        let third = ledger.create_transfer(&transfer(12, 2, 1, amount, kind)).await;

        assert!(matches!(third, Err(LedgerError::BalanceOverflow(_))));
        assert!(!third.unwrap_err().is_retryable());
        assert_eq!(
            (
                ledger.balance(AccountId::new(1)).unwrap(),
                ledger.balance(AccountId::new(2)).unwrap(),
            ),
            before
        );
        assert_eq!(ledger.transfer_status(TransferId::new(12)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_transfer_expires() {
        let ledger = ledger_with_accounts().await;
        let pending_id = TransferId::new(10);
        ledger
            .create_transfer(&transfer(10, 2, 1, 500, pending_kind()))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let post = ledger
            .create_transfer(&transfer(11, 0, 0, 0, TransferKind::PostPending { pending_id }))
            .await;

        assert_eq!(post, Err(LedgerError::PendingTransferExpired(pending_id)));
        assert_eq!(
            ledger.balance(AccountId::new(1)).unwrap(),
            AccountBalance::default()
        );
    }

    #[tokio::test]
    async fn test_rejects_invalid_references() {
        let ledger = ledger_with_accounts().await;

        assert_eq!(
            ledger
                .create_transfer(&transfer(10, 2, 99, 500, TransferKind::Single))
                .await,
            Err(LedgerError::AccountNotFound(AccountId::new(99)))
        );
        assert_eq!(
            ledger
                .create_transfer(&transfer(11, 2, 2, 500, TransferKind::Single))
                .await,
            Err(LedgerError::SameAccount)
        );
        assert_eq!(
            ledger
                .create_transfer(&transfer(12, 2, 1, 0, TransferKind::Single))
                .await,
            Err(LedgerError::ZeroAmount)
        );
    }

    #[tokio::test]
    async fn test_unavailable_ledger_counts_calls_but_changes_nothing() {
        let ledger = ledger_with_accounts().await;
        ledger.set_unavailable(true);

        let result = ledger
            .create_transfer(&transfer(10, 2, 1, 500, pending_kind()))
            .await;

        assert!(matches!(result, Err(LedgerError::Unavailable(_))));
        assert_eq!(ledger.transfer_calls(), 1);
        assert_eq!(ledger.transfer_status(TransferId::new(10)), None);
    }
}
