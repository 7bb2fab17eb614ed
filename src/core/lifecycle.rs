//! Transaction Lifecycle Manager: the pending → finalized / failed state machine
//!
//! This module provides the `TransactionLifecycleManager` struct, which drives
//! a single payment through its ledger and settlement steps.
//!
//! # State machine
//!
//! ```text
//!            finalize()                 (post pending ledger transfer)
//! Pending ─────────────────► Finalized
//!    │
//!    │ fail() / watchdog     (void pending ledger transfer)
//!    └─────────────────────► Failed
//! ```
//!
//! # Ledger interaction
//!
//! Opening a transfer creates a *pending* ledger transfer: the amount is
//! reserved on both accounts but not posted. `finalize` posts it and `fail`
//! voids it, so posted balances only ever show realized payments. The
//! pending transfer carries its own ledger timeout (settlement window plus a
//! grace period), which releases the reservation even if a void never
//! reaches the ledger.
//!
//! # Concurrency
//!
//! Transfers live in a `DashMap`. A transition first *claims* the transfer
//! under its map entry (synchronously, no await), then calls the ledger with
//! no lock held, then commits the terminal state. The claim makes the first
//! transition the only winner: a concurrent `finalize`/`fail` on the same
//! transfer sees the claim (or the terminal state) and gets
//! `InvalidTransition`. Operations on different transfers never contend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::traits::{
    LedgerClient, LedgerTransfer, PaymentInitiator, SettlementReport, SettlementRequest,
    TransferKind,
};
use super::watchdog::SettlementWatchdog;
use crate::types::{
    Account, AccountId, Cents, FailureReason, LedgerError, PaymentError, Transfer, TransferId,
    TransferState, LEDGER_ID, MERCHANT_ACCOUNT_ID, TRANSFER_CODE,
};

/// Default settlement window
pub const DEFAULT_SETTLEMENT_WINDOW: Duration = Duration::from_secs(30);

/// Default extra time the ledger keeps a reservation beyond the settlement window
pub const DEFAULT_LEDGER_HOLD_GRACE: Duration = Duration::from_secs(30);

/// Settings of the lifecycle manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Time a transfer may stay Pending before the watchdog fails it
    pub settlement_window: Duration,

    /// Extra ledger-side hold time after the settlement window
    pub ledger_hold_grace: Duration,

    /// Account credited by every transfer
    pub merchant_account: AccountId,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            settlement_window: DEFAULT_SETTLEMENT_WINDOW,
            ledger_hold_grace: DEFAULT_LEDGER_HOLD_GRACE,
            merchant_account: MERCHANT_ACCOUNT_ID,
        }
    }
}

impl LifecycleConfig {
    /// How long the ledger holds a pending transfer
    pub fn ledger_hold_timeout(&self) -> Duration {
        self.settlement_window + self.ledger_hold_grace
    }
}

/// Handle for an initiated external settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementHandle {
    /// The transfer being settled
    pub transfer_id: TransferId,
    /// Payment network correlation id
    pub correlation_id: String,
}

#[derive(Debug)]
struct TransferEntry {
    transfer: Transfer,
    /// Target of a transition whose ledger call is in progress
    in_flight: Option<TransferState>,
    /// End of the settlement window
    deadline: Instant,
}

enum Claim {
    /// Caller owns the transition and must commit or release it
    Proceed(Transfer),
    /// Already in the requested state; nothing to do
    AlreadyDone(Transfer),
}

/// Orchestrates the lifecycle of merchant-bound transfers
///
/// Cheap to clone; all clones share the same transfer table and watchdog.
#[derive(Clone)]
pub struct TransactionLifecycleManager {
    ledger: Arc<dyn LedgerClient>,
    initiator: Arc<dyn PaymentInitiator>,
    transfers: Arc<DashMap<TransferId, TransferEntry>>,
    correlations: Arc<DashMap<String, TransferId>>,
    watchdog: SettlementWatchdog,
    config: LifecycleConfig,
}

impl std::fmt::Debug for TransactionLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLifecycleManager")
            .field("transfers", &self.transfers.len())
            .field("armed_watchdogs", &self.watchdog.armed_count())
            .field("config", &self.config)
            .finish()
    }
}

impl TransactionLifecycleManager {
    /// Create a manager over a ledger and a payment initiator
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        initiator: Arc<dyn PaymentInitiator>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            ledger,
            initiator,
            transfers: Arc::new(DashMap::new()),
            correlations: Arc::new(DashMap::new()),
            watchdog: SettlementWatchdog::new(),
            config,
        }
    }

    /// Settings in effect
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Open a pending transfer of `amount_cents` from `payer` to the merchant
    ///
    /// The transfer is recorded locally only after the ledger acknowledged
    /// the pending transfer, and its settlement watchdog is armed at the
    /// same time. A failed open leaves nothing behind.
    ///
    /// # Returns
    ///
    /// * `Ok(Transfer)` - The new transfer in state `Pending`
    /// * `Err(PaymentError::InvalidAmount)` - `amount_cents <= 0`; the ledger is not called
    /// * `Err(PaymentError::LedgerUnavailable)` - Transient ledger failure
    /// * `Err(PaymentError::DuplicateTransfer)` - Generated id collided
    /// * `Err(PaymentError::LedgerRejected)` - Unknown payer account and similar
    pub async fn open_pending_transfer(
        &self,
        payer: &Account,
        amount_cents: i64,
    ) -> Result<Transfer, PaymentError> {
        let amount = match Cents::try_from(amount_cents) {
            Ok(amount) if amount > 0 => amount,
            _ => {
                warn!(payer = %payer.id, amount = amount_cents, "Rejected non-positive transfer amount");
                return Err(PaymentError::invalid_amount(amount_cents));
            }
        };

        let id = TransferId::random();
        let created_at = Utc::now();
        let request = LedgerTransfer {
            id,
            debit_account_id: payer.id,
            credit_account_id: self.config.merchant_account,
            amount,
            ledger: LEDGER_ID,
            code: TRANSFER_CODE,
            timestamp: created_at
                .timestamp_nanos_opt()
                .and_then(|nanos| u64::try_from(nanos).ok())
                .unwrap_or_default(),
            kind: TransferKind::Pending {
                timeout: self.config.ledger_hold_timeout(),
            },
        };

        self.ledger.create_transfer(&request).await.map_err(|e| {
            error!(transfer_id = %id, payer = %payer.id, error = %e, "Ledger refused pending transfer");
            PaymentError::from_transfer_ledger_error(e, id)
        })?;

        let transfer = Transfer::pending(
            id,
            payer.id,
            self.config.merchant_account,
            amount,
            created_at,
        );
        self.transfers.insert(
            id,
            TransferEntry {
                transfer: transfer.clone(),
                in_flight: None,
                deadline: Instant::now() + self.config.settlement_window,
            },
        );
        self.arm_watchdog(id, self.config.settlement_window);

        info!(transfer_id = %id, payer = %payer.id, amount = amount, "Pending transfer opened");
        Ok(transfer)
    }

    /// Ask the payment network to settle `transfer`
    ///
    /// Returns as soon as the network acknowledges the request; settlement
    /// completes later through [`settle`](Self::settle) or the watchdog.
    /// A declined or failed initiation drives the transfer to `Failed`.
    ///
    /// # Returns
    ///
    /// * `Ok(SettlementHandle)` - The network accepted the request
    /// * `Err(PaymentError::SettlementRejected)` - Declined or errored; transfer is now `Failed`
    /// * `Err(PaymentError::InvalidTransition)` - Transfer unknown or no longer `Pending`
    pub async fn initiate_external_settlement(
        &self,
        transfer: &Transfer,
        payer_pointer: &str,
        payee_pointer: &str,
    ) -> Result<SettlementHandle, PaymentError> {
        let current = self.state_of(transfer.id);
        if current != Some(TransferState::Pending) {
            return Err(PaymentError::invalid_transition(
                transfer.id,
                current,
                TransferState::Finalized,
            ));
        }

        let request = SettlementRequest {
            transfer_id: transfer.id,
            payer_pointer: payer_pointer.to_string(),
            payee_pointer: payee_pointer.to_string(),
            amount: transfer.amount,
        };

        let reason = match self.initiator.initiate(&request).await {
            Ok(ack) if ack.accepted => {
                if let Some(mut entry) = self.transfers.get_mut(&transfer.id) {
                    entry.transfer.correlation_id = Some(ack.correlation_id.clone());
                }
                self.correlations
                    .insert(ack.correlation_id.clone(), transfer.id);

                info!(
                    transfer_id = %transfer.id,
                    correlation_id = %ack.correlation_id,
                    "External settlement initiated"
                );
                return Ok(SettlementHandle {
                    transfer_id: transfer.id,
                    correlation_id: ack.correlation_id,
                });
            }
            Ok(ack) => format!("declined by payment network ({})", ack.correlation_id),
            Err(e) => e.to_string(),
        };

        warn!(transfer_id = %transfer.id, reason = %reason, "External settlement rejected");
        if let Err(e) = self.fail(transfer.id, FailureReason::SettlementRejected).await {
            warn!(transfer_id = %transfer.id, error = %e, "Could not fail rejected transfer");
        }
        Err(PaymentError::SettlementRejected {
            transfer: transfer.id,
            reason,
        })
    }

    /// Transition `Pending → Finalized`, posting the pending ledger transfer
    ///
    /// Idempotent: finalizing an already finalized transfer returns it
    /// without touching the ledger again.
    ///
    /// # Returns
    ///
    /// * `Ok(Transfer)` - The finalized transfer
    /// * `Err(PaymentError::InvalidTransition)` - Unknown, `Failed`, or another transition in progress
    /// * `Err(PaymentError::LedgerUnavailable)` / `LedgerRejected` - The post failed; the
    ///   transfer stays `Pending` under its settlement window, or is failed with
    ///   `SettlementTimeout` if the window closed while the post was in flight
    pub async fn finalize(&self, transfer_id: TransferId) -> Result<Transfer, PaymentError> {
        let transfer = match self.claim(transfer_id, TransferState::Finalized)? {
            Claim::AlreadyDone(transfer) => {
                debug!(transfer_id = %transfer_id, "Transfer already finalized");
                return Ok(transfer);
            }
            Claim::Proceed(transfer) => transfer,
        };

        let post = self.resolution(&transfer, TransferKind::PostPending {
            pending_id: transfer_id,
        });
        match self.ledger.create_transfer(&post).await {
            Ok(()) | Err(LedgerError::PendingTransferAlreadyPosted(_)) => {}
            Err(e) => {
                self.release(transfer_id);
                error!(transfer_id = %transfer_id, error = %e, "Ledger refused to post transfer");
                self.resume_window(transfer_id).await;
                return Err(PaymentError::from_transfer_ledger_error(e, post.id));
            }
        }

        let finalized = self.commit(transfer_id, TransferState::Finalized, None)?;
        self.watchdog.cancel(transfer_id);

        info!(transfer_id = %transfer_id, amount = finalized.amount, "Transfer finalized");
        Ok(finalized)
    }

    /// Transition `Pending → Failed`, voiding the pending ledger transfer
    ///
    /// The local state always lands in `Failed` once claimed: if the void
    /// cannot reach the ledger, the ledger-side hold timeout releases the
    /// reservation instead.
    ///
    /// # Returns
    ///
    /// * `Ok(Transfer)` - The failed transfer
    /// * `Err(PaymentError::InvalidTransition)` - Unknown, already terminal, or another
    ///   transition in progress
    pub async fn fail(
        &self,
        transfer_id: TransferId,
        reason: FailureReason,
    ) -> Result<Transfer, PaymentError> {
        let transfer = match self.claim(transfer_id, TransferState::Failed)? {
            Claim::Proceed(transfer) => transfer,
            Claim::AlreadyDone(transfer) => {
                return Err(PaymentError::invalid_transition(
                    transfer_id,
                    Some(transfer.state),
                    TransferState::Failed,
                ))
            }
        };

        let void = self.resolution(&transfer, TransferKind::VoidPending {
            pending_id: transfer_id,
        });
        match self.ledger.create_transfer(&void).await {
            Ok(())
            | Err(LedgerError::PendingTransferAlreadyVoided(_))
            | Err(LedgerError::PendingTransferExpired(_)) => {}
            Err(LedgerError::PendingTransferAlreadyPosted(_)) => {
                // The ledger is authoritative: value already moved.
                let finalized = self.commit(transfer_id, TransferState::Finalized, None)?;
                self.watchdog.cancel(transfer_id);
                error!(transfer_id = %transfer_id, "Ledger had already posted transfer, kept as finalized");
                return Err(PaymentError::invalid_transition(
                    transfer_id,
                    Some(finalized.state),
                    TransferState::Failed,
                ));
            }
            Err(e) => {
                warn!(
                    transfer_id = %transfer_id,
                    error = %e,
                    "Void did not reach the ledger, hold expires on its own"
                );
            }
        }

        let failed = self.commit(transfer_id, TransferState::Failed, Some(reason))?;
        self.watchdog.cancel(transfer_id);

        info!(
            transfer_id = %transfer_id,
            reason = %failed.failure.as_ref().map(|r| r.to_string()).unwrap_or_default(),
            "Transfer failed"
        );
        Ok(failed)
    }

    /// Compare the reported settled amount of `transfer_id` with `expected_amount`
    ///
    /// Exact equality, no tolerance. A transfer with no report yet does not
    /// verify. Never changes the transfer.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Reported amount equals `expected_amount`
    /// * `Ok(false)` - Mismatch or no report yet
    /// * `Err(PaymentError::InvalidTransition)` - Unknown transfer
    pub fn verify(&self, transfer_id: TransferId, expected_amount: Cents) -> Result<bool, PaymentError> {
        let entry = self.transfers.get(&transfer_id).ok_or_else(|| {
            PaymentError::invalid_transition(transfer_id, None, TransferState::Finalized)
        })?;
        Ok(entry.transfer.reported_amount == Some(expected_amount))
    }

    /// Record the amount the payment network reports as settled
    ///
    /// # Returns
    ///
    /// * `Ok(TransferId)` - The transfer the report belongs to
    /// * `Err(PaymentError::UnknownCorrelation)` - No transfer was initiated with this id
    /// * `Err(PaymentError::SettlementTimeout)` - The watchdog already failed the transfer
    /// * `Err(PaymentError::InvalidTransition)` - The transfer is otherwise terminal
    pub fn record_settlement(
        &self,
        correlation_id: &str,
        reported_amount: Cents,
    ) -> Result<TransferId, PaymentError> {
        let transfer_id = self
            .correlations
            .get(correlation_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| PaymentError::UnknownCorrelation {
                correlation_id: correlation_id.to_string(),
            })?;

        let mut entry = self.transfers.get_mut(&transfer_id).ok_or_else(|| {
            PaymentError::invalid_transition(transfer_id, None, TransferState::Finalized)
        })?;

        let timed_out = entry.transfer.failure == Some(FailureReason::SettlementTimeout);
        match entry.transfer.state {
            TransferState::Pending => {
                entry.transfer.reported_amount = Some(reported_amount);
                debug!(transfer_id = %transfer_id, reported = reported_amount, "Settlement reported");
                Ok(transfer_id)
            }
            TransferState::Failed if timed_out => Err(PaymentError::SettlementTimeout {
                transfer: transfer_id,
            }),
            state => Err(PaymentError::invalid_transition(
                transfer_id,
                Some(state),
                TransferState::Finalized,
            )),
        }
    }

    /// Apply a settlement report: record, verify, then finalize or fail
    ///
    /// A report whose amount differs from the transfer amount fails the
    /// transfer with `FailureReason::AmountMismatch`; the returned transfer
    /// tells which way it went.
    pub async fn settle(&self, report: &SettlementReport) -> Result<Transfer, PaymentError> {
        let transfer_id = self.record_settlement(&report.correlation_id, report.amount)?;
        let expected = self
            .transfer(transfer_id)
            .map(|t| t.amount)
            .ok_or_else(|| {
                PaymentError::invalid_transition(transfer_id, None, TransferState::Finalized)
            })?;

        if self.verify(transfer_id, expected)? {
            self.finalize(transfer_id).await
        } else {
            warn!(
                transfer_id = %transfer_id,
                expected = expected,
                reported = report.amount,
                "Settled amount does not match transfer"
            );
            self.fail(
                transfer_id,
                FailureReason::AmountMismatch {
                    reported: report.amount,
                },
            )
            .await
        }
    }

    /// Snapshot of a transfer
    pub fn transfer(&self, transfer_id: TransferId) -> Option<Transfer> {
        self.transfers
            .get(&transfer_id)
            .map(|entry| entry.transfer.clone())
    }

    /// Snapshots of every transfer this manager opened
    pub fn transfers(&self) -> Vec<Transfer> {
        self.transfers
            .iter()
            .map(|entry| entry.value().transfer.clone())
            .collect()
    }

    /// Number of transfers still `Pending`
    pub fn pending_count(&self) -> usize {
        self.transfers
            .iter()
            .filter(|entry| entry.value().transfer.state == TransferState::Pending)
            .count()
    }

    /// Number of armed settlement timers
    pub fn armed_watchdogs(&self) -> usize {
        self.watchdog.armed_count()
    }

    fn state_of(&self, transfer_id: TransferId) -> Option<TransferState> {
        self.transfers
            .get(&transfer_id)
            .map(|entry| entry.transfer.state)
    }

    fn arm_watchdog(&self, transfer_id: TransferId, window: Duration) {
        let manager = self.clone();
        self.watchdog.arm(transfer_id, window, move || async move {
            manager.expire(transfer_id).await;
        });
    }

    /// Put a released transfer back under its settlement window
    ///
    /// The watchdog may have fired while the released transition held the
    /// claim, in which case its expiry lost to the claim and no timer is
    /// left. Expire now if the window closed, re-arm for the rest otherwise.
    async fn resume_window(&self, transfer_id: TransferId) {
        if self.watchdog.is_armed(transfer_id) {
            return;
        }
        let deadline = match self.transfers.get(&transfer_id) {
            Some(entry) if entry.transfer.state == TransferState::Pending => entry.deadline,
            _ => return,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            self.expire(transfer_id).await;
        } else {
            debug!(transfer_id = %transfer_id, remaining_ms = remaining.as_millis() as u64, "Settlement watchdog re-armed");
            self.arm_watchdog(transfer_id, remaining);
        }
    }

    /// Watchdog expiry: one attempt at `Pending → Failed`
    async fn expire(&self, transfer_id: TransferId) {
        match self.fail(transfer_id, FailureReason::SettlementTimeout).await {
            Ok(_) => warn!(transfer_id = %transfer_id, "Settlement window elapsed, transfer failed"),
            Err(e) => debug!(transfer_id = %transfer_id, error = %e, "Settlement window elapsed after resolution"),
        }
    }

    fn claim(&self, transfer_id: TransferId, target: TransferState) -> Result<Claim, PaymentError> {
        let mut entry = self.transfers.get_mut(&transfer_id).ok_or_else(|| {
            PaymentError::invalid_transition(transfer_id, None, target)
        })?;
        let current = entry.transfer.state;

        if entry.in_flight.is_some() {
            return Err(PaymentError::invalid_transition(transfer_id, Some(current), target));
        }

        match current {
            TransferState::Pending => {
                entry.in_flight = Some(target);
                Ok(Claim::Proceed(entry.transfer.clone()))
            }
            state if state == target => Ok(Claim::AlreadyDone(entry.transfer.clone())),
            state => Err(PaymentError::invalid_transition(transfer_id, Some(state), target)),
        }
    }

    fn release(&self, transfer_id: TransferId) {
        if let Some(mut entry) = self.transfers.get_mut(&transfer_id) {
            entry.in_flight = None;
        }
    }

    fn commit(
        &self,
        transfer_id: TransferId,
        state: TransferState,
        failure: Option<FailureReason>,
    ) -> Result<Transfer, PaymentError> {
        let mut entry = self.transfers.get_mut(&transfer_id).ok_or_else(|| {
            PaymentError::invalid_transition(transfer_id, None, state)
        })?;
        entry.in_flight = None;
        entry.transfer.state = state;
        entry.transfer.failure = failure;
        Ok(entry.transfer.clone())
    }

    /// Ledger request that posts or voids `transfer`'s pending transfer
    fn resolution(&self, transfer: &Transfer, kind: TransferKind) -> LedgerTransfer {
        LedgerTransfer {
            id: TransferId::random(),
            debit_account_id: transfer.debit_account,
            credit_account_id: transfer.credit_account,
            amount: transfer.amount,
            ledger: LEDGER_ID,
            code: TRANSFER_CODE,
            timestamp: Utc::now()
                .timestamp_nanos_opt()
                .and_then(|nanos| u64::try_from(nanos).ok())
                .unwrap_or_default(),
            kind,
        }
    }
}
