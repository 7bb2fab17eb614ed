//! Simulated payment network and the settlement report listener
//!
//! `SimulatedNetwork` stands in for the external payment network. It answers
//! each initiation immediately with a correlation id and, depending on its
//! behavior, later emits a `SettlementReport` on an mpsc channel.
//! `run_settlement_listener` drains that channel into the lifecycle manager.
//!
//! ```text
//! initiate() ──ack──► caller
//!     │
//!     └── spawn: sleep(latency) ──report──► mpsc ──► run_settlement_listener ──► settle()
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::lifecycle::TransactionLifecycleManager;
use super::traits::{
    InitiationError, PaymentInitiator, SettlementAck, SettlementReport, SettlementRequest,
};
use crate::types::Cents;

/// Capacity of the settlement report channel
pub const REPORT_CHANNEL_CAPACITY: usize = 1024;

/// Prefix of network correlation ids
pub const CORRELATION_PREFIX: &str = "il-";

const CORRELATION_SUFFIX_LEN: usize = 9;

/// How the simulated network treats accepted payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkBehavior {
    /// Accept and report the full amount
    #[default]
    Settle,
    /// Accept but report `amount - shortfall` (saturating)
    Underpay(Cents),
    /// Decline every initiation
    Decline,
    /// Accept and never report
    Silent,
}

/// In-process payment network
#[derive(Debug)]
pub struct SimulatedNetwork {
    behavior: NetworkBehavior,
    latency: Duration,
    reports: mpsc::Sender<SettlementReport>,
    initiated: AtomicUsize,
}

impl SimulatedNetwork {
    /// Create a network and the receiving end of its report channel
    ///
    /// # Arguments
    ///
    /// * `behavior` - How accepted payments settle
    /// * `latency` - Delay between acknowledging a payment and reporting it
    pub fn new(
        behavior: NetworkBehavior,
        latency: Duration,
    ) -> (Self, mpsc::Receiver<SettlementReport>) {
        let (reports, receiver) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        let network = Self {
            behavior,
            latency,
            reports,
            initiated: AtomicUsize::new(0),
        };
        (network, receiver)
    }

    /// Number of initiations received
    pub fn initiated(&self) -> usize {
        self.initiated.load(Ordering::SeqCst)
    }

    fn schedule_report(&self, correlation_id: String, amount: Cents) {
        let reports = self.reports.clone();
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let report = SettlementReport {
                correlation_id,
                amount,
            };
            if let Err(e) = reports.send(report).await {
                debug!(correlation_id = %e.0.correlation_id, "Settlement listener gone, report dropped");
            }
        });
    }
}

/// Generate a network correlation id: `il-` followed by 9 base36 characters
pub fn correlation_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CORRELATION_SUFFIX_LEN)
        .map(|_| std::char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
        .collect();
    format!("{}{}", CORRELATION_PREFIX, suffix)
}

#[async_trait]
impl PaymentInitiator for SimulatedNetwork {
    async fn initiate(
        &self,
        request: &SettlementRequest,
    ) -> Result<SettlementAck, InitiationError> {
        self.initiated.fetch_add(1, Ordering::SeqCst);
        if request.payer_pointer.trim().is_empty() {
            return Err(InitiationError("missing payer pointer".to_string()));
        }

        let correlation_id = correlation_id();
        debug!(
            transfer_id = %request.transfer_id,
            correlation_id = %correlation_id,
            payer = %request.payer_pointer,
            payee = %request.payee_pointer,
            amount = request.amount,
            "Payment initiated on network"
        );

        let accepted = match self.behavior {
            NetworkBehavior::Settle => {
                self.schedule_report(correlation_id.clone(), request.amount);
                true
            }
            NetworkBehavior::Underpay(shortfall) => {
                self.schedule_report(
                    correlation_id.clone(),
                    request.amount.saturating_sub(shortfall),
                );
                true
            }
            NetworkBehavior::Silent => true,
            NetworkBehavior::Decline => false,
        };

        Ok(SettlementAck {
            correlation_id,
            accepted,
        })
    }
}

/// Feed settlement reports into `manager` until the channel closes
///
/// Each report is settled on its own task so a slow ledger call never
/// holds up later reports.
///
/// # Returns
///
/// The number of reports received.
pub async fn run_settlement_listener(
    manager: TransactionLifecycleManager,
    mut reports: mpsc::Receiver<SettlementReport>,
) -> usize {
    let mut received = 0;

    while let Some(report) = reports.recv().await {
        received += 1;
        let manager = manager.clone();
        tokio::spawn(async move {
            match manager.settle(&report).await {
                Ok(transfer) => info!(
                    transfer_id = %transfer.id,
                    correlation_id = %report.correlation_id,
                    state = %transfer.state,
                    "Settlement report applied"
                ),
                Err(e) => warn!(
                    correlation_id = %report.correlation_id,
                    error = %e,
                    "Settlement report not applied"
                ),
            }
        });
    }

    debug!(received, "Settlement report channel closed");
    received
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::InMemoryLedger;
    use crate::core::lifecycle::LifecycleConfig;
    use crate::core::traits::LedgerClient;
    use crate::types::{Account, AccountId, FailureReason, TransferId, TransferState};
    use std::sync::Arc;

    fn request(amount: Cents) -> SettlementRequest {
        SettlementRequest {
            transfer_id: TransferId::new(7),
            payer_pointer: "$wallet.example/alice".to_string(),
            payee_pointer: "$wallet.example/shop".to_string(),
            amount,
        }
    }

    #[test]
    fn test_correlation_id_shape() {
        let id = correlation_id();

        assert!(id.starts_with(CORRELATION_PREFIX));
        let suffix = &id[CORRELATION_PREFIX.len()..];
        assert_eq!(suffix.len(), 9);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settling_network_reports_full_amount_after_latency() {
        let (network, mut reports) =
            SimulatedNetwork::new(NetworkBehavior::Settle, Duration::from_millis(500));

        let ack = network.initiate(&request(540)).await.unwrap();
        assert!(ack.accepted);
        assert!(reports.try_recv().is_err());

        let report = reports.recv().await.unwrap();
        assert_eq!(report.correlation_id, ack.correlation_id);
        assert_eq!(report.amount, 540);
    }

    #[tokio::test(start_paused = true)]
    async fn test_underpaying_network_reports_less() {
        let (network, mut reports) =
            SimulatedNetwork::new(NetworkBehavior::Underpay(40), Duration::from_millis(10));

        network.initiate(&request(540)).await.unwrap();

        assert_eq!(reports.recv().await.unwrap().amount, 500);
    }

    #[tokio::test]
    async fn test_declining_network_never_reports() {
        let (network, mut reports) =
            SimulatedNetwork::new(NetworkBehavior::Decline, Duration::ZERO);

        let ack = network.initiate(&request(540)).await.unwrap();

        assert!(!ack.accepted);
        drop(network);
        assert!(reports.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_payer_pointer_is_an_initiation_error() {
        let (network, _reports) = SimulatedNetwork::new(NetworkBehavior::Settle, Duration::ZERO);
        let mut bad = request(540);
        bad.payer_pointer = "  ".to_string();

        let result = network.initiate(&bad).await;

        assert!(result.is_err());
        assert_eq!(network.initiated(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_settles_reported_transfers() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.create_account(&Account::merchant()).await.unwrap();
        let payer = Account::new(AccountId::random(), "u1");
        ledger.create_account(&payer).await.unwrap();

        let (network, reports) =
            SimulatedNetwork::new(NetworkBehavior::Underpay(1), Duration::from_secs(1));
        let manager = TransactionLifecycleManager::new(
            ledger.clone(),
            Arc::new(network),
            LifecycleConfig::default(),
        );
        let listener = tokio::spawn(run_settlement_listener(manager.clone(), reports));

        let transfer = manager.open_pending_transfer(&payer, 540).await.unwrap();
        manager
            .initiate_external_settlement(&transfer, "$wallet.example/alice", "$shop")
            .await
            .unwrap();

        while manager.pending_count() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let stored = manager.transfer(transfer.id).unwrap();
        assert_eq!(stored.state, TransferState::Failed);
        assert_eq!(
            stored.failure,
            Some(FailureReason::AmountMismatch { reported: 539 })
        );
        listener.abort();
    }
}
