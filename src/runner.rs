//! Batch driver: payment requests CSV in, results CSV out
//!
//! # Architecture
//!
//! ```text
//! BridgeRunner
//!     ├── AsyncReader (batched CSV reading)
//!     ├── CheckoutService (one task per request, bounded by max_concurrent)
//!     │       ├── WalletRegistry ──► InMemoryLedger
//!     │       └── TransactionLifecycleManager ──► SimulatedNetwork
//!     ├── run_settlement_listener (reports ──► settle)
//!     └── write_results_csv (once no transfer is Pending)
//! ```
//!
//! Requests are processed concurrently with `buffer_unordered`; the output
//! keeps input order. The run completes only after every transfer reached a
//! terminal state, which the settlement watchdog bounds by the settlement
//! window.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::core::{
    bootstrap_merchant_account, run_settlement_listener, CheckoutService, InMemoryLedger,
    InMemoryMappingStore, JsonFileMappingStore, MerchantProfile, PaymentReceipt, RateTable,
    SimulatedNetwork, TransactionLifecycleManager, WalletMappingStore, WalletRegistry,
};
use crate::io::{write_results_csv, AsyncReader, ResultRow};
use crate::types::{PaymentError, PaymentRequest, TransferState};

/// Requests read from the input per batch
const READ_BATCH_SIZE: usize = 1000;

/// How often the runner checks for remaining Pending transfers
const SETTLEMENT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Counts of a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Requests read from the input
    pub requests: usize,
    /// Rows skipped as malformed
    pub skipped: usize,
    /// Transfers finalized
    pub finalized: usize,
    /// Transfers failed after opening
    pub failed: usize,
    /// Requests rejected before a transfer was opened
    pub rejected: usize,
}

type Outcome = (usize, PaymentRequest, Result<PaymentReceipt, PaymentError>);

/// Runs a whole batch of payment requests
#[derive(Debug, Clone)]
pub struct BridgeRunner {
    config: BridgeConfig,
}

impl BridgeRunner {
    /// Create a runner for `config`
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Process `input_path` on a dedicated multi-threaded runtime
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` if processing completed (individual payment failures included)
    /// * `Err(String)` if a fatal error occurred (input, profile or rates unreadable, output error)
    pub fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<RunSummary, String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent)
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(self.run(input_path, output))
    }

    /// Process `input_path` on the current runtime
    pub async fn run(&self, input_path: &Path, output: &mut dyn Write) -> Result<RunSummary, String> {
        let ledger = Arc::new(InMemoryLedger::new());
        bootstrap_merchant_account(ledger.as_ref())
            .await
            .map_err(|e| format!("Failed to create merchant account: {}", e))?;

        let mapping: Arc<dyn WalletMappingStore> = match &self.config.wallets_path {
            Some(path) => Arc::new(
                JsonFileMappingStore::open(path)
                    .await
                    .map_err(|e| format!("Failed to open wallet mapping '{}': {}", path.display(), e))?,
            ),
            None => Arc::new(InMemoryMappingStore::new()),
        };

        let profile = MerchantProfile::load(&self.config.profile_path)
            .map_err(|e| format!("Failed to load merchant profile: {}", e))?;

        let rates = match &self.config.rates_path {
            Some(path) => RateTable::from_csv_path(path).map_err(|e| e.to_string())?,
            None => {
                warn!("No exchange rates configured, only same-currency prices convert");
                RateTable::new()
            }
        };

        let (network, reports) =
            SimulatedNetwork::new(self.config.network_behavior, self.config.network_latency);
        let lifecycle =
            TransactionLifecycleManager::new(ledger.clone(), Arc::new(network), self.config.lifecycle());
        let listener = tokio::spawn(run_settlement_listener(lifecycle.clone(), reports));

        let service = CheckoutService::new(
            Arc::new(profile),
            WalletRegistry::new(ledger, mapping),
            lifecycle.clone(),
            Arc::new(rates),
        );

        let file = tokio::fs::File::open(input_path)
            .await
            .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;
        let mut reader = AsyncReader::new(file.compat());

        let mut outcomes: Vec<Outcome> = Vec::new();
        loop {
            let batch = reader.read_batch(READ_BATCH_SIZE).await;
            if batch.is_empty() {
                break;
            }

            let offset = outcomes.len();
            let processed: Vec<Outcome> = stream::iter(batch.into_iter().enumerate())
                .map(|(i, request)| {
                    let service = service.clone();
                    async move {
                        let result = service.process(&request).await;
                        (offset + i, request, result)
                    }
                })
                .buffer_unordered(self.config.max_concurrent)
                .collect()
                .await;
            outcomes.extend(processed);
        }

        wait_for_settlement(&lifecycle).await;
        listener.abort();

        outcomes.sort_by_key(|(index, _, _)| *index);
        let rows: Vec<ResultRow> = outcomes
            .into_iter()
            .map(|(_, request, result)| result_row(&lifecycle, request, result))
            .collect();

        let summary = summarize(&rows, reader.skipped());
        write_results_csv(&rows, output)?;

        info!(
            requests = summary.requests,
            skipped = summary.skipped,
            finalized = summary.finalized,
            failed = summary.failed,
            rejected = summary.rejected,
            "Run complete"
        );
        Ok(summary)
    }
}

async fn wait_for_settlement(lifecycle: &TransactionLifecycleManager) {
    let pending = lifecycle.pending_count();
    if pending > 0 {
        info!(pending, "Waiting for settlement");
    }
    while lifecycle.pending_count() > 0 {
        tokio::time::sleep(SETTLEMENT_POLL_INTERVAL).await;
    }
}

fn result_row(
    lifecycle: &TransactionLifecycleManager,
    request: PaymentRequest,
    result: Result<PaymentReceipt, PaymentError>,
) -> ResultRow {
    let mut row = ResultRow {
        transaction_id: None,
        user: request.user,
        product: request.product,
        amount_cents: None,
        local_amount: None,
        state: None,
        error: None,
    };

    let transfer_id = match result {
        Ok(receipt) => {
            row.local_amount = Some(receipt.local_amount);
            receipt.transfer.id
        }
        Err(PaymentError::SettlementRejected { transfer, .. }) => transfer,
        Err(e) => {
            row.error = Some(e.code().to_string());
            return row;
        }
    };

    row.transaction_id = Some(transfer_id);
    if let Some(transfer) = lifecycle.transfer(transfer_id) {
        row.amount_cents = Some(transfer.amount);
        row.state = Some(transfer.state);
        row.error = transfer.failure.map(|reason| reason.code().to_string());
    }
    row
}

fn summarize(rows: &[ResultRow], skipped: usize) -> RunSummary {
    let mut summary = RunSummary {
        requests: rows.len(),
        skipped,
        ..RunSummary::default()
    };
    for row in rows {
        match row.state {
            Some(TransferState::Finalized) => summary.finalized += 1,
            Some(_) => summary.failed += 1,
            None => summary.rejected += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NetworkBehavior;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn config(dir: &TempDir, behavior: NetworkBehavior) -> BridgeConfig {
        let mut config = BridgeConfig::new(Duration::from_secs(2), Duration::from_millis(10), 4);
        config.network_behavior = behavior;
        config.profile_path = write(dir, "profile.json", r#"{"paymentPointer":"$shop"}"#);
        config
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        let runner = BridgeRunner::new(config(&dir, NetworkBehavior::Settle));
        let mut output = Vec::new();

        let result = runner.process(Path::new("nonexistent.csv"), &mut output);

        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_rows_keep_input_order() {
        let dir = TempDir::new().unwrap();
        let input = write(
            &dir,
            "input.csv",
            "user,product,price,currency,sender\n\
             u1,a,1.00,ZAR,$w/1\n\
             u2,b,0.00,ZAR,$w/2\n\
             u3,c,3.00,ZAR,$w/3\n",
        );
        let runner = BridgeRunner::new(config(&dir, NetworkBehavior::Settle));
        let mut output = Vec::new();

        let summary = runner.process(&input, &mut output).unwrap();

        assert_eq!(summary.requests, 3);
        assert_eq!(summary.finalized, 2);
        assert_eq!(summary.rejected, 1);
        let text = String::from_utf8(output).unwrap();
        let products: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(2).unwrap())
            .collect();
        assert_eq!(products, vec!["a", "b", "c"]);
    }
}
