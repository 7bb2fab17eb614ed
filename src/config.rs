//! Runtime configuration of the payments bridge
//!
//! Built from the command line. Invalid tunables fall back to their
//! defaults with a warning instead of aborting the run.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::core::lifecycle::{LifecycleConfig, DEFAULT_LEDGER_HOLD_GRACE, DEFAULT_SETTLEMENT_WINDOW};
use crate::core::settlement::NetworkBehavior;
use crate::types::MERCHANT_ACCOUNT_ID;

/// Default merchant settings file
pub const DEFAULT_PROFILE_PATH: &str = "storeManagerDetails.json";

/// Default delay before the simulated network reports a settlement
pub const DEFAULT_NETWORK_LATENCY: Duration = Duration::from_millis(200);

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable text
    pub use_json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            use_json: false,
        }
    }
}

/// Configuration of a bridge run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Time a transfer may stay Pending before it is failed
    pub settlement_window: Duration,
    /// Extra time the ledger holds a pending transfer
    pub ledger_hold_grace: Duration,
    /// Delay of simulated settlement reports
    pub network_latency: Duration,
    /// How the simulated network treats payments
    pub network_behavior: NetworkBehavior,
    /// Maximum number of requests in flight
    pub max_concurrent: usize,
    /// Merchant settings file
    pub profile_path: PathBuf,
    /// Exchange rates CSV; without it only same-currency prices convert
    pub rates_path: Option<PathBuf>,
    /// Wallet mapping JSON file; without it the mapping lives in memory
    pub wallets_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            settlement_window: DEFAULT_SETTLEMENT_WINDOW,
            ledger_hold_grace: DEFAULT_LEDGER_HOLD_GRACE,
            network_latency: DEFAULT_NETWORK_LATENCY,
            network_behavior: NetworkBehavior::default(),
            max_concurrent: num_cpus::get(),
            profile_path: PathBuf::from(DEFAULT_PROFILE_PATH),
            rates_path: None,
            wallets_path: None,
        }
    }
}

impl BridgeConfig {
    /// Create a config with validated tunables
    ///
    /// A zero settlement window or zero concurrency falls back to the default.
    pub fn new(settlement_window: Duration, network_latency: Duration, max_concurrent: usize) -> Self {
        let default = Self::default();

        let settlement_window = if settlement_window.is_zero() {
            warn!(
                default_secs = default.settlement_window.as_secs(),
                "Invalid settlement window (0), using default"
            );
            default.settlement_window
        } else {
            settlement_window
        };

        let max_concurrent = if max_concurrent == 0 {
            warn!(
                default = default.max_concurrent,
                "Invalid max_concurrent (0), using default"
            );
            default.max_concurrent
        } else {
            max_concurrent
        };

        if network_latency >= settlement_window {
            warn!(
                latency_ms = network_latency.as_millis() as u64,
                window_secs = settlement_window.as_secs(),
                "Network latency exceeds the settlement window, payments will time out"
            );
        }

        Self {
            settlement_window,
            network_latency,
            max_concurrent,
            ..default
        }
    }

    /// Lifecycle manager settings derived from this config
    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            settlement_window: self.settlement_window,
            ledger_hold_grace: self.ledger_hold_grace,
            merchant_account: MERCHANT_ACCOUNT_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();

        assert_eq!(config.settlement_window, Duration::from_secs(30));
        assert_eq!(config.max_concurrent, num_cpus::get());
        assert_eq!(config.profile_path, PathBuf::from(DEFAULT_PROFILE_PATH));
        assert_eq!(config.network_behavior, NetworkBehavior::Settle);
    }

    #[rstest]
    #[case::zero_window(0, 4, 30, 4)]
    #[case::zero_concurrency(10, 0, 10, num_cpus::get())]
    #[case::valid(10, 4, 10, 4)]
    fn test_new_falls_back_on_zero(
        #[case] window_secs: u64,
        #[case] max_concurrent: usize,
        #[case] expected_window_secs: u64,
        #[case] expected_concurrent: usize,
    ) {
        let config = BridgeConfig::new(
            Duration::from_secs(window_secs),
            Duration::from_millis(5),
            max_concurrent,
        );

        assert_eq!(config.settlement_window, Duration::from_secs(expected_window_secs));
        assert_eq!(config.max_concurrent, expected_concurrent);
    }
}
