use crate::config::{BridgeConfig, LoggingConfig, DEFAULT_PROFILE_PATH};
use crate::core::settlement::NetworkBehavior;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Process micro-payment requests against a two-phase ledger
#[derive(Parser, Debug)]
#[command(name = "payments-bridge")]
#[command(about = "Process micro-payment requests against a two-phase ledger", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing payment requests
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Merchant settings file
    #[arg(
        long = "profile",
        value_name = "FILE",
        default_value = DEFAULT_PROFILE_PATH,
        help = "Merchant profile JSON (paymentPointer, interledgerSecret)"
    )]
    pub profile: PathBuf,

    /// Exchange rates CSV
    #[arg(
        long = "rates",
        value_name = "FILE",
        help = "Exchange rates CSV with columns from,to,rate"
    )]
    pub rates: Option<PathBuf>,

    /// Wallet mapping file
    #[arg(
        long = "wallets",
        value_name = "FILE",
        help = "JSON file persisting user to wallet account bindings (default: in memory)"
    )]
    pub wallets: Option<PathBuf>,

    /// Settlement window in seconds
    #[arg(
        long = "settlement-window-secs",
        value_name = "SECS",
        default_value_t = 30,
        help = "Seconds a transfer may stay pending before it is failed"
    )]
    pub settlement_window_secs: u64,

    /// Simulated network latency in milliseconds
    #[arg(
        long = "network-latency-ms",
        value_name = "MS",
        default_value_t = 200,
        help = "Delay before the simulated network reports a settlement"
    )]
    pub network_latency_ms: u64,

    /// Simulated network behavior
    #[arg(
        long = "network",
        value_name = "MODE",
        default_value = "settle",
        help = "Simulated network: 'settle', 'decline' or 'silent'"
    )]
    pub network: NetworkMode,

    /// Maximum number of concurrent requests
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum number of requests processing concurrently (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,

    /// Log filter
    #[arg(
        long = "log-level",
        value_name = "FILTER",
        default_value = "info",
        help = "Log filter when RUST_LOG is unset (e.g. 'debug')"
    )]
    pub log_level: String,

    /// JSON log output
    #[arg(long = "log-json", help = "Emit logs as JSON lines on stderr")]
    pub log_json: bool,
}

/// Simulated payment network modes selectable from the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum NetworkMode {
    Settle,
    Decline,
    Silent,
}

impl From<NetworkMode> for NetworkBehavior {
    fn from(mode: NetworkMode) -> Self {
        match mode {
            NetworkMode::Settle => NetworkBehavior::Settle,
            NetworkMode::Decline => NetworkBehavior::Decline,
            NetworkMode::Silent => NetworkBehavior::Silent,
        }
    }
}

impl CliArgs {
    /// Create a BridgeConfig from CLI arguments
    ///
    /// Zero values fall back to defaults with a warning.
    pub fn to_bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::new(
            Duration::from_secs(self.settlement_window_secs),
            Duration::from_millis(self.network_latency_ms),
            self.max_concurrent.unwrap_or_else(num_cpus::get),
        );
        config.network_behavior = self.network.into();
        config.profile_path = self.profile.clone();
        config.rates_path = self.rates.clone();
        config.wallets_path = self.wallets.clone();
        config
    }

    /// Logging settings from CLI arguments
    pub fn to_logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            log_level: self.log_level.clone(),
            use_json: self.log_json,
        }
    }
}
