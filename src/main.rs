//! Rust Payments Bridge CLI
//!
//! Command-line interface for processing micro-payment requests from CSV files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- requests.csv > results.csv
//! cargo run -- --profile storeManagerDetails.json --rates rates.csv requests.csv > results.csv
//! cargo run -- --wallets wallets.json --settlement-window-secs 10 --network silent requests.csv
//! ```
//!
//! Each request opens a pending transfer against the in-memory ledger and
//! initiates settlement on the simulated payment network. Once every
//! transfer is finalized or failed, one result row per request is written
//! to stdout. Logs go to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (input, profile or rates file unreadable, output error, etc.)

use rust_payments_bridge::cli;
use rust_payments_bridge::logging;
use rust_payments_bridge::runner::BridgeRunner;
use std::process;

fn main() {
    let args = cli::parse_args();

    if let Err(e) = logging::init_logging(&args.to_logging_config()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let runner = BridgeRunner::new(args.to_bridge_config());

    let mut output = std::io::stdout();
    if let Err(e) = runner.process(&args.input_file, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
