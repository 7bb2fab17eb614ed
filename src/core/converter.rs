//! Currency conversion from a static rate table
//!
//! Rates are loaded from a CSV file with the columns `from,to,rate`, where
//! `rate` is the amount of `to` one unit of `from` buys. Currency codes are
//! case-insensitive. Converted amounts are rounded to two decimal places,
//! midpoint away from zero.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use tracing::{info, warn};

use super::traits::CurrencyConverter;
use crate::types::PaymentError;

/// Currency the merchant prices products in
pub const SOURCE_CURRENCY: &str = "ZAR";

/// Decimal places of converted amounts
const AMOUNT_SCALE: u32 = 2;

#[derive(Debug, Deserialize)]
struct RateRecord {
    from: String,
    to: String,
    rate: String,
}

/// Exchange rates keyed by `(from, to)` currency code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    rates: HashMap<(String, String), Decimal>,
}

impl RateTable {
    /// Create an empty table (only same-currency conversions succeed)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the rate for `from → to`
    pub fn with_rate(mut self, from: &str, to: &str, rate: Decimal) -> Self {
        self.insert(from, to, rate);
        self
    }

    /// Add or replace the rate for `from → to`
    pub fn insert(&mut self, from: &str, to: &str, rate: Decimal) {
        self.rates.insert(key(from, to), rate);
    }

    /// Number of known currency pairs
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// True if no rate is known
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Load a table from a `from,to,rate` CSV file
    ///
    /// # Errors
    ///
    /// * `PaymentError::IoError` - If the file cannot be opened
    /// * `PaymentError::ParseError` - If a row is malformed or a rate is not a positive decimal
    pub fn from_csv_path(path: &Path) -> Result<Self, PaymentError> {
        let file = std::fs::File::open(path).map_err(|e| PaymentError::IoError {
            message: format!("Failed to open rates file '{}': {}", path.display(), e),
        })?;
        let table = Self::from_csv_reader(file)?;

        info!(path = %path.display(), pairs = table.len(), "Exchange rates loaded");
        Ok(table)
    }

    /// Load a table from CSV data
    ///
    /// Unlike payment requests, a bad rate row is fatal: silently dropping a
    /// rate would turn into conversion failures much later.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, PaymentError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut table = Self::new();
        for result in csv_reader.deserialize::<RateRecord>() {
            let record = result?;
            let rate = Decimal::from_str(&record.rate)
                .ok()
                .filter(|rate| *rate > Decimal::ZERO)
                .ok_or_else(|| PaymentError::ParseError {
                    line: None,
                    message: format!(
                        "Invalid rate '{}' for {} → {}",
                        record.rate, record.from, record.to
                    ),
                })?;

            if table.rates.contains_key(&key(&record.from, &record.to)) {
                warn!(from = %record.from, to = %record.to, "Duplicate exchange rate, keeping the last one");
            }
            table.insert(&record.from, &record.to, rate);
        }

        Ok(table)
    }
}

fn key(from: &str, to: &str) -> (String, String) {
    (from.trim().to_uppercase(), to.trim().to_uppercase())
}

impl CurrencyConverter for RateTable {
    fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, PaymentError> {
        let pair = key(from, to);
        if pair.0.is_empty() || pair.1.is_empty() {
            return Err(PaymentError::conversion(from, to, "missing currency code"));
        }

        let rate = if pair.0 == pair.1 {
            Decimal::ONE
        } else {
            *self
                .rates
                .get(&pair)
                .ok_or_else(|| PaymentError::conversion(from, to, "no exchange rate"))?
        };

        let converted = amount
            .checked_mul(rate)
            .ok_or_else(|| PaymentError::conversion(from, to, "amount out of range"))?;

        Ok(converted.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }
}

/// Render an amount with exactly two decimals (`5.4` → `"5.40"`)
pub fn format_amount(amount: Decimal) -> String {
    format!(
        "{:.2}",
        amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn table() -> RateTable {
        RateTable::new()
            .with_rate("ZAR", "USD", dec("0.054"))
            .with_rate("ZAR", "EUR", dec("0.0495"))
    }

    #[test]
    fn test_zar_to_usd_renders_two_decimals() {
        let converted = table().convert(dec("100.00"), "ZAR", "USD").unwrap();

        assert_eq!(format_amount(converted), "5.40");
    }

    #[rstest]
    #[case::rounds_up("10.10", "ZAR", "EUR", "0.50")]
    #[case::rounds_down("12.30", "ZAR", "USD", "0.66")]
    #[case::identity("99.99", "ZAR", "ZAR", "99.99")]
    #[case::case_insensitive("100.00", "zar", "usd", "5.40")]
    fn test_convert(
        #[case] amount: &str,
        #[case] from: &str,
        #[case] to: &str,
        #[case] expected: &str,
    ) {
        let converted = table().convert(dec(amount), from, to).unwrap();

        assert_eq!(format_amount(converted), expected);
    }

    #[rstest]
    #[case::unknown_pair("USD", "ZAR")]
    #[case::missing_code("ZAR", "")]
    fn test_convert_errors(#[case] from: &str, #[case] to: &str) {
        let result = table().convert(dec("1.00"), from, to);

        assert!(matches!(result, Err(PaymentError::CurrencyConversion { .. })));
    }

    #[test]
    fn test_load_rates_from_csv() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "from,to,rate\nZAR,USD,0.054\n zar , gbp , 0.043 \n").unwrap();

        let table = RateTable::from_csv_path(file.path()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.convert(dec("100"), "ZAR", "GBP").unwrap(), dec("4.30"));
    }

    #[rstest]
    #[case::not_a_number("from,to,rate\nZAR,USD,abc\n")]
    #[case::zero_rate("from,to,rate\nZAR,USD,0\n")]
    #[case::missing_column("from,to,rate\nZAR,USD\n")]
    fn test_load_rejects_bad_rows(#[case] csv: &str) {
        let result = RateTable::from_csv_reader(csv.as_bytes());

        assert!(matches!(result, Err(PaymentError::ParseError { .. })));
    }

    #[test]
    fn test_missing_rates_file_is_io_error() {
        let result = RateTable::from_csv_path(Path::new("does-not-exist.csv"));

        assert!(matches!(result, Err(PaymentError::IoError { .. })));
    }
}
