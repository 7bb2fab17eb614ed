//! CSV format handling for payment requests and results
//!
//! This module centralizes all CSV format concerns, providing:
//! - RequestRecord structure for deserialization
//! - Conversion from CSV records to payment requests
//! - Result output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::core::converter::format_amount;
use crate::types::{Cents, PaymentRequest, TransferId, TransferState, ANONYMOUS_USER};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns: user, product, price, currency, sender.
/// The user column is optional; a blank user is the anonymous buyer.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RequestRecord {
    #[serde(default)]
    pub user: Option<String>,
    pub product: String,
    pub price: String,
    pub currency: String,
    pub sender: String,
}

/// Convert a RequestRecord to a PaymentRequest
///
/// This function:
/// - Parses the price string into a Decimal
/// - Normalizes the currency code to upper case
/// - Maps a missing or blank user to the anonymous sentinel
///
/// Amount validation (positive, whole cents) is left to the checkout flow
/// so that it is reported per request rather than dropped here.
///
/// # Returns
///
/// Result containing either:
/// - Ok(PaymentRequest) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_request_record(record: RequestRecord) -> Result<PaymentRequest, String> {
    let price = Decimal::from_str(record.price.trim()).map_err(|_| {
        format!(
            "Invalid price '{}' for product '{}'",
            record.price, record.product
        )
    })?;

    let currency = record.currency.trim().to_uppercase();
    if currency.is_empty() {
        return Err(format!("Missing currency for product '{}'", record.product));
    }

    if record.sender.trim().is_empty() {
        return Err(format!(
            "Missing sender pointer for product '{}'",
            record.product
        ));
    }

    let user = match record.user {
        Some(user) if !user.trim().is_empty() => user.trim().to_string(),
        _ => ANONYMOUS_USER.to_string(),
    };

    Ok(PaymentRequest {
        user,
        product: record.product,
        price,
        target_currency: currency,
        sender_pointer: record.sender,
    })
}

/// One line of the results output
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    /// Transfer id, if a transfer was opened
    pub transaction_id: Option<TransferId>,
    /// Requesting user
    pub user: String,
    /// Product paid for
    pub product: String,
    /// Charged amount in cents, if validated
    pub amount_cents: Option<Cents>,
    /// Price in the buyer's currency, if converted
    pub local_amount: Option<Decimal>,
    /// Final transfer state, if a transfer was opened
    pub state: Option<TransferState>,
    /// Why the payment did not go through
    pub error: Option<String>,
}

impl ResultRow {
    /// True if the payment was finalized
    pub fn success(&self) -> bool {
        self.state == Some(TransferState::Finalized)
    }
}

/// Write payment results to CSV format
///
/// Writes rows in the order given with columns:
/// transaction_id, user, product, amount_cents, local_amount, state, success, error
///
/// # Arguments
///
/// * `rows` - Results to write
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_results_csv(rows: &[ResultRow], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "transaction_id",
            "user",
            "product",
            "amount_cents",
            "local_amount",
            "state",
            "success",
            "error",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    for row in rows {
        writer
            .write_record(&[
                row.transaction_id.map(|id| id.to_string()).unwrap_or_default(),
                row.user.clone(),
                row.product.clone(),
                row.amount_cents.map(|c| c.to_string()).unwrap_or_default(),
                row.local_amount.map(format_amount).unwrap_or_default(),
                row.state.map(|s| s.to_string()).unwrap_or_default(),
                row.success().to_string(),
                row.error.clone().unwrap_or_default(),
            ])
            .map_err(|e| format!("Failed to write result record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(user: Option<&str>, price: &str, currency: &str) -> RequestRecord {
        RequestRecord {
            user: user.map(|s| s.to_string()),
            product: "bike".to_string(),
            price: price.to_string(),
            currency: currency.to_string(),
            sender: "$wallet.example/alice".to_string(),
        }
    }

    #[rstest]
    #[case::named_user(Some("u1"), "u1")]
    #[case::blank_user(Some("  "), ANONYMOUS_USER)]
    #[case::missing_user(None, ANONYMOUS_USER)]
    fn test_convert_request_record_user(#[case] user: Option<&str>, #[case] expected: &str) {
        let request = convert_request_record(record(user, "100.00", "usd")).unwrap();

        assert_eq!(request.user, expected);
        assert_eq!(request.target_currency, "USD");
        assert_eq!(request.price, Decimal::new(10000, 2));
    }

    #[test]
    fn test_convert_keeps_non_positive_price_for_checkout() {
        let request = convert_request_record(record(None, "-1.00", "USD")).unwrap();

        assert_eq!(request.price, Decimal::new(-100, 2));
    }

    #[rstest]
    #[case::invalid_price("abc", "USD", "Invalid price")]
    #[case::missing_currency("1.00", " ", "Missing currency")]
    fn test_convert_request_record_errors(
        #[case] price: &str,
        #[case] currency: &str,
        #[case] expected_error: &str,
    ) {
        let result = convert_request_record(record(None, price, currency));

        assert!(result.unwrap_err().contains(expected_error));
    }

    #[test]
    fn test_convert_rejects_missing_sender() {
        let mut bad = record(None, "1.00", "USD");
        bad.sender = String::new();

        assert!(convert_request_record(bad)
            .unwrap_err()
            .contains("Missing sender pointer"));
    }

    #[rstest]
    #[case::finalized(
        vec![ResultRow {
            transaction_id: Some(TransferId::new(0xab)),
            user: "u1".to_string(),
            product: "bike".to_string(),
            amount_cents: Some(10_000),
            local_amount: Some(Decimal::new(54, 1)),
            state: Some(TransferState::Finalized),
            error: None,
        }],
        "transaction_id,user,product,amount_cents,local_amount,state,success,error\n\
         000000000000000000000000000000ab,u1,bike,10000,5.40,finalized,true,\n"
    )]
    #[case::rejected_before_ledger(
        vec![ResultRow {
            transaction_id: None,
            user: "anonymous".to_string(),
            product: "bell".to_string(),
            amount_cents: None,
            local_amount: None,
            state: None,
            error: Some("invalid_amount".to_string()),
        }],
        "transaction_id,user,product,amount_cents,local_amount,state,success,error\n\
         ,anonymous,bell,,,,false,invalid_amount\n"
    )]
    #[case::empty(
        vec![],
        "transaction_id,user,product,amount_cents,local_amount,state,success,error\n"
    )]
    fn test_write_results_csv(#[case] rows: Vec<ResultRow>, #[case] expected_output: &str) {
        let mut output = Vec::new();
        let result = write_results_csv(&rows, &mut output);
        assert!(result.is_ok());

        let output_str = String::from_utf8(output).unwrap();
        assert_eq!(output_str, expected_output);
    }
}
