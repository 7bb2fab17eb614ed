//! Inbound payment request and response types
//!
//! These mirror the inbound request surface: a request carries the product,
//! its price in the source currency, the buyer's target currency and the
//! sender's payment pointer, together with the (possibly anonymous) user.

use super::account::ANONYMOUS_USER;
use super::error::{PaymentError, GENERIC_FAILURE_MESSAGE};
use super::ids::TransferId;
use super::transfer::Cents;
use rust_decimal::Decimal;
use serde::Serialize;

/// A single payment request
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    /// Authenticated user id, or [`ANONYMOUS_USER`]
    pub user: String,

    /// Product being paid for
    pub product: String,

    /// Price in the source currency (two decimal places)
    pub price: Decimal,

    /// Currency the buyer sees the price in
    pub target_currency: String,

    /// Payment pointer of the paying wallet
    pub sender_pointer: String,
}

impl PaymentRequest {
    /// Create a request for an anonymous user
    pub fn anonymous(
        product: impl Into<String>,
        price: Decimal,
        target_currency: impl Into<String>,
        sender_pointer: impl Into<String>,
    ) -> Self {
        PaymentRequest {
            user: ANONYMOUS_USER.to_string(),
            product: product.into(),
            price,
            target_currency: target_currency.into(),
            sender_pointer: sender_pointer.into(),
        }
    }

    /// Same request on behalf of `user`
    pub fn for_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }
}

/// Response returned to the end user
///
/// Exactly one of `transaction_id` and `error` is set. Errors are always the
/// generic message; the cause is only logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    /// Whether the payment was initiated
    pub success: bool,

    /// Ledger transfer id (hex), on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    /// Generic failure message, on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentResponse {
    /// Successful initiation of `transfer`
    pub fn initiated(transfer: TransferId) -> Self {
        PaymentResponse {
            success: true,
            transaction_id: Some(transfer.to_string()),
            error: None,
        }
    }

    /// Failure without internal detail
    pub fn failure() -> Self {
        PaymentResponse {
            success: false,
            transaction_id: None,
            error: Some(GENERIC_FAILURE_MESSAGE.to_string()),
        }
    }
}

/// Convert a price into whole cents
///
/// # Returns
///
/// * `Ok(cents)` - For strictly positive prices with at most two significant decimals
/// * `Err(PaymentError::InvalidAmount)` - For zero, negative, sub-cent or overflowing prices
pub fn cents_from_price(price: Decimal) -> Result<Cents, PaymentError> {
    if price <= Decimal::ZERO {
        return Err(PaymentError::invalid_amount(price));
    }

    let cents = price
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| PaymentError::invalid_amount(price))?;

    if cents.fract() != Decimal::ZERO {
        return Err(PaymentError::invalid_amount(price));
    }

    u64::try_from(cents.trunc()).map_err(|_| PaymentError::invalid_amount(price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case::whole("100", 10_000)]
    #[case::two_decimals("100.00", 10_000)]
    #[case::cents("0.01", 1)]
    #[case::trailing_zeros("12.3400", 1_234)]
    fn test_cents_from_price(#[case] price: &str, #[case] expected: Cents) {
        let price = Decimal::from_str(price).unwrap();
        assert_eq!(cents_from_price(price).unwrap(), expected);
    }

    #[rstest]
    #[case::zero("0")]
    #[case::negative("-1.00")]
    #[case::sub_cent("1.005")]
    fn test_cents_from_price_rejects(#[case] price: &str) {
        let price = Decimal::from_str(price).unwrap();
        assert!(matches!(
            cents_from_price(price),
            Err(PaymentError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_failure_response_is_generic() {
        let response = PaymentResponse::failure();

        assert!(!response.success);
        assert!(response.transaction_id.is_none());
        assert_eq!(response.error.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let response = PaymentResponse::initiated(TransferId::new(1));
        let json = serde_json::to_string(&response).unwrap();

        assert_eq!(
            json,
            r#"{"success":true,"transactionId":"00000000000000000000000000000001"}"#
        );
    }
}
