//! Merchant-side configuration read by the checkout flow

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store manager profile
///
/// Written by the settings collaborator, read here as an input. The secret
/// reference (path to the merchant's network credential) is never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManagerProfile {
    /// Payment pointer receiving merchant payments
    #[serde(rename = "paymentPointer")]
    pub payment_pointer: String,

    /// Location of the merchant's payment network secret
    #[serde(
        rename = "interledgerSecret",
        alias = "secretReference",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub secret_reference: Option<String>,
}

impl StoreManagerProfile {
    /// Profile with a payee pointer and no secret
    pub fn new(payment_pointer: impl Into<String>) -> Self {
        StoreManagerProfile {
            payment_pointer: payment_pointer.into(),
            secret_reference: None,
        }
    }
}

impl fmt::Debug for StoreManagerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreManagerProfile")
            .field("payment_pointer", &self.payment_pointer)
            .field(
                "secret_reference",
                &self.secret_reference.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
