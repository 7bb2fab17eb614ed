//! 128-bit ledger identifiers
//!
//! Accounts and transfers are both keyed by random 128-bit ids. The ledger
//! reserves `0` and `u128::MAX`, so generation skips both values.
//!
//! Ids render as 32-character lowercase hex and serialize as hex strings, so
//! they survive JSON round-trips without relying on 128-bit number support.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Draw a random id the ledger will accept
fn random_ledger_id() -> u128 {
    loop {
        let candidate: u128 = rand::random();
        if candidate != 0 && candidate != u128::MAX {
            return candidate;
        }
    }
}

/// Error returned when an id string is not valid hex
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ledger id '{0}'")]
pub struct ParseIdError(String);

macro_rules! define_ledger_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(u128);

        impl $name {
            /// Wrap a raw 128-bit value
            pub const fn new(value: u128) -> Self {
                Self(value)
            }

            /// Generate a fresh random id (never 0, never `u128::MAX`)
            pub fn random() -> Self {
                Self(random_ledger_id())
            }

            /// The raw 128-bit value
            pub const fn as_u128(&self) -> u128 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
                if digits.is_empty() || digits.len() > 32 {
                    return Err(ParseIdError(s.to_string()));
                }
                u128::from_str_radix(digits, 16)
                    .map(Self)
                    .map_err(|_| ParseIdError(s.to_string()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }
    };
}

define_ledger_id!(
    /// Identifier of a ledger account
    AccountId
);

define_ledger_id!(
    /// Identifier of a ledger transfer
    TransferId
);
