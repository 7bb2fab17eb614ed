//! Account-related types for the payments bridge
//!
//! This module defines the Account descriptor handed out by the wallet
//! registry and the classification constants fixed by policy.

use super::ids::AccountId;

/// The single ledger every account and transfer lives on
pub const LEDGER_ID: u32 = 1;

/// Account class for both wallets and the merchant account
pub const ACCOUNT_CODE: u16 = 1;

/// Transfer class for merchant-bound payments
pub const TRANSFER_CODE: u16 = 1;

/// Well-known id of the merchant account credited by every payment
pub const MERCHANT_ACCOUNT_ID: AccountId = AccountId::new(1);

/// Owner tag of the merchant account
pub const MERCHANT_OWNER: &str = "merchant";

/// Sentinel identity for requests without an authenticated user
pub const ANONYMOUS_USER: &str = "anonymous";

/// Ledger-held balance descriptor
///
/// An Account is created once and never changes afterwards. Balances are
/// owned by the ledger; this struct only identifies the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Random 128-bit id, never reused
    pub id: AccountId,

    /// Opaque external user identifier
    pub owner: String,

    /// Ledger the account belongs to (always [`LEDGER_ID`])
    pub ledger: u32,

    /// Account class (always [`ACCOUNT_CODE`])
    pub code: u16,
}

impl Account {
    /// Create a wallet account descriptor for `owner` with the fixed ledger and code
    ///
    /// # Arguments
    ///
    /// * `id` - The ledger id for this account
    /// * `owner` - The external user identifier
    pub fn new(id: AccountId, owner: impl Into<String>) -> Self {
        Account {
            id,
            owner: owner.into(),
            ledger: LEDGER_ID,
            code: ACCOUNT_CODE,
        }
    }

    /// Descriptor of the well-known merchant account
    pub fn merchant() -> Self {
        Account::new(MERCHANT_ACCOUNT_ID, MERCHANT_OWNER)
    }
}

/// Returns true if `user_id` is the anonymous sentinel (or blank)
pub fn is_anonymous(user_id: &str) -> bool {
    let trimmed = user_id.trim();
    trimmed.is_empty() || trimmed == ANONYMOUS_USER
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_uses_fixed_classification() {
        let account = Account::new(AccountId::new(7), "u1");

        assert_eq!(account.owner, "u1");
        assert_eq!(account.ledger, LEDGER_ID);
        assert_eq!(account.code, ACCOUNT_CODE);
    }

    #[rstest]
    #[case::sentinel("anonymous", true)]
    #[case::blank("  ", true)]
    #[case::user("auth0|123", false)]
    fn test_is_anonymous(#[case] user: &str, #[case] expected: bool) {
        assert_eq!(is_anonymous(user), expected);
    }
}
