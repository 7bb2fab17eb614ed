//! Wallet Registry: user identity → ledger account
//!
//! This module provides the `WalletRegistry` struct, which resolves a user to
//! their wallet account, creating the account on the ledger the first time
//! the user is seen.
//!
//! # Design
//!
//! Two layers keep concurrent first-time lookups for the same user from
//! producing more than one account:
//!
//! - Within the process, each user gets a `tokio::sync::OnceCell` in a
//!   `DashMap`. Concurrent callers await the same initialisation, so only one
//!   of them talks to the ledger. A failed initialisation leaves the cell
//!   empty and the next call tries again.
//! - Between registries sharing a `WalletMappingStore`, the binding is
//!   insert-if-absent. If another registry bound the user first, its account
//!   wins and the account created here is left unused on the ledger
//!   (logged). How far "sharing" reaches depends on the store: the in-memory
//!   store is process-local, the JSON file store merges the file before each
//!   write but does not lock it against concurrent writers.
//!
//! The per-user cells are a cache of the mapping store. They are never
//! evicted on their own; `forget` drops one, and the next lookup reads the
//! store again.
//!
//! The anonymous sentinel is never bound: every anonymous call creates a
//! fresh account, so unrelated anonymous buyers never share a wallet.
//!
//! # Failure
//!
//! Ledger errors surface as `LedgerUnavailable` / `DuplicateAccount`. There
//! is no retry here; the caller owns retry policy.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::traits::{LedgerClient, WalletMappingStore};
use crate::types::{is_anonymous, Account, AccountId, PaymentError, ANONYMOUS_USER};

/// Resolves users to wallet accounts
#[derive(Clone)]
pub struct WalletRegistry {
    ledger: Arc<dyn LedgerClient>,
    mapping: Arc<dyn WalletMappingStore>,
    /// Cache of resolved wallets; grows with the number of distinct users
    resolved: Arc<DashMap<String, Arc<OnceCell<Account>>>>,
}

impl std::fmt::Debug for WalletRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletRegistry")
            .field("mapping", &self.mapping)
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

impl WalletRegistry {
    /// Create a registry over a ledger and a mapping store
    pub fn new(ledger: Arc<dyn LedgerClient>, mapping: Arc<dyn WalletMappingStore>) -> Self {
        Self {
            ledger,
            mapping,
            resolved: Arc::new(DashMap::new()),
        }
    }

    /// Resolve `user_id` to its wallet, creating one if the user has none
    ///
    /// # Arguments
    ///
    /// * `user_id` - Opaque user identifier, or the anonymous sentinel
    ///
    /// # Returns
    ///
    /// * `Ok(Account)` - The user's wallet (bound or freshly created)
    /// * `Err(PaymentError::LedgerUnavailable)` - The ledger could not be reached
    /// * `Err(PaymentError::DuplicateAccount)` - The generated id collided
    /// * `Err(PaymentError::IoError)` - The mapping store failed
    pub async fn resolve_or_create_wallet(&self, user_id: &str) -> Result<Account, PaymentError> {
        if is_anonymous(user_id) {
            return self.create_wallet(ANONYMOUS_USER).await;
        }

        let cell = self
            .resolved
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        let account = cell
            .get_or_try_init(|| self.load_or_create(user_id))
            .await?;
        Ok(account.clone())
    }

    /// Drop the cached wallet of `user_id`
    ///
    /// The binding in the mapping store is untouched, so the next lookup
    /// resolves to the same account.
    pub fn forget(&self, user_id: &str) -> bool {
        self.resolved.remove(user_id).is_some()
    }

    /// Number of users with a cached resolution
    pub fn cached_count(&self) -> usize {
        self.resolved.len()
    }

    async fn load_or_create(&self, user_id: &str) -> Result<Account, PaymentError> {
        if let Some(id) = self.mapping.lookup(user_id).await? {
            debug!(user_id = %user_id, account_id = %id, "Wallet found in mapping");
            return Ok(Account::new(id, user_id));
        }

        let account = self.create_wallet(user_id).await?;
        let winner = self.mapping.bind(user_id, account.id).await?;
        if winner != account.id {
            warn!(
                user_id = %user_id,
                bound = %winner,
                unused = %account.id,
                "Wallet already bound elsewhere, leaving new account unused"
            );
            return Ok(Account::new(winner, user_id));
        }

        Ok(account)
    }

    /// Create a ledger account for `owner` with a fresh random id
    ///
    /// Exactly one `create_account` call is made.
    async fn create_wallet(&self, owner: &str) -> Result<Account, PaymentError> {
        let account = Account::new(AccountId::random(), owner);

        self.ledger
            .create_account(&account)
            .await
            .map_err(|e| PaymentError::from_account_ledger_error(e, account.id))?;

        info!(user_id = %owner, account_id = %account.id, "Wallet account created");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::InMemoryLedger;
    use crate::core::mapping_store::InMemoryMappingStore;
    use std::time::Duration;

    fn registry_over(ledger: &Arc<InMemoryLedger>) -> WalletRegistry {
        WalletRegistry::new(ledger.clone(), Arc::new(InMemoryMappingStore::new()))
    }

    #[tokio::test]
    async fn test_first_lookup_creates_exactly_one_account() {
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = registry_over(&ledger);

        let account = registry.resolve_or_create_wallet("u1").await.unwrap();

        assert_eq!(account.owner, "u1");
        assert_eq!(ledger.account_calls(), 1);
        assert_eq!(ledger.account_owner(account.id).as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_repeat_lookup_reuses_mapped_account() {
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = registry_over(&ledger);

        let first = registry.resolve_or_create_wallet("u1").await.unwrap();
        let second = registry.resolve_or_create_wallet("u1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.account_count(), 1);
    }

    /// Without a shared mapping, independent lookups each create an account.
    #[tokio::test]
    async fn test_unshared_mapping_creates_distinct_accounts() {
        let ledger = Arc::new(InMemoryLedger::new());
        let first_registry = registry_over(&ledger);
        let second_registry = registry_over(&ledger);

        let first = first_registry.resolve_or_create_wallet("u1").await.unwrap();
        let second = second_registry.resolve_or_create_wallet("u1").await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(ledger.account_count(), 2);
    }

    #[tokio::test]
    async fn test_shared_mapping_converges_across_registries() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mapping: Arc<dyn WalletMappingStore> = Arc::new(InMemoryMappingStore::new());
        let first_registry = WalletRegistry::new(ledger.clone(), mapping.clone());
        let second_registry = WalletRegistry::new(ledger.clone(), mapping);

        let first = first_registry.resolve_or_create_wallet("u1").await.unwrap();
        let second = second_registry.resolve_or_create_wallet("u1").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(ledger.account_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_lookups_converge() {
        let ledger = Arc::new(InMemoryLedger::with_latency(Duration::from_millis(20)));
        let registry = registry_over(&ledger);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.resolve_or_create_wallet("u1").await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }

        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(ledger.account_calls(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_users_never_share_a_wallet() {
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = registry_over(&ledger);

        let first = registry.resolve_or_create_wallet("anonymous").await.unwrap();
        let second = registry.resolve_or_create_wallet("").await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.owner, ANONYMOUS_USER);
        assert_eq!(second.owner, ANONYMOUS_USER);
    }

    #[tokio::test]
    async fn test_unavailable_ledger_is_not_cached() {
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = registry_over(&ledger);

        ledger.set_unavailable(true);
        let failed = registry.resolve_or_create_wallet("u1").await;
        assert!(matches!(failed, Err(PaymentError::LedgerUnavailable { .. })));
        assert_eq!(ledger.account_calls(), 1);

        ledger.set_unavailable(false);
        let account = registry.resolve_or_create_wallet("u1").await.unwrap();
        assert_eq!(ledger.account_owner(account.id).as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_forget_drops_cache_but_keeps_binding() {
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = registry_over(&ledger);

        let first = registry.resolve_or_create_wallet("u1").await.unwrap();
        registry.resolve_or_create_wallet("anonymous").await.unwrap();
        assert_eq!(registry.cached_count(), 1);

        assert!(registry.forget("u1"));
        assert!(!registry.forget("u1"));
        assert_eq!(registry.cached_count(), 0);

        let again = registry.resolve_or_create_wallet("u1").await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(ledger.account_count(), 2);
    }
}
