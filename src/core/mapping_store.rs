//! Wallet mapping stores
//!
//! This module provides the two `WalletMappingStore` backends:
//!
//! - `InMemoryMappingStore`: a `DashMap` whose entry API gives the
//!   insert-if-absent guarantee per user
//! - `JsonFileMappingStore`: the same mapping persisted as a JSON object
//!   (`{"user": "<account hex>"}`), rewritten through a temporary file and a
//!   rename on every new binding so a crash never leaves a torn file
//!
//! # File layout
//!
//! ```text
//! wallets.json       (current mapping)
//! wallets.json.tmp   (transient, only during a write)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::traits::WalletMappingStore;
use crate::types::{AccountId, PaymentError};

/// Process-local mapping store
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    bindings: DashMap<String, AccountId>,
}

impl InMemoryMappingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound users
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True if no user is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[async_trait]
impl WalletMappingStore for InMemoryMappingStore {
    async fn lookup(&self, user_id: &str) -> Result<Option<AccountId>, PaymentError> {
        Ok(self.bindings.get(user_id).map(|entry| *entry.value()))
    }

    async fn bind(&self, user_id: &str, account: AccountId) -> Result<AccountId, PaymentError> {
        let winner = *self
            .bindings
            .entry(user_id.to_string())
            .or_insert(account)
            .value();
        Ok(winner)
    }
}

/// JSON-file-backed mapping store
///
/// The whole mapping is kept in memory and written out on each new binding.
/// The async mutex serializes binders within the process; a bind holds it
/// across the file write so the file never lags behind an acknowledged
/// binding. Before writing, a bind re-reads the file and merges bindings
/// made by other stores on the same path, so a run never overwrites users
/// bound by another one. Writers in separate processes are not locked
/// against each other: two binds racing on the file can still both land.
#[derive(Debug)]
pub struct JsonFileMappingStore {
    path: PathBuf,
    bindings: Mutex<HashMap<String, AccountId>>,
}

impl JsonFileMappingStore {
    /// Open the store at `path`, loading existing bindings
    ///
    /// A missing file is an empty mapping; it is created on the first bind.
    ///
    /// # Errors
    ///
    /// * `PaymentError::IoError` - If the file exists but cannot be read
    /// * `PaymentError::ParseError` - If the file is not a valid mapping
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PaymentError> {
        let path = path.as_ref().to_path_buf();
        let bindings = read_bindings(&path).await?;

        info!(
            path = %path.display(),
            wallets = bindings.len(),
            "Wallet mapping loaded"
        );

        Ok(Self {
            path,
            bindings: Mutex::new(bindings),
        })
    }

    /// Location of the mapping file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge bindings another writer put in the file since it was read
    ///
    /// Bindings already held here win; the file only adds users.
    async fn refresh(&self, bindings: &mut HashMap<String, AccountId>) -> Result<(), PaymentError> {
        for (user_id, account) in read_bindings(&self.path).await? {
            bindings.entry(user_id).or_insert(account);
        }
        Ok(())
    }

    async fn persist(&self, bindings: &HashMap<String, AccountId>) -> Result<(), PaymentError> {
        let json = serde_json::to_vec_pretty(bindings)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

async fn read_bindings(path: &Path) -> Result<HashMap<String, AccountId>, PaymentError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl WalletMappingStore for JsonFileMappingStore {
    async fn lookup(&self, user_id: &str) -> Result<Option<AccountId>, PaymentError> {
        Ok(self.bindings.lock().await.get(user_id).copied())
    }

    async fn bind(&self, user_id: &str, account: AccountId) -> Result<AccountId, PaymentError> {
        let mut bindings = self.bindings.lock().await;
        if let Some(existing) = bindings.get(user_id) {
            return Ok(*existing);
        }

        self.refresh(&mut bindings).await?;
        if let Some(existing) = bindings.get(user_id) {
            debug!(user_id = %user_id, account_id = %existing, "Wallet bound by another writer");
            return Ok(*existing);
        }

        bindings.insert(user_id.to_string(), account);
        if let Err(e) = self.persist(&bindings).await {
            bindings.remove(user_id);
            return Err(e);
        }

        debug!(user_id = %user_id, account_id = %account, "Wallet binding persisted");
        Ok(account)
    }
}
