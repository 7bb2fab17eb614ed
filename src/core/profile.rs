//! Merchant profile holder
//!
//! The profile is loaded once from its JSON settings file and injected into
//! the checkout flow. Reads are frequent and updates rare, so the current
//! value sits behind a `parking_lot::RwLock` and is handed out as an `Arc`.
//! A missing profile is a valid state: checkout fails fast with
//! `MerchantProfileMissing` until one is provided.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::types::{PaymentError, StoreManagerProfile};

/// Shared, reloadable merchant profile
#[derive(Debug, Default)]
pub struct MerchantProfile {
    source: Option<PathBuf>,
    current: RwLock<Option<Arc<StoreManagerProfile>>>,
}

impl MerchantProfile {
    /// Holder with a fixed profile and no backing file
    pub fn fixed(profile: StoreManagerProfile) -> Self {
        Self {
            source: None,
            current: RwLock::new(Some(Arc::new(profile))),
        }
    }

    /// Holder with no profile
    pub fn absent() -> Self {
        Self::default()
    }

    /// Load the profile from a JSON settings file
    ///
    /// A missing file yields an absent profile (logged), not an error.
    ///
    /// # Errors
    ///
    /// * `PaymentError::InvalidProfile` - If the file exists but cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PaymentError> {
        let path = path.as_ref().to_path_buf();
        let profile = read_profile(&path)?;

        Ok(Self {
            source: Some(path),
            current: RwLock::new(profile.map(Arc::new)),
        })
    }

    /// Re-read the backing file, replacing the current profile
    ///
    /// On error the previous profile stays in effect. Without a backing file
    /// this is a no-op.
    pub fn reload(&self) -> Result<(), PaymentError> {
        let Some(path) = &self.source else {
            return Ok(());
        };
        let profile = read_profile(path)?;
        *self.current.write() = profile.map(Arc::new);
        Ok(())
    }

    /// Replace the profile in memory
    pub fn replace(&self, profile: StoreManagerProfile) {
        info!(payment_pointer = %profile.payment_pointer, "Merchant profile replaced");
        *self.current.write() = Some(Arc::new(profile));
    }

    /// The profile in effect
    ///
    /// # Errors
    ///
    /// * `PaymentError::MerchantProfileMissing` - If no profile is configured
    pub fn current(&self) -> Result<Arc<StoreManagerProfile>, PaymentError> {
        self.current
            .read()
            .clone()
            .ok_or(PaymentError::MerchantProfileMissing)
    }
}

fn read_profile(path: &Path) -> Result<Option<StoreManagerProfile>, PaymentError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Merchant profile not found, payments will be refused");
            return Ok(None);
        }
        Err(e) => {
            return Err(PaymentError::InvalidProfile {
                message: format!("cannot read '{}': {}", path.display(), e),
            })
        }
    };

    let profile: StoreManagerProfile =
        serde_json::from_str(&contents).map_err(|e| PaymentError::InvalidProfile {
            message: format!("malformed '{}': {}", path.display(), e),
        })?;
    if profile.payment_pointer.trim().is_empty() {
        return Err(PaymentError::InvalidProfile {
            message: format!("'{}' has an empty payment pointer", path.display()),
        });
    }

    info!(path = %path.display(), payment_pointer = %profile.payment_pointer, "Merchant profile loaded");
    Ok(Some(profile))
}
