//! Secure Storage Abstraction
//!
//! The core never decides where credentials live. Hosts hand it a
//! [`SecureStore`] and the credential cache persists its serialized blob there.

use async_trait::async_trait;

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts platform-specific secure storage:
/// - macOS/iOS: Keychain
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service
/// - Android: Keystore-backed encrypted preferences
///
/// Implementations should:
/// - Encrypt data at rest
/// - Use platform-provided secure storage when available
/// - Never log or expose sensitive data
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_blob(store: &dyn SecureStore, blob: &[u8]) -> Result<()> {
///     store.set_secret("credential_cache", blob).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, overwriting any previous value for `key`.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key succeeds.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}
