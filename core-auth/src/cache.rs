//! # Credential Cache
//!
//! Keyed store of [`AccountSession`]s with pluggable persistence.
//!
//! ## Overview
//!
//! Every operation runs under one lock and fires the registered
//! [`CacheNotification`] hooks in a fixed order:
//!
//! | Operation | Hooks |
//! |-----------|-------|
//! | reads (`get`, `blob`, `len`) | before-access, after-access |
//! | writes (`add`, `delete`, `clear`, `initialize_from_blob`) | before-access, before-write, after-access |
//!
//! Hooks fire even when the key is absent. A hook receives the live
//! [`CacheContents`], so a persistence layer loads the backing store in
//! `before_access` and saves in `after_access` when
//! [`has_state_changed`](CacheContents::has_state_changed) is set.
//!
//! ## Blob format
//!
//! ```text
//! i32 LE  version (1)
//! i32 LE  entry count
//! repeat: string key, string value
//! string := 7-bit varint byte length + UTF-8 (JSON of key / session)
//! ```
//!
//! An unknown version or an undecodable blob leaves the cache empty.

use crate::session::{AccountSession, CredentialCacheKey};
use crate::types::AccountType;
use async_trait::async_trait;
use bridge_traits::SecureStore;
use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Current blob layout version.
pub const CACHE_BLOB_VERSION: i32 = 1;

/// Cache state handed to notification hooks.
#[derive(Default)]
pub struct CacheContents {
    sessions: HashMap<CredentialCacheKey, AccountSession>,
    has_state_changed: bool,
}

impl CacheContents {
    /// Set by every write; persistence hooks reset it after saving.
    pub fn has_state_changed(&self) -> bool {
        self.has_state_changed
    }

    pub fn set_has_state_changed(&mut self, changed: bool) {
        self.has_state_changed = changed;
    }

    pub fn get(&self, key: &CredentialCacheKey) -> Option<&AccountSession> {
        self.sessions.get(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Serializes every entry.
    pub fn blob(&self) -> Vec<u8> {
        encode_blob(&self.sessions)
    }

    /// Replaces the contents with the entries in `blob`.
    ///
    /// An empty blob, an unknown version or a corrupt payload all yield an
    /// empty cache; the latter two log a warning.
    pub fn initialize_from_blob(&mut self, blob: &[u8]) {
        self.sessions = if blob.is_empty() {
            HashMap::new()
        } else {
            match decode_blob(blob) {
                Ok(sessions) => sessions,
                Err(reason) => {
                    warn!(reason = %reason, bytes = blob.len(), "Ignoring unreadable credential cache blob");
                    HashMap::new()
                }
            }
        };
    }
}

impl fmt::Debug for CacheContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheContents")
            .field("entries", &self.sessions.len())
            .field("has_state_changed", &self.has_state_changed)
            .finish()
    }
}

/// Observer hooks around every cache operation.
///
/// All hooks default to no-ops. Hooks run while the cache lock is held and
/// must not call back into the same [`CredentialCache`].
#[async_trait]
pub trait CacheNotification: Send + Sync {
    async fn before_access(&self, _cache: &mut CacheContents) {}

    async fn before_write(&self, _cache: &mut CacheContents) {}

    async fn after_access(&self, _cache: &mut CacheContents) {}
}

/// Thread-safe credential cache shared by every client of one application.
pub struct CredentialCache {
    contents: Mutex<CacheContents>,
    notifications: Vec<Arc<dyn CacheNotification>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self {
            contents: Mutex::new(CacheContents::default()),
            notifications: Vec::new(),
        }
    }

    /// Registers a hook. Hooks fire in registration order.
    pub fn with_notification(mut self, notification: Arc<dyn CacheNotification>) -> Self {
        self.notifications.push(notification);
        self
    }

    /// Inserts or overwrites the entry for the session's identity.
    pub async fn add(&self, session: AccountSession) {
        let key = session.cache_key();
        self.write(move |contents| {
            contents.sessions.insert(key, session);
        })
        .await;
    }

    pub async fn get(
        &self,
        account_type: AccountType,
        client_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Option<AccountSession> {
        let key = CredentialCacheKey::new(account_type, client_id, user_id);
        self.read(|contents| contents.sessions.get(&key).cloned())
            .await
    }

    pub async fn delete(&self, session: &AccountSession) {
        let key = session.cache_key();
        self.write(move |contents| {
            contents.sessions.remove(&key);
        })
        .await;
    }

    pub async fn clear(&self) {
        self.write(|contents| contents.sessions.clear()).await;
    }

    /// Full snapshot of the cache in blob form.
    pub async fn blob(&self) -> Vec<u8> {
        self.read(|contents| contents.blob()).await
    }

    /// Replaces (never merges) the cache with the blob's entries.
    pub async fn initialize_from_blob(&self, blob: &[u8]) {
        self.write(|contents| contents.initialize_from_blob(blob))
            .await;
    }

    pub async fn len(&self) -> usize {
        self.read(|contents| contents.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.read(|contents| contents.is_empty()).await
    }

    async fn read<R>(&self, op: impl FnOnce(&CacheContents) -> R) -> R {
        let mut contents = self.contents.lock().await;
        for hook in &self.notifications {
            hook.before_access(&mut *contents).await;
        }
        let result = op(&*contents);
        for hook in &self.notifications {
            hook.after_access(&mut *contents).await;
        }
        result
    }

    async fn write<R>(&self, op: impl FnOnce(&mut CacheContents) -> R) -> R {
        let mut contents = self.contents.lock().await;
        for hook in &self.notifications {
            hook.before_access(&mut *contents).await;
        }
        for hook in &self.notifications {
            hook.before_write(&mut *contents).await;
        }
        let result = op(&mut *contents);
        contents.has_state_changed = true;
        for hook in &self.notifications {
            hook.after_access(&mut *contents).await;
        }
        result
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("notifications", &self.notifications.len())
            .finish()
    }
}

/// Persists the cache blob in a host [`SecureStore`].
///
/// Loads the stored blob before every access, unless an earlier write is
/// still waiting to be persisted, and writes it back after any access that
/// changed state. Storage failures are logged and swallowed so
/// the in-memory cache keeps working.
pub struct SecureStoreCacheNotification {
    store: Arc<dyn SecureStore>,
    key: String,
}

impl SecureStoreCacheNotification {
    pub fn new(store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl CacheNotification for SecureStoreCacheNotification {
    async fn before_access(&self, cache: &mut CacheContents) {
        // Unpersisted writes win over the stored blob
        if cache.has_state_changed() {
            return;
        }
        match self.store.get_secret(&self.key).await {
            Ok(Some(blob)) => {
                cache.initialize_from_blob(&blob);
                cache.set_has_state_changed(false);
            }
            Ok(None) => {}
            Err(e) => warn!(key = %self.key, error = %e, "Failed to load credential cache"),
        }
    }

    async fn after_access(&self, cache: &mut CacheContents) {
        if !cache.has_state_changed() {
            return;
        }

        let result = if cache.is_empty() {
            self.store.delete_secret(&self.key).await
        } else {
            self.store.set_secret(&self.key, &cache.blob()).await
        };

        match result {
            Ok(()) => {
                debug!(key = %self.key, entries = cache.len(), "Persisted credential cache");
                cache.set_has_state_changed(false);
            }
            Err(e) => warn!(key = %self.key, error = %e, "Failed to persist credential cache"),
        }
    }
}

fn encode_blob(sessions: &HashMap<CredentialCacheKey, AccountSession>) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_i32_le(CACHE_BLOB_VERSION);

    // Entries that fail to serialize are dropped, so count what gets written
    let entries: Vec<(String, String)> = sessions
        .iter()
        .filter_map(|(key, session)| {
            let key = serde_json::to_string(key).ok()?;
            let value = serde_json::to_string(session).ok()?;
            Some((key, value))
        })
        .collect();

    buf.put_i32_le(entries.len() as i32);
    for (key, value) in &entries {
        put_string(&mut buf, key);
        put_string(&mut buf, value);
    }
    buf.to_vec()
}

fn decode_blob(blob: &[u8]) -> Result<HashMap<CredentialCacheKey, AccountSession>, String> {
    let mut buf = blob;

    if buf.remaining() < 8 {
        return Err("blob shorter than its header".to_string());
    }

    let version = buf.get_i32_le();
    if version != CACHE_BLOB_VERSION {
        return Err(format!("unsupported version {}", version));
    }

    let count = buf.get_i32_le();
    if count < 0 {
        return Err(format!("negative entry count {}", count));
    }

    let mut sessions = HashMap::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        let key = get_string(&mut buf)?;
        let value = get_string(&mut buf)?;

        let key: CredentialCacheKey =
            serde_json::from_str(&key).map_err(|e| format!("bad key: {}", e))?;
        let session: AccountSession =
            serde_json::from_str(&value).map_err(|e| format!("bad session: {}", e))?;
        sessions.insert(key, session);
    }

    Ok(sessions)
}

fn put_string(buf: &mut BytesMut, value: &str) {
    let mut len = value.len();
    while len >= 0x80 {
        buf.put_u8((len as u8 & 0x7f) | 0x80);
        len >>= 7;
    }
    buf.put_u8(len as u8);
    buf.put_slice(value.as_bytes());
}

fn get_string(buf: &mut &[u8]) -> Result<String, String> {
    let mut len: usize = 0;
    let mut shift = 0;
    loop {
        if !buf.has_remaining() {
            return Err("truncated string length".to_string());
        }
        if shift > 28 {
            return Err("string length prefix too long".to_string());
        }
        let byte = buf.get_u8();
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    if buf.remaining() < len {
        return Err(format!(
            "string of {} bytes exceeds remaining {}",
            len,
            buf.remaining()
        ));
    }

    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|e| format!("invalid UTF-8: {}", e))
}
