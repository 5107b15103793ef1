//! Access/refresh token storage
//!
//! The access token lives only in process memory. The refresh token is
//! persisted through a [`KeyValueStore`] so a restarted process can resume the
//! session without asking the user to log in again.

use arc_swap::ArcSwap;
use latch_core::{KeyValueStore, MemoryStore, StorageError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Storage key of the persisted refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

macro_rules! opaque_token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }
    };
}

opaque_token!(
    /// Short-lived bearer credential attached to every request
    AccessToken
);
opaque_token!(
    /// Long-lived credential used only to obtain new access tokens
    RefreshToken
);

/// Both tokens as seen at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub access: Option<AccessToken>,
    pub refresh: Option<RefreshToken>,
}

/// Holder of the current session's tokens.
///
/// Cloning is cheap and every clone observes the same tokens.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

/// The access token together with the epoch it was installed in
#[derive(Default)]
struct Held {
    token: Option<AccessToken>,
    epoch: u64,
}

struct Inner {
    access: ArcSwap<Held>,
    storage: Arc<dyn KeyValueStore>,
    /// Bumped whenever the whole pair is replaced or cleared
    epoch: AtomicU64,
    /// Serializes mutations that touch durable storage
    writes: Mutex<()>,
}

impl TokenStore {
    /// Create a store persisting the refresh token to `storage`
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                access: ArcSwap::from_pointee(Held::default()),
                storage,
                epoch: AtomicU64::new(0),
                writes: Mutex::new(()),
            }),
        }
    }

    /// Create a store whose refresh token does not outlive the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Current access token, if any. Never touches storage.
    pub fn access(&self) -> Option<AccessToken> {
        self.inner.access.load().token.clone()
    }

    /// Current access token and the session epoch it belongs to, read
    /// together
    pub fn access_with_epoch(&self) -> (Option<AccessToken>, u64) {
        let held = self.inner.access.load();
        (held.token.clone(), held.epoch)
    }

    /// Replace the in-memory access token within the current epoch
    pub fn set_access(&self, token: Option<AccessToken>) {
        self.inner.access.store(Arc::new(Held {
            token,
            epoch: self.epoch(),
        }));
    }

    /// Persisted refresh token, if any
    pub async fn refresh(&self) -> Result<Option<RefreshToken>, StorageError> {
        Ok(self
            .inner
            .storage
            .get(REFRESH_TOKEN_KEY)
            .await?
            .map(RefreshToken::from))
    }

    /// Persist a refresh token; `None` deletes the stored value outright
    pub async fn set_refresh(&self, token: Option<RefreshToken>) -> Result<(), StorageError> {
        let _guard = self.inner.writes.lock().await;
        self.persist_refresh(token.as_ref()).await
    }

    /// Install a new token pair, starting a new session epoch
    pub async fn set_both(
        &self,
        access: Option<AccessToken>,
        refresh: Option<RefreshToken>,
    ) -> Result<(), StorageError> {
        let _guard = self.inner.writes.lock().await;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.persist_refresh(refresh.as_ref()).await?;
        self.set_access(access);
        debug!(epoch = self.epoch(), "installed token pair");
        Ok(())
    }

    /// Forget both tokens, starting a new session epoch
    ///
    /// The in-memory token is dropped even if removing the persisted one
    /// fails.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.inner.writes.lock().await;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.set_access(None);
        self.persist_refresh(None).await?;
        debug!(epoch = self.epoch(), "cleared tokens");
        Ok(())
    }

    /// Clear both tokens unless the session changed since `epoch`.
    ///
    /// Returns whether anything was cleared.
    pub async fn clear_if_epoch(&self, epoch: u64) -> Result<bool, StorageError> {
        let _guard = self.inner.writes.lock().await;
        if self.epoch() != epoch {
            return Ok(false);
        }
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.set_access(None);
        self.persist_refresh(None).await?;
        Ok(true)
    }

    /// Current session epoch
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Apply the outcome of a refresh that started during `epoch`.
    ///
    /// The access token is always replaced; the refresh token only when the
    /// server rotated it. Returns `false` without touching anything when the
    /// session was cleared or replaced in the meantime.
    pub async fn apply_refresh(
        &self,
        epoch: u64,
        access: AccessToken,
        refresh: Option<RefreshToken>,
    ) -> Result<bool, StorageError> {
        let _guard = self.inner.writes.lock().await;
        if self.epoch() != epoch {
            debug!(
                started = epoch,
                current = self.epoch(),
                "discarding refresh result from a previous session"
            );
            return Ok(false);
        }
        if let Some(refresh) = refresh {
            self.persist_refresh(Some(&refresh)).await?;
        }
        self.set_access(Some(access));
        Ok(true)
    }

    /// Read both tokens
    pub async fn snapshot(&self) -> Result<TokenPair, StorageError> {
        Ok(TokenPair {
            access: self.access(),
            refresh: self.refresh().await?,
        })
    }

    async fn persist_refresh(&self, token: Option<&RefreshToken>) -> Result<(), StorageError> {
        match token {
            Some(token) => {
                self.inner
                    .storage
                    .set(REFRESH_TOKEN_KEY, token.as_str())
                    .await
            }
            None => self.inner.storage.remove(REFRESH_TOKEN_KEY).await,
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_access", &self.inner.access.load().token.is_some())
            .field("epoch", &self.epoch())
            .finish_non_exhaustive()
    }
}
