//! Runtime seams the dispatcher depends on.
//!
//! The embedding runtime (browser shell, desktop host, CLI) supplies these;
//! the core never touches ambient globals directly.

use async_trait::async_trait;

use crate::error::{LookupFailure, StorageError, TransportError};
use crate::models::{DispatchResponse, PreparedRequest, TenantId, TenantSlug};

/// Source of the current network location.
pub trait HostContextProvider: Send + Sync {
    /// Current origin, e.g. `https://acme.example.com` or `acme.localhost:3000`.
    fn origin(&self) -> String;

    /// Current path, used to pick a sign-in surface after an authorization
    /// failure.
    fn path(&self) -> String {
        "/".to_owned()
    }
}

/// Persistent client-side key-value storage.
///
/// Operations are synchronous: the dispatcher only suspends on network I/O.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove several keys. Implementations should apply the removal as one
    /// step; the default falls back to removing keys one by one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be written.
    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Outbound HTTP transport.
///
/// Returns `Ok` for every HTTP status; `Err` is reserved for failures where
/// no response was obtained.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection, TLS, timeout, or body failures.
    async fn send(&self, request: PreparedRequest) -> Result<DispatchResponse, TransportError>;
}

/// Translates a slug into the backend's tenant identifier.
#[async_trait]
pub trait TenantLookup: Send + Sync {
    /// # Errors
    ///
    /// Returns a classified [`LookupFailure`]; callers treat every failure as
    /// "no identifier".
    async fn lookup(&self, slug: &TenantSlug) -> Result<TenantId, LookupFailure>;
}
