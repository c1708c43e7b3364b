//! Role-scoped credentials and the session association.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tenant_dispatch_sdk::{AuthToken, KeyValueStore, Role, SessionState, StorageError, TenantSlug};
use tracing::{debug, info};

/// Storage key recording the slug the credential set was issued under.
pub const SESSION_TENANT_KEY: &str = "session_tenant";

/// Cached profile blobs removed together with the credentials.
const PROFILE_KEYS: [&str; 2] = ["user", "profile"];

/// Credential access on top of a [`KeyValueStore`].
///
/// Reads hold a shared lock for the whole scan and purges hold it
/// exclusively, so a reader never sees a partially cleared set.
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    lock: RwLock<()>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: RwLock::new(()),
        }
    }

    /// First usable token in role priority order.
    ///
    /// Entries that cannot be interpreted as a bearer value are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read.
    pub fn active_token(&self) -> Result<Option<AuthToken>, StorageError> {
        Ok(self.active_credential()?.map(|(_, token)| token))
    }

    /// Role of the token [`active_token`](Self::active_token) would return.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read.
    pub fn active_role(&self) -> Result<Option<Role>, StorageError> {
        Ok(self.active_credential()?.map(|(role, _)| role))
    }

    fn active_credential(&self) -> Result<Option<(Role, AuthToken)>, StorageError> {
        let _read = self.lock.read();
        for role in Role::PRIORITY {
            let Some(raw) = self.store.get(role.storage_key())? else {
                continue;
            };
            if let Some(token) = StoredToken::parse(&raw).and_then(StoredToken::into_bearer) {
                return Ok(Some((role, token)));
            }
            debug!(role = %role, "Skipping unusable stored token");
        }
        Ok(None)
    }

    /// Store the generic token and record the session association.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be written.
    pub fn set_token(&self, token: &AuthToken, slug: Option<&TenantSlug>) -> Result<(), StorageError> {
        self.set_role_token(Role::Generic, token, slug)
    }

    /// Store a role-scoped token and record the session association.
    ///
    /// Tokens held under other roles are removed, so the new role is the
    /// only one active. A `None` slug removes any previous association.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be written.
    pub fn set_role_token(
        &self,
        role: Role,
        token: &AuthToken,
        slug: Option<&TenantSlug>,
    ) -> Result<(), StorageError> {
        let others: Vec<&str> = Role::PRIORITY
            .into_iter()
            .filter(|other| *other != role)
            .map(Role::storage_key)
            .collect();
        let _write = self.lock.write();
        self.store.remove_many(&others)?;
        self.store.set(role.storage_key(), token.expose())?;
        match slug {
            Some(slug) => self.store.set(SESSION_TENANT_KEY, slug.as_str())?,
            None => self.store.remove(SESSION_TENANT_KEY)?,
        }
        info!(role = %role, tenant = slug.map(TenantSlug::as_str), "Stored credentials");
        Ok(())
    }

    /// Remove every role token, the session association, and cached
    /// profile blobs in one step. Clearing an empty store is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be written.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        let keys: Vec<&str> = Role::PRIORITY
            .into_iter()
            .map(Role::storage_key)
            .chain([SESSION_TENANT_KEY])
            .chain(PROFILE_KEYS)
            .collect();
        let _write = self.lock.write();
        self.store.remove_many(&keys)?;
        info!("Cleared stored credentials");
        Ok(())
    }

    /// Slug the stored credentials were issued under.
    ///
    /// Returned as stored, without slug validation, so that any recorded
    /// value can be compared against the current slug.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read.
    pub fn associated_slug(&self) -> Result<Option<String>, StorageError> {
        let _read = self.lock.read();
        Ok(self
            .store
            .get(SESSION_TENANT_KEY)?
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty()))
    }

    /// Current session state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read.
    pub fn session_state(&self) -> Result<SessionState, StorageError> {
        let Some(role) = self.active_role()? else {
            return Ok(SessionState::Anonymous);
        };
        Ok(SessionState::Authenticated {
            role,
            tenant: self.associated_slug()?,
        })
    }
}

/// Shapes a persisted token value can take.
enum StoredToken {
    /// JSON object carrying the bearer value under one of several fields.
    Envelope(TokenEnvelope),
    /// JSON string literal.
    Quoted(String),
    /// Bare bearer value.
    Raw(String),
}

#[derive(Deserialize)]
struct TokenEnvelope {
    token: Option<String>,
    access_token: Option<String>,
    #[serde(rename = "accessToken")]
    access_token_camel: Option<String>,
}

impl StoredToken {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed).ok().map(StoredToken::Envelope);
        }
        if trimmed.starts_with('"') {
            return serde_json::from_str(trimmed).ok().map(StoredToken::Quoted);
        }
        Some(StoredToken::Raw(trimmed.to_owned()))
    }

    fn into_bearer(self) -> Option<AuthToken> {
        let value = match self {
            StoredToken::Envelope(envelope) => [
                envelope.token,
                envelope.access_token,
                envelope.access_token_camel,
            ]
            .into_iter()
            .flatten()
            .find(|v| !v.trim().is_empty())?,
            StoredToken::Quoted(value) | StoredToken::Raw(value) => value,
        };
        let value = value.trim();
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return None;
        }
        Some(AuthToken::new(value))
    }
}
