//! Domain models for the tenant dispatch module.

use std::fmt;
use std::sync::LazyLock;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Stable backend identifier for a tenant.
pub type TenantId = Uuid;

#[allow(clippy::expect_used)]
static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9][a-z0-9-]*[a-z0-9]|[a-z0-9])$").expect("static regex should not panic")
});

/// A slug failed format validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid tenant slug '{0}'")]
pub struct InvalidSlug(pub String);

/// Lowercase subdomain label identifying a tenant.
///
/// Only values matching `^[a-z0-9][a-z0-9-]*[a-z0-9]$|^[a-z0-9]$` can be
/// constructed, so a `TenantSlug` in hand is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantSlug(String);

impl TenantSlug {
    /// Validate and wrap a slug.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSlug`] if `raw` does not match the slug format.
    /// No case folding is applied; callers normalize before parsing.
    pub fn parse(raw: &str) -> Result<Self, InvalidSlug> {
        if SLUG_PATTERN.is_match(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(InvalidSlug(raw.to_owned()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TenantSlug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Role a stored credential is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Generic,
    Buyer,
    Host,
    Staff,
    Admin,
}

impl Role {
    /// Roles in the order their tokens are consulted when picking the
    /// active credential.
    pub const PRIORITY: [Role; 5] = [
        Role::Generic,
        Role::Buyer,
        Role::Host,
        Role::Staff,
        Role::Admin,
    ];

    /// Persistent storage key holding this role's token.
    #[must_use]
    pub fn storage_key(self) -> &'static str {
        match self {
            Role::Generic => "auth_token",
            Role::Buyer => "buyer_token",
            Role::Host => "host_token",
            Role::Staff => "staff_token",
            Role::Admin => "admin_token",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Generic => "generic",
            Role::Buyer => "buyer",
            Role::Host => "host",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bearer credential value.
///
/// `Debug` and `Display` both print `[REDACTED]`; the backing buffer is
/// zeroed on drop. Use [`expose`](Self::expose) only to build the
/// `Authorization` header or to persist the token.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AuthToken(String);

impl AuthToken {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Clone for AuthToken {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AuthToken {}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Outbound call as issued by feature code: a path relative to the API
/// origin, a method, and an optional body.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: Option<Bytes>,
    /// Extra caller headers. Tenant and authorization headers supplied here
    /// are discarded; the dispatcher owns those.
    pub headers: HeaderMap,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set `content-type` unless the
    /// caller already did.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be encoded.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        if !self.headers.contains_key(http::header::CONTENT_TYPE) {
            self.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
        }
        self.body = Some(Bytes::from(body));
        Ok(self)
    }
}

/// Fully resolved request handed to the [`Transport`](crate::Transport):
/// the absolute URL and the headers actually sent.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl PreparedRequest {
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Response returned by the transport, passed through unchanged.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DispatchResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the decoder error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sign-in surface chosen after an authorization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    Admin,
    Host,
    Staff,
    Generic,
}

/// "Navigate to X" decision produced by failure recovery. Performing the
/// navigation is up to the embedding runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectIntent {
    pub entry_point: EntryPoint,
    pub location: String,
}

/// Session state derived from the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Anonymous,
    Authenticated {
        role: Role,
        /// Slug the credentials were issued under, if one was recorded.
        tenant: Option<String>,
    },
}
