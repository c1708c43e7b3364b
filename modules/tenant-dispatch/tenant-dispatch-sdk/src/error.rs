//! Error types for the tenant dispatch module.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::models::RedirectIntent;

/// Failure of the persistent key-value store backing credentials.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be encoded or decoded.
    #[error("storage encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failure of the outbound transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The request could not be turned into a wire request.
    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),

    /// The attempt did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS, or protocol failure.
    #[error("transport error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Reading the response body failed.
    #[error("failed to read response body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS setup failed while constructing the transport.
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Why a slug could not be translated to a tenant identifier.
///
/// Absorbed by the tenant cache; the classification only drives logging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LookupFailure {
    /// Backend answered 404: no tenant with this slug.
    #[error("tenant not found")]
    NotFound,

    /// Backend answered with another non-success status.
    #[error("lookup returned HTTP {0}")]
    Status(StatusCode),

    /// Success status, but the payload carried no usable identifier.
    #[error("invalid lookup payload: {0}")]
    InvalidPayload(String),

    /// Transport-level failure (connection, TLS, timeout).
    #[error("tenant lookup unreachable: {0}")]
    Unreachable(String),

    /// No valid API origin to send the lookup to.
    #[error("no usable API origin: {0}")]
    Endpoint(String),
}

impl LookupFailure {
    /// `true` when the backend positively reported the tenant as unknown,
    /// as opposed to the backend being unreachable or misbehaving.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupFailure::NotFound)
    }
}

/// Errors returned by the request dispatcher.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// Dispatcher configuration is invalid.
    #[error("invalid dispatch configuration: {0}")]
    Config(String),

    /// The resolved API origin is empty, root-only, or not http(s).
    #[error("invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The composed request URL is not a valid absolute URL.
    #[error("invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A header value could not be encoded.
    #[error("invalid request header: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The credential store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend rejected the credentials. Credentials have already been
    /// purged; `redirect` names the sign-in surface to navigate to.
    #[error("authorization failed (HTTP {status}), redirect to {}", .redirect.location)]
    Unauthorized {
        status: StatusCode,
        redirect: RedirectIntent,
    },
}

impl DispatchError {
    /// `true` for failures raised before anything reached the network.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            DispatchError::Config(_)
                | DispatchError::InvalidBaseUrl { .. }
                | DispatchError::InvalidUrl { .. }
                | DispatchError::InvalidHeader(_)
        )
    }

    /// Redirect intent carried by an authorization failure.
    #[must_use]
    pub fn redirect(&self) -> Option<&RedirectIntent> {
        match self {
            DispatchError::Unauthorized { redirect, .. } => Some(redirect),
            _ => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::models::EntryPoint;
    use std::error::Error;

    #[test]
    fn base_url_error_is_local() {
        let err = DispatchError::InvalidBaseUrl {
            url: "/".to_owned(),
            reason: "root path is not an origin".to_owned(),
        };
        assert!(err.is_local());
        assert_eq!(
            err.to_string(),
            "invalid API base URL '/': root path is not an origin"
        );
    }

    #[test]
    fn transport_error_is_not_local() {
        let err = DispatchError::from(TransportError::Timeout(Duration::from_secs(3)));
        assert!(!err.is_local());
        assert!(err.redirect().is_none());
    }

    #[test]
    fn unauthorized_renders_location() {
        let err = DispatchError::Unauthorized {
            status: StatusCode::UNAUTHORIZED,
            redirect: RedirectIntent {
                entry_point: EntryPoint::Staff,
                location: "/staff/login".to_owned(),
            },
        };
        assert_eq!(
            err.to_string(),
            "authorization failed (HTTP 401 Unauthorized), redirect to /staff/login"
        );
        assert_eq!(err.redirect().unwrap().entry_point, EntryPoint::Staff);
    }

    #[test]
    fn connection_error_preserves_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TransportError::Connection(Box::new(inner));
        let source = err.source().unwrap();
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn only_not_found_is_not_found() {
        assert!(LookupFailure::NotFound.is_not_found());
        assert!(!LookupFailure::Unreachable("dns".to_owned()).is_not_found());
        assert!(!LookupFailure::Status(StatusCode::BAD_GATEWAY).is_not_found());
    }
}
