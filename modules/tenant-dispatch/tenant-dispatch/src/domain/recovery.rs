//! Authorization failure recovery.

use std::sync::Arc;

use tenant_dispatch_sdk::{EntryPoint, RedirectIntent, TenantSlug};
use tracing::{error, warn};

use super::credentials::CredentialStore;
use super::host::HostContextResolver;
use crate::config::{DispatchConfig, EntryPointsConfig};

/// Purges credentials and picks the sign-in surface after an authorization
/// failure. The failed request is never retried here.
#[derive(Clone)]
pub struct FailureRecoveryHandler {
    credentials: Arc<CredentialStore>,
    host: HostContextResolver,
    admin_slug: String,
    entry_points: EntryPointsConfig,
}

impl FailureRecoveryHandler {
    #[must_use]
    pub fn new(
        config: &DispatchConfig,
        credentials: Arc<CredentialStore>,
        host: HostContextResolver,
    ) -> Self {
        Self {
            credentials,
            host,
            admin_slug: config.admin_slug.clone(),
            entry_points: config.entry_points.clone(),
        }
    }

    /// Clear every credential, then decide where to send the user.
    ///
    /// The redirect is decided even when the purge fails; the storage
    /// failure is logged.
    #[must_use]
    pub fn recover(&self) -> RedirectIntent {
        if let Err(e) = self.credentials.clear_all() {
            error!(error = %e, "Failed to clear credentials after authorization failure");
        }
        let slug = self.host.current_slug();
        let path = self.host.current_path();
        let intent = self.decide(slug.as_ref().map(TenantSlug::as_str), &path);
        warn!(
            entry_point = ?intent.entry_point,
            location = %intent.location,
            "Authorization failed, redirecting to sign-in"
        );
        intent
    }

    /// Redirect decision for a tenant slug and current path.
    ///
    /// The admin tenant wins over any path; otherwise the host and staff
    /// path prefixes are checked, falling back to the generic entry point.
    #[must_use]
    pub fn decide(&self, slug: Option<&str>, path: &str) -> RedirectIntent {
        let entry_point = if slug == Some(self.admin_slug.as_str()) {
            EntryPoint::Admin
        } else if under_prefix(path, &self.entry_points.host_prefix) {
            EntryPoint::Host
        } else if under_prefix(path, &self.entry_points.staff_prefix) {
            EntryPoint::Staff
        } else {
            EntryPoint::Generic
        };

        let location = match entry_point {
            EntryPoint::Admin => &self.entry_points.admin,
            EntryPoint::Host => &self.entry_points.host,
            EntryPoint::Staff => &self.entry_points.staff,
            EntryPoint::Generic => &self.entry_points.generic,
        };

        RedirectIntent {
            entry_point,
            location: location.clone(),
        }
    }
}

/// `true` when `path` is `prefix` itself or a path segment below it.
fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use tenant_dispatch_sdk::{AuthToken, HostContextProvider, KeyValueStore, StorageError};

    use super::*;
    use crate::infra::InMemoryKeyValueStore;

    struct Location {
        origin: &'static str,
        path: &'static str,
    }

    impl HostContextProvider for Location {
        fn origin(&self) -> String {
            self.origin.to_owned()
        }

        fn path(&self) -> String {
            self.path.to_owned()
        }
    }

    fn handler(origin: &'static str, path: &'static str) -> (Arc<InMemoryKeyValueStore>, FailureRecoveryHandler) {
        let config = DispatchConfig::default();
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let creds = Arc::new(CredentialStore::new(kv.clone()));
        let host = HostContextResolver::new(&config, Arc::new(Location { origin, path }));
        (kv, FailureRecoveryHandler::new(&config, creds, host))
    }

    #[test]
    fn admin_tenant_wins_over_path() {
        let (_, h) = handler("https://example.com", "/");
        let intent = h.decide(Some("admin"), "/host/events");
        assert_eq!(intent.entry_point, EntryPoint::Admin);
        assert_eq!(intent.location, "/admin/login");
    }

    #[test]
    fn path_prefix_selects_dashboard() {
        let (_, h) = handler("https://example.com", "/");
        assert_eq!(h.decide(Some("acme"), "/host").entry_point, EntryPoint::Host);
        assert_eq!(h.decide(Some("acme"), "/host/events/7").entry_point, EntryPoint::Host);
        assert_eq!(h.decide(None, "/staff?tab=scan").entry_point, EntryPoint::Staff);
        assert_eq!(h.decide(Some("acme"), "/hosting").entry_point, EntryPoint::Generic);
        assert_eq!(h.decide(Some("acme"), "/events").entry_point, EntryPoint::Generic);
    }

    #[test]
    fn recover_clears_credentials_and_uses_current_location() {
        let (kv, h) = handler("https://acme.example.com", "/staff/checkin");
        let creds = CredentialStore::new(kv.clone());
        creds
            .set_token(&AuthToken::new("t"), Some(&TenantSlug::parse("acme").unwrap()))
            .unwrap();

        let intent = h.recover();

        assert_eq!(intent.entry_point, EntryPoint::Staff);
        assert_eq!(intent.location, "/staff/login");
        assert_eq!(kv.get("auth_token").unwrap(), None);
        assert_eq!(kv.get("session_tenant").unwrap(), None);
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(Some("t".to_owned()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(read_only())
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(read_only())
        }
    }

    fn read_only() -> StorageError {
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into()
    }

    #[test]
    fn recover_decides_even_when_purge_fails() {
        let config = DispatchConfig::default();
        let creds = Arc::new(CredentialStore::new(Arc::new(ReadOnlyStore)));
        let location = Location {
            origin: "https://acme.example.com",
            path: "/host/events",
        };
        let host = HostContextResolver::new(&config, Arc::new(location));
        let h = FailureRecoveryHandler::new(&config, creds, host);

        let intent = h.recover();

        assert_eq!(intent.entry_point, EntryPoint::Host);
        assert_eq!(intent.location, "/host/login");
    }

    #[test]
    fn recover_on_admin_host() {
        let (_, h) = handler("https://admin.example.com", "/host/events");
        assert_eq!(h.recover().entry_point, EntryPoint::Admin);
    }
}
