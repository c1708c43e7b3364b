//! Tenant slug derivation from the current network origin.

use std::collections::HashSet;
use std::sync::Arc;

use tenant_dispatch_sdk::{HostContextProvider, TenantSlug};
use tracing::{debug, warn};
use url::Url;

use crate::config::DispatchConfig;

const LOCALHOST_SUFFIX: &str = ".localhost";

/// Derives the current [`TenantSlug`] from the host context.
///
/// Resolution is a pure function of the provider's origin and the
/// configuration; nothing is cached between calls.
#[derive(Clone)]
pub struct HostContextResolver {
    provider: Arc<dyn HostContextProvider>,
    root_domain: String,
    www_root: String,
    reserved: Arc<HashSet<String>>,
    loopback_hosts: Arc<HashSet<String>>,
    dev_slug: Option<TenantSlug>,
}

impl HostContextResolver {
    /// Build a resolver from configuration.
    ///
    /// An invalid `dev_tenant_slug` is ignored with a warning; run
    /// [`DispatchConfig::validate`] to reject it up front.
    #[must_use]
    pub fn new(config: &DispatchConfig, provider: Arc<dyn HostContextProvider>) -> Self {
        let root_domain = config.normalized_root_domain();
        let dev_slug = config
            .dev_tenant_slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|raw| match TenantSlug::parse(&raw.to_ascii_lowercase()) {
                Ok(slug) => Some(slug),
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid development tenant slug");
                    None
                }
            });

        Self {
            provider,
            www_root: format!("www.{root_domain}"),
            root_domain,
            reserved: Arc::new(
                config
                    .reserved_subdomains
                    .iter()
                    .map(|s| s.to_ascii_lowercase())
                    .collect(),
            ),
            loopback_hosts: Arc::new(
                config
                    .loopback_hosts
                    .iter()
                    .map(|h| normalize_host(h))
                    .collect(),
            ),
            dev_slug,
        }
    }

    /// Slug for the provider's current origin.
    #[must_use]
    pub fn current_slug(&self) -> Option<TenantSlug> {
        self.slug_for_origin(&self.provider.origin())
    }

    /// Normalized host of the provider's current origin.
    #[must_use]
    pub fn current_host(&self) -> Option<String> {
        host_of(&self.provider.origin())
    }

    /// Current path as reported by the provider.
    #[must_use]
    pub fn current_path(&self) -> String {
        self.provider.path()
    }

    /// Slug for an arbitrary origin.
    ///
    /// Returns `None` for the marketing origin, reserved subdomains,
    /// malformed labels, and hosts outside the root domain family.
    #[must_use]
    pub fn slug_for_origin(&self, origin: &str) -> Option<TenantSlug> {
        let Some(host) = host_of(origin) else {
            debug!(origin, "Origin has no parseable host");
            return None;
        };

        if host == self.root_domain || host == self.www_root {
            return None;
        }

        if self.is_loopback(&host) {
            return self.dev_slug.clone();
        }

        let label = host
            .strip_suffix(LOCALHOST_SUFFIX)
            .or_else(|| {
                host.strip_suffix(self.root_domain.as_str())
                    .and_then(|prefix| prefix.strip_suffix('.'))
            })?;

        if self.reserved.contains(label) {
            return None;
        }

        match TenantSlug::parse(label) {
            Ok(slug) => Some(slug),
            Err(e) => {
                debug!(error = %e, "Subdomain is not a tenant slug");
                None
            }
        }
    }

    /// `true` when `host` is a configured loopback name.
    #[must_use]
    pub fn is_loopback(&self, host: &str) -> bool {
        self.loopback_hosts.contains(&normalize_host(host))
    }

    /// `true` when `host` is the root domain or one of its subdomains.
    #[must_use]
    pub fn is_production_host(&self, host: &str) -> bool {
        let host = normalize_host(host);
        host == self.root_domain
            || host
                .strip_suffix(self.root_domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// Extract the normalized host from an origin.
///
/// Bare `host[:port]` values without a scheme are accepted.
#[must_use]
pub fn host_of(origin: &str) -> Option<String> {
    let origin = origin.trim();
    if origin.is_empty() {
        return None;
    }
    let parsed = Url::parse(origin)
        .ok()
        .filter(|url| url.host_str().is_some())
        .or_else(|| Url::parse(&format!("http://{origin}")).ok())?;
    parsed.host_str().map(normalize_host)
}

fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}
