//! Request dispatch: endpoint validation, tenant and bearer headers,
//! session consistency, and authorization failure recovery.

use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tenant_dispatch_sdk::{
    AuthToken, DispatchError, DispatchResponse, HostContextProvider, KeyValueStore,
    PreparedRequest, RequestDescriptor, TenantLookup, TenantSlug, Transport,
};
use tracing::{debug, warn};
use url::Url;

use super::credentials::CredentialStore;
use super::endpoint::BaseEndpointResolver;
use super::host::HostContextResolver;
use super::recovery::FailureRecoveryHandler;
use super::tenant_cache::TenantIdCache;
use crate::config::DispatchConfig;
use crate::infra::HttpTenantLookup;

/// Builder for a [`Dispatcher`].
///
/// The host context, key-value store, and transport are required. Without
/// an explicit lookup, tenant slugs are resolved over the same transport
/// against the configured `resolve_path`.
pub struct DispatcherBuilder {
    config: DispatchConfig,
    host_context: Option<Arc<dyn HostContextProvider>>,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    lookup: Option<Arc<dyn TenantLookup>>,
    cache: Option<TenantIdCache>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            host_context: None,
            store: None,
            transport: None,
            lookup: None,
            cache: None,
        }
    }

    /// Source of the current origin and path.
    #[must_use]
    pub fn host_context(mut self, provider: Arc<dyn HostContextProvider>) -> Self {
        self.host_context = Some(provider);
        self
    }

    /// Persistent storage for credentials.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the slug lookup used on cache misses.
    #[must_use]
    pub fn lookup(mut self, lookup: Arc<dyn TenantLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Share an existing cache. Takes precedence over [`lookup`](Self::lookup).
    #[must_use]
    pub fn cache(mut self, cache: TenantIdCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate the configuration and assemble the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if the configuration is invalid or a
    /// required seam was not provided.
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        self.config.validate()?;
        let provider = self.host_context.ok_or_else(|| missing("host_context"))?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let transport = self.transport.ok_or_else(|| missing("transport"))?;

        let host = HostContextResolver::new(&self.config, provider);
        let endpoint = BaseEndpointResolver::new(&self.config, host.clone());
        let cache = match (self.cache, self.lookup) {
            (Some(cache), _) => cache,
            (None, Some(lookup)) => TenantIdCache::new(lookup),
            (None, None) => TenantIdCache::new(Arc::new(HttpTenantLookup::new(
                endpoint.clone(),
                Arc::clone(&transport),
                self.config.resolve_path.clone(),
            ))),
        };
        let credentials = Arc::new(CredentialStore::new(store));
        let recovery =
            FailureRecoveryHandler::new(&self.config, Arc::clone(&credentials), host.clone());

        Ok(Dispatcher {
            tenant_header: self.config.tenant_header_name()?,
            auth_failure_statuses: self.config.auth_failure_status_codes()?,
            host,
            endpoint,
            cache,
            credentials,
            recovery,
            transport,
        })
    }
}

fn missing(seam: &str) -> DispatchError {
    DispatchError::Config(format!("dispatcher requires a {seam}"))
}

/// Single entry point for outbound requests.
pub struct Dispatcher {
    tenant_header: HeaderName,
    auth_failure_statuses: Vec<StatusCode>,
    host: HostContextResolver,
    endpoint: BaseEndpointResolver,
    cache: TenantIdCache,
    credentials: Arc<CredentialStore>,
    recovery: FailureRecoveryHandler,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    #[must_use]
    pub fn builder(config: DispatchConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    /// Compose and send one request.
    ///
    /// Steps run in order: resolve the API origin, derive the tenant slug,
    /// purge credentials on a session tenant mismatch, attach the tenant
    /// header, attach the bearer header, build the absolute URL, send.
    /// Tenant and bearer headers are skipped for a request that triggered a
    /// purge. Responses pass through unchanged unless their status is an
    /// authorization failure.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidBaseUrl`] / [`DispatchError::InvalidUrl`] before
    ///   anything is sent.
    /// - [`DispatchError::Storage`] if the credential store fails.
    /// - [`DispatchError::Transport`] if no response was obtained.
    /// - [`DispatchError::Unauthorized`] for an authorization-failure status;
    ///   credentials are purged first and the error carries the redirect
    ///   decision.
    #[tracing::instrument(
        skip_all,
        fields(method = %descriptor.method, path = %descriptor.path)
    )]
    pub async fn dispatch(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<DispatchResponse, DispatchError> {
        let base = self.endpoint.resolve()?;
        let slug = self.host.current_slug();

        let purged = match &slug {
            Some(slug) => self.guard_session(slug)?,
            None => false,
        };

        let mut headers = descriptor.headers;
        headers.remove(&self.tenant_header);
        headers.remove(AUTHORIZATION);

        if !purged {
            if let Some(slug) = &slug {
                self.attach_tenant(&mut headers, slug).await?;
            }
            if let Some(token) = self.credentials.active_token()? {
                headers.insert(AUTHORIZATION, bearer_value(&token)?);
            }
        }

        let url = compose_url(&base, &descriptor.path)?;
        let request = PreparedRequest {
            method: descriptor.method,
            url,
            headers,
            body: descriptor.body.unwrap_or_default(),
        };

        let response = self.transport.send(request).await?;
        if self.auth_failure_statuses.contains(&response.status) {
            let redirect = self.recovery.recover();
            return Err(DispatchError::Unauthorized {
                status: response.status,
                redirect,
            });
        }
        debug!(status = %response.status, "Dispatched request");
        Ok(response)
    }

    /// Purge credentials issued under another tenant. Returns `true` when a
    /// purge happened.
    fn guard_session(&self, slug: &TenantSlug) -> Result<bool, DispatchError> {
        let Some(associated) = self.credentials.associated_slug()? else {
            return Ok(false);
        };
        if associated == slug.as_str() {
            return Ok(false);
        }

        warn!(
            associated = %associated,
            current = %slug,
            "Session tenant mismatch, purging credentials"
        );
        self.credentials.clear_all()?;
        if let Ok(stale) = TenantSlug::parse(&associated)
            && self.cache.evict(&stale).is_some()
        {
            debug!(slug = %stale, "Evicted stale tenant id");
        }
        Ok(true)
    }

    async fn attach_tenant(
        &self,
        headers: &mut HeaderMap,
        slug: &TenantSlug,
    ) -> Result<(), DispatchError> {
        match self.cache.resolve(slug).await {
            Some(id) => {
                headers.insert(
                    self.tenant_header.clone(),
                    HeaderValue::from_str(&id.to_string())?,
                );
            }
            None => debug!(slug = %slug, "No tenant id, sending without tenant header"),
        }
        Ok(())
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn cache(&self) -> &TenantIdCache {
        &self.cache
    }

    #[must_use]
    pub fn host(&self) -> &HostContextResolver {
        &self.host
    }

    #[must_use]
    pub fn endpoint(&self) -> &BaseEndpointResolver {
        &self.endpoint
    }

    #[must_use]
    pub fn recovery(&self) -> &FailureRecoveryHandler {
        &self.recovery
    }
}

fn bearer_value(token: &AuthToken) -> Result<HeaderValue, DispatchError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Join the validated origin and a request path into an absolute URL.
fn compose_url(base: &str, path: &str) -> Result<Url, DispatchError> {
    let path = path.trim();
    let invalid = |url: String, reason: String| DispatchError::InvalidUrl { url, reason };

    if path.contains("://") {
        return Err(invalid(
            path.to_owned(),
            "request path must be relative to the API origin".to_owned(),
        ));
    }

    let base = base.trim_end_matches('/');
    let joined = if path.is_empty() || path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };

    let url = Url::parse(&joined).map_err(|e| invalid(joined.clone(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(joined, format!("scheme '{}' is not http or https", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid(joined, "URL has no host".to_owned()));
    }
    Ok(url)
}
