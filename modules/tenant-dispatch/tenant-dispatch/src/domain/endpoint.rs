//! API origin selection and validation.

use tenant_dispatch_sdk::DispatchError;
use tracing::{error, warn};
use url::Url;

use super::host::HostContextResolver;
use crate::config::DispatchConfig;

/// Chooses the absolute API origin every request is issued against.
#[derive(Clone)]
pub struct BaseEndpointResolver {
    host: HostContextResolver,
    production_origin: String,
    api_origin: Option<String>,
    fallback_origin: String,
    allow_insecure_http: bool,
}

impl BaseEndpointResolver {
    #[must_use]
    pub fn new(config: &DispatchConfig, host: HostContextResolver) -> Self {
        Self {
            host,
            production_origin: config.production_api_origin.clone(),
            api_origin: config
                .api_origin
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            fallback_origin: config.fallback_api_origin.clone(),
            allow_insecure_http: config.transport.allow_insecure_http,
        }
    }

    /// Resolve and validate the origin for the current host.
    ///
    /// The returned value has no trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidBaseUrl`] if the selected origin is
    /// empty, `/`, not `http`/`https`, or has no host.
    pub fn resolve(&self) -> Result<String, DispatchError> {
        let selected = self.select();
        self.validate(selected)
    }

    /// Pick an origin without validating it.
    ///
    /// Production hosts get the production origin; everything else gets the
    /// declared origin, then the fallback.
    #[must_use]
    pub fn select(&self) -> &str {
        let on_production = self
            .host
            .current_host()
            .is_some_and(|h| self.host.is_production_host(&h) && !self.host.is_loopback(&h));
        if on_production {
            return &self.production_origin;
        }
        if let Some(declared) = &self.api_origin {
            return declared;
        }
        warn!(
            fallback = %self.fallback_origin,
            "No API origin declared, using fallback origin"
        );
        &self.fallback_origin
    }

    /// Validate an origin candidate.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidBaseUrl`] describing the first failed check.
    pub fn validate(&self, raw: &str) -> Result<String, DispatchError> {
        let trimmed = raw.trim();
        let reject = |reason: String| {
            error!(url = %raw, %reason, "Refusing to dispatch: invalid API base URL");
            Err(DispatchError::InvalidBaseUrl {
                url: raw.to_owned(),
                reason,
            })
        };

        if trimmed.is_empty() {
            return reject("origin is empty".to_owned());
        }
        if trimmed.trim_end_matches('/').is_empty() {
            return reject("root path is not an origin".to_owned());
        }

        let parsed = match Url::parse(trimmed) {
            Ok(url) => url,
            Err(e) => return reject(format!("not an absolute URL: {e}")),
        };
        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return reject(format!("scheme '{scheme}' is not http or https"));
        }
        if scheme == "http" && !self.allow_insecure_http {
            return reject("plain http is disabled".to_owned());
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return reject("origin has no host".to_owned());
        }

        Ok(trimmed.trim_end_matches('/').to_owned())
    }
}
