//! Configuration for the tenant dispatch module.

use std::time::Duration;

use http::HeaderName;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tenant_dispatch_sdk::{DispatchError, TenantSlug};

/// Default User-Agent string for outbound requests.
pub const DEFAULT_USER_AGENT: &str = concat!("tenant-dispatch/", env!("CARGO_PKG_VERSION"));

/// Module configuration.
///
/// Every value is supplied by the embedding runtime; nothing here is
/// computed by the dispatch layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Marketing root domain; tenants live at `{slug}.{root_domain}`.
    pub root_domain: String,

    /// API origin used when the current host belongs to the production
    /// domain family.
    pub production_api_origin: String,

    /// Environment-declared API origin. A blank value counts as unset.
    pub api_origin: Option<String>,

    /// Last-resort API origin.
    pub fallback_api_origin: String,

    /// Slug to use on loopback hosts during development.
    pub dev_tenant_slug: Option<String>,

    /// Subdomains that never denote a tenant.
    pub reserved_subdomains: Vec<String>,

    /// Host names treated as local loopback.
    pub loopback_hosts: Vec<String>,

    /// Slug of the privileged super-admin tenant.
    pub admin_slug: String,

    /// Header carrying the resolved tenant identifier.
    pub tenant_header: String,

    /// Path of the public slug resolution endpoint, relative to the API origin.
    pub resolve_path: String,

    /// Response statuses that trigger credential purge and re-authentication.
    pub auth_failure_statuses: Vec<u16>,

    /// Sign-in surfaces used after an authorization failure.
    pub entry_points: EntryPointsConfig,

    /// Outbound HTTP transport settings.
    pub transport: TransportConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            root_domain: "example.com".to_owned(),
            production_api_origin: "https://api.example.com".to_owned(),
            api_origin: None,
            fallback_api_origin: "http://localhost:8000".to_owned(),
            dev_tenant_slug: None,
            reserved_subdomains: ["www", "api", "mail", "smtp", "ftp", "cdn", "static"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            loopback_hosts: ["localhost", "127.0.0.1", "::1"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            admin_slug: "admin".to_owned(),
            tenant_header: "x-tenant-id".to_owned(),
            resolve_path: "/tenants/public/resolve".to_owned(),
            auth_failure_statuses: vec![401],
            entry_points: EntryPointsConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Validate that the configuration is self-consistent.
    ///
    /// The API origins are deliberately not checked here: they are validated
    /// on every dispatch, where an invalid value fails that dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if:
    /// - `root_domain` is blank,
    /// - `tenant_header` is not a valid header name,
    /// - `admin_slug`, `dev_tenant_slug`, or a reserved subdomain is not a valid slug,
    /// - an entry point or path prefix is not an absolute path,
    /// - an authorization-failure status is not a valid HTTP status.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.root_domain.trim().is_empty() {
            return Err(DispatchError::Config("root_domain must not be empty".into()));
        }
        self.tenant_header_name()?;
        TenantSlug::parse(&self.admin_slug)
            .map_err(|e| DispatchError::Config(format!("admin_slug: {e}")))?;
        if let Some(dev) = &self.dev_tenant_slug {
            TenantSlug::parse(dev)
                .map_err(|e| DispatchError::Config(format!("dev_tenant_slug: {e}")))?;
        }
        for reserved in &self.reserved_subdomains {
            TenantSlug::parse(reserved)
                .map_err(|e| DispatchError::Config(format!("reserved_subdomains: {e}")))?;
        }
        if !self.resolve_path.starts_with('/') {
            return Err(DispatchError::Config(
                "resolve_path must start with '/'".into(),
            ));
        }
        self.auth_failure_status_codes()?;
        self.entry_points.validate()
    }

    /// Parsed authorization-failure statuses.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] naming the first entry that is not a
    /// valid HTTP status code.
    pub fn auth_failure_status_codes(&self) -> Result<Vec<http::StatusCode>, DispatchError> {
        self.auth_failure_statuses
            .iter()
            .map(|status| {
                http::StatusCode::from_u16(*status).map_err(|_| {
                    DispatchError::Config(format!(
                        "auth_failure_statuses: invalid status {status}"
                    ))
                })
            })
            .collect()
    }

    /// Parsed tenant header name.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if `tenant_header` is not a valid
    /// header name.
    pub fn tenant_header_name(&self) -> Result<HeaderName, DispatchError> {
        HeaderName::try_from(self.tenant_header.as_str()).map_err(|e| {
            DispatchError::Config(format!("tenant_header '{}': {e}", self.tenant_header))
        })
    }

    /// Normalized root domain (lowercase, no surrounding dots).
    #[must_use]
    pub fn normalized_root_domain(&self) -> String {
        self.root_domain.trim().trim_matches('.').to_ascii_lowercase()
    }
}

/// Sign-in surfaces and the path prefixes that select them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntryPointsConfig {
    pub admin: String,
    pub host: String,
    pub staff: String,
    pub generic: String,
    /// Paths under this prefix belong to the host dashboard.
    pub host_prefix: String,
    /// Paths under this prefix belong to the staff dashboard.
    pub staff_prefix: String,
}

impl Default for EntryPointsConfig {
    fn default() -> Self {
        Self {
            admin: "/admin/login".to_owned(),
            host: "/host/login".to_owned(),
            staff: "/staff/login".to_owned(),
            generic: "/login".to_owned(),
            host_prefix: "/host".to_owned(),
            staff_prefix: "/staff".to_owned(),
        }
    }
}

impl EntryPointsConfig {
    fn validate(&self) -> Result<(), DispatchError> {
        let paths = [
            ("admin", &self.admin),
            ("host", &self.host),
            ("staff", &self.staff),
            ("generic", &self.generic),
            ("host_prefix", &self.host_prefix),
            ("staff_prefix", &self.staff_prefix),
        ];
        for (name, path) in paths {
            if !path.starts_with('/') {
                return Err(DispatchError::Config(format!(
                    "entry_points.{name} must be an absolute path, got '{path}'"
                )));
            }
        }
        Ok(())
    }
}

/// Outbound HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Per-request timeout, in humantime format (`10s`, `1m 30s`).
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,

    /// Value of the `User-Agent` header.
    pub user_agent: String,

    /// Permit plain `http://` origins (the default fallback origin is one).
    pub allow_insecure_http: bool,

    /// Maximum idle pooled connections per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            allow_insecure_http: true,
            pool_max_idle_per_host: 8,
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = DispatchConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.tenant_header_name().unwrap().as_str(), "x-tenant-id");
        assert!(cfg.reserved_subdomains.iter().any(|s| s == "www"));
    }

    #[test]
    fn deserializes_partial_config_with_defaults() {
        let cfg: DispatchConfig = serde_json::from_value(serde_json::json!({
            "root_domain": "tickets.test",
            "dev_tenant_slug": "acme",
            "transport": { "request_timeout": "2s 500ms" }
        }))
        .unwrap();
        assert_eq!(cfg.root_domain, "tickets.test");
        assert_eq!(cfg.dev_tenant_slug.as_deref(), Some("acme"));
        assert_eq!(cfg.transport.request_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.admin_slug, "admin");
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = serde_json::from_value::<DispatchConfig>(serde_json::json!({
            "root_domian": "typo.test"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn rejects_invalid_tenant_header() {
        let cfg = DispatchConfig {
            tenant_header: "x tenant".to_owned(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(DispatchError::Config(_))));
    }

    #[test]
    fn rejects_invalid_dev_slug() {
        let cfg = DispatchConfig {
            dev_tenant_slug: Some("Not_A_Slug".to_owned()),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("dev_tenant_slug"));
    }

    #[test]
    fn rejects_unknown_auth_failure_status() {
        let cfg = DispatchConfig {
            auth_failure_statuses: vec![401, 4010],
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid status 4010"));

        let cfg = DispatchConfig {
            auth_failure_statuses: vec![401, 419],
            ..Default::default()
        };
        let codes = cfg.auth_failure_status_codes().unwrap();
        assert_eq!(codes[1].as_u16(), 419);
    }

    #[test]
    fn rejects_relative_entry_point() {
        let cfg = DispatchConfig {
            entry_points: EntryPointsConfig {
                staff: "staff/login".to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("entry_points.staff"));
    }

    #[test]
    fn duration_round_trips_through_humantime() {
        let cfg = TransportConfig {
            request_timeout: Duration::from_secs(90),
            ..Default::default()
        };
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["request_timeout"], "1m 30s");
        let back: TransportConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back.request_timeout, Duration::from_secs(90));
    }

    #[test]
    fn normalizes_root_domain() {
        let cfg = DispatchConfig {
            root_domain: " .Example.COM. ".to_owned(),
            ..Default::default()
        };
        assert_eq!(cfg.normalized_root_domain(), "example.com");
    }
}
