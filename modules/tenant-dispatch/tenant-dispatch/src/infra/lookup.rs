//! Tenant slug lookup against the public resolution endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use http::header::{ACCEPT, HeaderValue};
use serde::Deserialize;
use tenant_dispatch_sdk::{
    LookupFailure, PreparedRequest, TenantId, TenantLookup, TenantSlug, Transport,
};
use url::Url;

use crate::domain::BaseEndpointResolver;

/// Resolves slugs with `GET {origin}{resolve_path}?subdomain={slug}`.
///
/// The API origin is re-resolved per lookup, so it follows the current
/// host context.
pub struct HttpTenantLookup {
    endpoint: BaseEndpointResolver,
    transport: Arc<dyn Transport>,
    resolve_path: String,
}

#[derive(Deserialize)]
struct ResolvePayload {
    tenant_id: Option<String>,
    #[serde(rename = "tenantId")]
    tenant_id_camel: Option<String>,
    id: Option<String>,
}

impl HttpTenantLookup {
    #[must_use]
    pub fn new(
        endpoint: BaseEndpointResolver,
        transport: Arc<dyn Transport>,
        resolve_path: String,
    ) -> Self {
        Self {
            endpoint,
            transport,
            resolve_path,
        }
    }

    fn request_url(&self, slug: &TenantSlug) -> Result<Url, LookupFailure> {
        let base = self
            .endpoint
            .resolve()
            .map_err(|e| LookupFailure::Endpoint(e.to_string()))?;
        let mut url = Url::parse(&format!("{base}{}", self.resolve_path))
            .map_err(|e| LookupFailure::Endpoint(e.to_string()))?;
        url.query_pairs_mut().append_pair("subdomain", slug.as_str());
        Ok(url)
    }
}

#[async_trait]
impl TenantLookup for HttpTenantLookup {
    #[tracing::instrument(skip_all, fields(slug = %slug))]
    async fn lookup(&self, slug: &TenantSlug) -> Result<TenantId, LookupFailure> {
        let mut request = PreparedRequest::get(self.request_url(slug)?);
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| LookupFailure::Unreachable(e.to_string()))?;

        if response.status == StatusCode::NOT_FOUND {
            return Err(LookupFailure::NotFound);
        }
        if !response.is_success() {
            return Err(LookupFailure::Status(response.status));
        }
        parse_payload(&response.body)
    }
}

fn parse_payload(body: &[u8]) -> Result<TenantId, LookupFailure> {
    let payload: ResolvePayload = serde_json::from_slice(body)
        .map_err(|e| LookupFailure::InvalidPayload(e.to_string()))?;
    let raw = [payload.tenant_id, payload.tenant_id_camel, payload.id]
        .into_iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
        .ok_or_else(|| LookupFailure::InvalidPayload("missing tenant id".to_owned()))?;
    TenantId::parse_str(raw.trim())
        .map_err(|e| LookupFailure::InvalidPayload(format!("tenant id '{raw}': {e}")))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const ID: &str = "6f1c2a4e-8b3d-4c1e-9f0a-2b7d5e3c9a10";

    #[test]
    fn accepts_every_identifier_field() {
        for body in [
            format!(r#"{{"tenant_id":"{ID}"}}"#),
            format!(r#"{{"tenantId":"{ID}","name":"Acme"}}"#),
            format!(r#"{{"id":"{ID}"}}"#),
        ] {
            assert_eq!(parse_payload(body.as_bytes()).unwrap().to_string(), ID);
        }
    }

    #[test]
    fn rejects_missing_or_malformed_identifier() {
        for body in [r"{}", r#"{"tenant_id":""}"#, r#"{"id":"not-a-uuid"}"#, "[]", "oops"] {
            assert!(
                matches!(
                    parse_payload(body.as_bytes()),
                    Err(LookupFailure::InvalidPayload(_))
                ),
                "{body}"
            );
        }
    }
}
