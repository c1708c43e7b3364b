//! Tenant Dispatch Module
//!
//! Tenant resolution and request dispatch for multi-tenant front ends:
//! the current origin is mapped to a tenant slug, the slug is resolved to
//! a tenant identifier through a coalescing cache, and every outbound call
//! is composed with tenant and bearer headers before reaching the transport.
//!
//! Credentials issued under one tenant are never sent to another: a session
//! association mismatch purges the credential set before any header is
//! attached. Authorization failures purge credentials and yield a
//! [`RedirectIntent`](tenant_dispatch_sdk::RedirectIntent) for the caller.
//!
//! The runtime seams (current location, persistent storage, transport,
//! tenant lookup) are traits from [`tenant_dispatch_sdk`]; [`infra`] holds
//! the default adapters.

pub mod config;
pub mod domain;
pub mod infra;

pub use config::{DispatchConfig, EntryPointsConfig, TransportConfig};
pub use domain::{
    BaseEndpointResolver, CredentialStore, Dispatcher, DispatcherBuilder, FailureRecoveryHandler,
    HostContextResolver, TenantIdCache,
};
pub use infra::{
    FileKeyValueStore, HttpTenantLookup, HyperTransport, InMemoryKeyValueStore,
    SwappableHostContext,
};
