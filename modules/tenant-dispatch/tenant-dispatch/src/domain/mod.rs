//! Domain layer for tenant dispatch.

pub mod credentials;
pub mod dispatcher;
pub mod endpoint;
pub mod host;
pub mod recovery;
pub mod tenant_cache;

pub use credentials::{CredentialStore, SESSION_TENANT_KEY};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use endpoint::BaseEndpointResolver;
pub use host::HostContextResolver;
pub use recovery::FailureRecoveryHandler;
pub use tenant_cache::TenantIdCache;
