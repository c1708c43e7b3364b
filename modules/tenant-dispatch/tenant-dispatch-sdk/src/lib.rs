//! Tenant Dispatch SDK
//!
//! This crate provides the public contract of the `tenant-dispatch` module:
//!
//! - [`TenantSlug`], [`TenantId`], [`Role`], [`AuthToken`] - Domain models
//! - [`RequestDescriptor`], [`PreparedRequest`], [`DispatchResponse`] - Request/response shapes
//! - [`RedirectIntent`], [`EntryPoint`], [`SessionState`] - Recovery and session models
//! - [`HostContextProvider`], [`KeyValueStore`], [`Transport`], [`TenantLookup`] - Injected seams
//! - [`DispatchError`] and friends - Error types
//!
//! ## Usage
//!
//! Runtimes embed the dispatcher by supplying the four seams:
//!
//! ```ignore
//! use tenant_dispatch_sdk::{HostContextProvider, KeyValueStore, Transport};
//!
//! struct BrowserLocation;
//!
//! impl HostContextProvider for BrowserLocation {
//!     fn origin(&self) -> String {
//!         current_window_origin()
//!     }
//! }
//! ```

pub mod api;
pub mod error;
pub mod models;

// Re-export main types at crate root
pub use api::{HostContextProvider, KeyValueStore, TenantLookup, Transport};
pub use error::{DispatchError, LookupFailure, StorageError, TransportError};
pub use models::{
    AuthToken, DispatchResponse, EntryPoint, InvalidSlug, PreparedRequest, RedirectIntent,
    RequestDescriptor, Role, SessionState, TenantId, TenantSlug,
};
