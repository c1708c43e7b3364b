//! Default adapters for the runtime seams.

pub mod location;
pub mod lookup;
pub mod storage;
pub mod transport;

pub use location::SwappableHostContext;
pub use lookup::HttpTenantLookup;
pub use storage::{FileKeyValueStore, InMemoryKeyValueStore};
pub use transport::HyperTransport;
