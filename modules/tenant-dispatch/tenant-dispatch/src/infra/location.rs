//! Host context that the embedding runtime updates on navigation.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tenant_dispatch_sdk::HostContextProvider;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    origin: String,
    path: String,
}

/// [`HostContextProvider`] whose location can be replaced at any time.
///
/// Reads are lock-free; a navigation is visible to the next dispatch.
#[derive(Debug)]
pub struct SwappableHostContext {
    current: ArcSwap<Location>,
}

impl SwappableHostContext {
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            current: ArcSwap::from_pointee(Location {
                origin: origin.into(),
                path: "/".to_owned(),
            }),
        }
    }

    /// Replace origin and path.
    pub fn navigate(&self, origin: impl Into<String>, path: impl Into<String>) {
        let next = Location {
            origin: origin.into(),
            path: normalize_path(path.into()),
        };
        debug!(origin = %next.origin, path = %next.path, "Host context changed");
        self.current.store(Arc::new(next));
    }

    /// Replace the path, keeping the origin.
    pub fn set_path(&self, path: impl Into<String>) {
        let path = normalize_path(path.into());
        self.current.rcu(|current| Location {
            origin: current.origin.clone(),
            path: path.clone(),
        });
    }
}

impl HostContextProvider for SwappableHostContext {
    fn origin(&self) -> String {
        self.current.load().origin.clone()
    }

    fn path(&self) -> String {
        self.current.load().path.clone()
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn starts_at_root_path() {
        let ctx = SwappableHostContext::new("https://acme.example.com");
        assert_eq!(ctx.origin(), "https://acme.example.com");
        assert_eq!(ctx.path(), "/");
    }

    #[test]
    fn navigation_replaces_location() {
        let ctx = SwappableHostContext::new("https://acme.example.com");
        ctx.navigate("https://beta.example.com", "host/events");
        assert_eq!(ctx.origin(), "https://beta.example.com");
        assert_eq!(ctx.path(), "/host/events");

        ctx.set_path("/staff");
        assert_eq!(ctx.origin(), "https://beta.example.com");
        assert_eq!(ctx.path(), "/staff");
    }
}
