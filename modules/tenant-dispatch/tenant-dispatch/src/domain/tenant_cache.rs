//! Memoized, coalescing slug to tenant identifier resolution.
//!
//! Successful lookups are memoized for the lifetime of the cache. Concurrent
//! callers asking for the same uncached slug share a single lookup. Failures
//! are never memoized, so the next call after a failure tries again.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tenant_dispatch_sdk::{LookupFailure, TenantId, TenantLookup, TenantSlug};
use tracing::{Instrument, debug, info, warn};

type PendingLookup = Shared<BoxFuture<'static, Option<TenantId>>>;

#[derive(Default)]
struct CacheState {
    resolved: HashMap<TenantSlug, TenantId>,
    in_flight: HashMap<TenantSlug, PendingLookup>,
    /// Bumped on every eviction; a lookup started under an older
    /// generation does not memoize its result.
    generations: HashMap<TenantSlug, u64>,
}

impl CacheState {
    fn generation(&self, slug: &TenantSlug) -> u64 {
        self.generations.get(slug).copied().unwrap_or_default()
    }
}

struct CacheInner {
    lookup: Arc<dyn TenantLookup>,
    state: Mutex<CacheState>,
}

/// Slug to [`TenantId`] cache shared by every dispatch.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone)]
pub struct TenantIdCache {
    inner: Arc<CacheInner>,
}

impl TenantIdCache {
    #[must_use]
    pub fn new(lookup: Arc<dyn TenantLookup>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                lookup,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Resolve `slug` to its tenant identifier.
    ///
    /// Returns `None` when the lookup fails for any reason; the failure is
    /// logged and not remembered.
    ///
    /// The lookup runs on its own task. A caller that stops polling does not
    /// cancel it, and the in-flight entry is removed once it settles.
    #[tracing::instrument(skip_all, fields(slug = %slug))]
    pub async fn resolve(&self, slug: &TenantSlug) -> Option<TenantId> {
        let pending = {
            let mut state = self.inner.state.lock();
            if let Some(id) = state.resolved.get(slug) {
                debug!(tenant_id = %id, "Tenant id cache hit");
                return Some(*id);
            }
            if let Some(pending) = state.in_flight.get(slug) {
                debug!("Joining in-flight tenant lookup");
                pending.clone()
            } else {
                let generation = state.generation(slug);
                let pending = self.start_lookup(slug.clone(), generation);
                state.in_flight.insert(slug.clone(), pending.clone());
                pending
            }
        };
        pending.await
    }

    fn start_lookup(&self, slug: TenantSlug, generation: u64) -> PendingLookup {
        let settle = Settle {
            inner: Arc::clone(&self.inner),
            slug,
            generation,
            outcome: None,
        };
        let task = tokio::spawn(settle.run().in_current_span());

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Tenant lookup task aborted");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Memoized identifier for `slug`, without triggering a lookup.
    #[must_use]
    pub fn cached(&self, slug: &TenantSlug) -> Option<TenantId> {
        self.inner.state.lock().resolved.get(slug).copied()
    }

    /// Forget the memoized identifier for `slug`.
    ///
    /// A lookup already in flight for `slug` still answers its callers but
    /// its result is not memoized.
    #[must_use]
    pub fn evict(&self, slug: &TenantSlug) -> Option<TenantId> {
        let mut state = self.inner.state.lock();
        *state.generations.entry(slug.clone()).or_default() += 1;
        let evicted = state.resolved.remove(slug);
        drop(state);
        if evicted.is_some() {
            debug!(slug = %slug, "Evicted tenant id");
        }
        evicted
    }

    /// Number of memoized identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().resolved.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lookups currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }
}

/// Owns one lookup. Dropping it records the outcome and clears the
/// in-flight entry, including on panic.
struct Settle {
    inner: Arc<CacheInner>,
    slug: TenantSlug,
    generation: u64,
    outcome: Option<TenantId>,
}

impl Settle {
    async fn run(mut self) -> Option<TenantId> {
        self.outcome = match self.inner.lookup.lookup(&self.slug).await {
            Ok(id) => {
                info!(tenant_id = %id, "Resolved tenant id");
                Some(id)
            }
            Err(failure) => {
                log_failure(&failure);
                None
            }
        };
        self.outcome
    }
}

impl Drop for Settle {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if let Some(id) = self.outcome {
            if state.generation(&self.slug) == self.generation {
                state.resolved.insert(self.slug.clone(), id);
            } else {
                debug!(slug = %self.slug, "Tenant id evicted during lookup, not memoizing");
            }
        }
        state.in_flight.remove(&self.slug);
    }
}

fn log_failure(failure: &LookupFailure) {
    if failure.is_not_found() {
        info!("Tenant slug is unknown to the backend, omitting tenant header");
    } else {
        warn!(error = %failure, "Tenant lookup failed, omitting tenant header");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use uuid::Uuid;

    use super::*;

    /// Lookup that blocks until released and counts calls.
    struct GatedLookup {
        calls: AtomicUsize,
        release: Notify,
        id: TenantId,
        fail: bool,
    }

    impl GatedLookup {
        fn new() -> Arc<Self> {
            Self::build(false)
        }

        fn failing() -> Arc<Self> {
            Self::build(true)
        }

        fn build(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                release: Notify::new(),
                id: Uuid::new_v4(),
                fail,
            })
        }
    }

    #[async_trait]
    impl TenantLookup for GatedLookup {
        async fn lookup(&self, _slug: &TenantSlug) -> Result<TenantId, LookupFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            if self.fail {
                Err(LookupFailure::Status(http::StatusCode::BAD_GATEWAY))
            } else {
                Ok(self.id)
            }
        }
    }

    fn spawn_callers(
        cache: &TenantIdCache,
        count: usize,
    ) -> Vec<tokio::task::JoinHandle<Option<TenantId>>> {
        (0..count)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve(&acme()).await })
            })
            .collect()
    }

    async fn release_when_joined(lookup: &GatedLookup) {
        wait_for_calls(lookup, 1).await;
        // let every caller reach the shared future before releasing
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        lookup.release.notify_one();
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyLookup {
        calls: AtomicUsize,
        failures: usize,
        id: TenantId,
    }

    #[async_trait]
    impl TenantLookup for FlakyLookup {
        async fn lookup(&self, _slug: &TenantSlug) -> Result<TenantId, LookupFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(LookupFailure::Unreachable("connection refused".to_owned()))
            } else {
                Ok(self.id)
            }
        }
    }

    struct PanickingLookup;

    #[async_trait]
    impl TenantLookup for PanickingLookup {
        async fn lookup(&self, _slug: &TenantSlug) -> Result<TenantId, LookupFailure> {
            panic!("lookup exploded");
        }
    }

    fn acme() -> TenantSlug {
        TenantSlug::parse("acme").unwrap()
    }

    async fn wait_for_calls(lookup: &GatedLookup, expected: usize) {
        while lookup.calls.load(Ordering::SeqCst) < expected {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_lookup() {
        let lookup = GatedLookup::new();
        let cache = TenantIdCache::new(lookup.clone());
        let slug = acme();

        let callers = spawn_callers(&cache, 5);
        release_when_joined(&lookup).await;

        for caller in callers {
            assert_eq!(caller.await.unwrap(), Some(lookup.id));
        }
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.cached(&slug), Some(lookup.id));
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_failure() {
        let lookup = GatedLookup::failing();
        let cache = TenantIdCache::new(lookup.clone());

        let callers = spawn_callers(&cache, 5);
        release_when_joined(&lookup).await;

        for caller in callers {
            assert_eq!(caller.await.unwrap(), None);
        }
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn memoized_slug_skips_lookup() {
        let lookup = Arc::new(FlakyLookup {
            calls: AtomicUsize::new(0),
            failures: 0,
            id: Uuid::new_v4(),
        });
        let cache = TenantIdCache::new(lookup.clone());

        assert_eq!(cache.resolve(&acme()).await, Some(lookup.id));
        assert_eq!(cache.resolve(&acme()).await, Some(lookup.id));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failure_is_not_memoized() {
        let lookup = Arc::new(FlakyLookup {
            calls: AtomicUsize::new(0),
            failures: 1,
            id: Uuid::new_v4(),
        });
        let cache = TenantIdCache::new(lookup.clone());

        assert_eq!(cache.resolve(&acme()).await, None);
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight(), 0);

        assert_eq!(cache.resolve(&acme()).await, Some(lookup.id));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn abandoned_caller_still_settles() {
        let lookup = GatedLookup::new();
        let cache = TenantIdCache::new(lookup.clone());

        let abandoned = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.resolve(&acme()).await })
        };
        wait_for_calls(&lookup, 1).await;
        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());

        assert_eq!(cache.in_flight(), 1);
        lookup.release.notify_one();
        while cache.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.cached(&acme()), Some(lookup.id));
    }

    #[tokio::test]
    async fn panicking_lookup_clears_in_flight_entry() {
        let cache = TenantIdCache::new(Arc::new(PanickingLookup));
        assert_eq!(cache.resolve(&acme()).await, None);
        assert_eq!(cache.in_flight(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn evict_forgets_identifier() {
        let lookup = Arc::new(FlakyLookup {
            calls: AtomicUsize::new(0),
            failures: 0,
            id: Uuid::new_v4(),
        });
        let cache = TenantIdCache::new(lookup.clone());

        assert!(cache.resolve(&acme()).await.is_some());
        assert_eq!(cache.evict(&acme()), Some(lookup.id));
        assert_eq!(cache.evict(&acme()), None);
        assert_eq!(cache.cached(&acme()), None);

        assert_eq!(cache.resolve(&acme()).await, Some(lookup.id));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn eviction_during_lookup_is_not_undone() {
        let lookup = GatedLookup::new();
        let cache = TenantIdCache::new(lookup.clone());

        let caller = spawn_callers(&cache, 1).remove(0);
        wait_for_calls(&lookup, 1).await;
        assert_eq!(cache.evict(&acme()), None);
        lookup.release.notify_one();

        assert_eq!(caller.await.unwrap(), Some(lookup.id));
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.cached(&acme()), None);
    }
}
