//! Time-bounded memo of backend responses.
//!
//! Keyed by (normalized query fields + backend identity). A hit within
//! the TTL returns the exact stored payload and never touches the quota
//! ledger. Expiry is a hard boundary: expired entries are treated as
//! absent and evicted lazily by the cache itself. Two concurrent misses
//! for the same key may both fetch; the later `put` simply overwrites —
//! the payload is an idempotent derivation of the same query, so eventual
//! consistency is acceptable.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::query::{PlatformSelector, Query};
use crate::record::{RawListing, compute_hash};

/// Cached raw listing batches, shared across concurrently running chains.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, Arc<Vec<RawListing>>>,
}

impl ResponseCache {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Composite cache key for a query against one backend.
    ///
    /// Built from the normalized query fields so that cosmetic differences
    /// (case, extra whitespace) hit the same entry.
    pub fn key(query: &Query, backend: &str) -> String {
        let platform = match &query.platforms {
            PlatformSelector::All => "all",
            PlatformSelector::One(p) => p.as_str(),
        };
        let location = query
            .location
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        compute_hash(&format!(
            "{backend}|{}|{location}|{platform}|{}|{}",
            query.normalized_terms(),
            query.remote_only,
            query.max_results,
        ))
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Vec<RawListing>>> {
        self.inner.get(key).await
    }

    pub async fn put(&self, key: String, listings: Vec<RawListing>) {
        self.inner.insert(key, Arc::new(listings)).await;
    }
}
