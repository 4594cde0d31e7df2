use crate::metrics_defs::{
    DIRECTORY_CACHE_HIT, DIRECTORY_CACHE_MISS, DIRECTORY_CACHED_NAMESPACES, DIRECTORY_ENDPOINTS,
    DIRECTORY_REFRESH_DURATION,
};
use crate::rollout::{Clock, RandomSource, directory_entry};
use crate::storage::{Store, StoreError, query_typed};
use crate::types::{Directory, ENDPOINT_KIND, Endpoint, Namespace};
use chrono::Duration;
use parking_lot::RwLock;
use shared::{counter, gauge, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Caches the resolved directory of each namespace for `ttl`.
///
/// The lock only guards the map. It is never held across the storage query,
/// so simultaneous misses may both rebuild the same namespace and the last
/// one to finish wins. Each rebuild is a read of the store, so either result
/// is valid.
#[derive(Clone)]
pub struct DirectoryCache {
    inner: Arc<DirectoryCacheInner>,
}

struct DirectoryCacheInner {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    ttl: Duration,
    directories: RwLock<HashMap<Namespace, Directory>>,
}

impl DirectoryCache {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        ttl: std::time::Duration,
    ) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
        DirectoryCache {
            inner: Arc::new(DirectoryCacheInner {
                store,
                clock,
                random,
                ttl,
                directories: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Returns the cached directory of `namespace`, rebuilding it if it is
    /// missing or at least `ttl` old. Storage errors are returned as is; a
    /// stale directory is never served in their place.
    pub async fn get(&self, namespace: &Namespace) -> Result<Directory, StoreError> {
        if let Some(directory) = self.fresh(namespace) {
            counter!(DIRECTORY_CACHE_HIT).increment(1);
            return Ok(directory);
        }

        counter!(DIRECTORY_CACHE_MISS).increment(1);
        self.refresh(namespace).await
    }

    fn fresh(&self, namespace: &Namespace) -> Option<Directory> {
        let now = self.inner.clock.now();
        let directories = self.inner.directories.read();
        directories
            .get(namespace)
            .filter(|d| now.signed_duration_since(d.last_updated) < self.inner.ttl)
            .cloned()
    }

    async fn refresh(&self, namespace: &Namespace) -> Result<Directory, StoreError> {
        let started = Instant::now();
        let endpoints: Vec<(String, Endpoint)> =
            query_typed(self.inner.store.as_ref(), namespace.as_str(), ENDPOINT_KIND).await?;

        // One "now" for the whole batch so every entry is computed at the same instant.
        let now = self.inner.clock.now();
        let entries = endpoints
            .into_iter()
            .map(|(name, endpoint)| {
                let entry = directory_entry(&endpoint, now, self.inner.random.as_ref());
                (name, entry)
            })
            .collect::<HashMap<_, _>>();

        let directory = Directory {
            entries,
            last_updated: now,
        };

        histogram!(DIRECTORY_REFRESH_DURATION).record(started.elapsed().as_secs_f64());
        histogram!(DIRECTORY_ENDPOINTS).record(directory.entries.len() as f64);
        tracing::debug!(
            %namespace,
            endpoints = directory.entries.len(),
            "rebuilt directory"
        );

        let cached = {
            let mut directories = self.inner.directories.write();
            directories.insert(namespace.clone(), directory.clone());
            directories.len()
        };
        gauge!(DIRECTORY_CACHED_NAMESPACES).set(cached as f64);
        Ok(directory)
    }
}
