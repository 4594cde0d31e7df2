use crate::rollout::{Clock, RandomSource};
use crate::storage::{Key, MemoryStore, Store, StoreError, save_typed};
use crate::types::{Color, ENDPOINT_KIND, Endpoint, Namespace, Urls};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub struct FixedDraw(pub f64);

impl RandomSource for FixedDraw {
    fn draw(&self) -> f64 {
        self.0
    }
}

/// Memory store that counts queries and can be told to fail them.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    queries: AtomicUsize,
    fail_queries: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn get(&self, key: &Key) -> Result<Option<Value>, StoreError> {
        self.inner.get(key).await
    }

    async fn save(&self, key: &Key, data: Value) -> Result<(), StoreError> {
        self.inner.save(key, data).await
    }

    async fn query(&self, namespace: &str, kind: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("store unavailable")));
        }
        self.inner.query(namespace, kind).await
    }
}

/// Stores an endpoint whose URLs are `https://<color>.<name>`.
pub async fn seed_endpoint(
    store: &dyn Store,
    namespace: &Namespace,
    name: &str,
    color: Color,
    duration: u64,
    updated_at: DateTime<Utc>,
) -> Endpoint {
    let endpoint = Endpoint {
        color,
        urls: Urls {
            blue: format!("https://blue.{name}"),
            green: format!("https://green.{name}"),
        },
        duration,
        updated_at,
    };
    let key = Key::new(namespace.as_str(), ENDPOINT_KIND, name);
    save_typed(store, &key, &endpoint).await.unwrap();
    endpoint
}
