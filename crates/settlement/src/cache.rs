//! In-process status cache
//!
//! Fronts payment-status reads so a UI polling every couple of seconds does
//! not hammer the database. Both escape hatches of the status endpoint
//! (`bypass_cache`, `force_check`) skip this layer entirely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::payment::PaymentStatus;

/// TTL cache keyed by payment reference.
#[derive(Clone)]
pub struct StatusCache {
    inner: Arc<RwLock<HashMap<String, (PaymentStatus, Instant)>>>,
    ttl: Duration,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn get(&self, reference: &str) -> Option<PaymentStatus> {
        let cache = self.inner.read().await;
        let (status, stored_at) = cache.get(reference)?;
        if stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(*status)
    }

    pub async fn put(&self, reference: &str, status: PaymentStatus) {
        let mut cache = self.inner.write().await;
        cache.insert(reference.to_string(), (status, Instant::now()));

        // Keep the map from growing without bound under long uptimes.
        if cache.len() > 4096 {
            let ttl = self.ttl;
            cache.retain(|_, (_, stored_at)| stored_at.elapsed() <= ttl);
        }
    }
}
