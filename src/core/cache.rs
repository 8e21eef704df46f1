use crate::domain::model::AmenityCandidate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_millis(3_600_000);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub candidates: Vec<AmenityCandidate>,
    pub inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

/// Process-lifetime memo of amenity lookups.
///
/// Shared by `Arc` between discovery instances and runs. Expired entries
/// are dropped lazily by [`GeoCache::evict_expired`] and are never returned
/// by [`GeoCache::get`].
#[derive(Debug)]
pub struct GeoCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl GeoCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// `round(lat,4)_round(lon,4)_radius_category`
    pub fn key(lat: f64, lon: f64, radius_m: u32, category: &str) -> String {
        format!("{:.4}_{:.4}_{}_{}", lat, lon, radius_m, category)
    }

    pub fn get(&self, key: &str) -> Option<Vec<AmenityCandidate>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl, Instant::now()))
            .map(|entry| entry.candidates.clone())
    }

    pub fn put(&self, key: String, candidates: Vec<AmenityCandidate>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.clone(),
            CacheEntry {
                key,
                candidates,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Removes every entry older than the TTL and returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.ttl, now));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} expired geo cache entries", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GeoCache {
    fn default() -> Self {
        Self::new()
    }
}
