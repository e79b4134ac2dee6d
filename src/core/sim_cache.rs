// Simulation memo store.
// Entries are keyed by the deterministic strings from `cache_key`, expire lazily by TTL
// and are evicted under entry-count or byte-budget pressure.
// Not synchronized: owners pass the cache around by `&mut`, one instance per thread.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::core::kernel::complex::ComplexMatrix;
use crate::core::kernel::engine::SimulationResult;
use crate::core::kernel::reduced::ReducedState;

pub const DEFAULT_MAX_ENTRIES: usize = 256;
pub const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Share of capacity dropped when the entry limit is hit.
const EVICT_FRACTION: f64 = 0.10;

/// Approximate heap footprint of a cached payload.
pub trait EstimateSize {
    fn estimated_bytes(&self) -> usize;
}

impl EstimateSize for ComplexMatrix {
    fn estimated_bytes(&self) -> usize {
        ComplexMatrix::estimated_bytes(self)
    }
}

impl EstimateSize for Vec<ReducedState> {
    fn estimated_bytes(&self) -> usize {
        self.iter().map(ReducedState::estimated_bytes).sum::<usize>() + std::mem::size_of::<Self>()
    }
}

impl EstimateSize for SimulationResult {
    fn estimated_bytes(&self) -> usize {
        SimulationResult::estimated_bytes(self)
    }
}

impl EstimateSize for String {
    fn estimated_bytes(&self) -> usize {
        self.len() + std::mem::size_of::<Self>()
    }
}

impl<T: EstimateSize> EstimateSize for Arc<T> {
    fn estimated_bytes(&self) -> usize {
        self.as_ref().estimated_bytes()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
    pub default_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
            default_ttl: Some(DEFAULT_TTL),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub created: Instant,
    pub ttl: Option<Duration>,
    pub hits: u64,
    pub size: usize,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(self.created) >= ttl,
            None => false,
        }
    }

    /// Hits per second of life; low scores are evicted first.
    fn score(&self, now: Instant) -> f64 {
        let age = now.duration_since(self.created).as_secs_f64().max(1e-3);
        self.hits as f64 / age
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
pub struct SimCache<V> {
    name: &'static str,
    config: CacheConfig,
    entries: HashMap<String, CacheEntry<V>>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V: Clone + EstimateSize> SimCache<V> {
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        Self {
            name,
            config,
            entries: HashMap::new(),
            total_bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.remove_entry(key);
            self.expirations += 1;
            self.misses += 1;
            debug!(cache = self.name, key, "expired on read");
            return None;
        }
        match self.entries.get_mut(key) {
            Some(e) => {
                e.hits += 1;
                self.hits += 1;
                Some(e.payload.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store `payload`; `ttl = None` falls back to the configured default.
    /// Returns false when the payload cannot be cached at all.
    pub fn set(&mut self, key: impl Into<String>, payload: V, ttl: Option<Duration>) -> bool {
        let key = key.into();
        let size = payload.estimated_bytes();
        if self.config.max_entries == 0 || size > self.config.max_bytes {
            debug!(cache = self.name, key = %key, size, "payload not cacheable");
            return false;
        }
        self.remove_entry(&key);

        if self.entries.len() >= self.config.max_entries {
            self.purge_expired();
        }
        if self.entries.len() >= self.config.max_entries {
            self.evict_by_score();
        }
        if self.total_bytes + size > self.config.max_bytes {
            self.evict_for_size(size);
        }

        let entry = CacheEntry {
            payload,
            created: Instant::now(),
            ttl: ttl.or(self.config.default_ttl),
            hits: 0,
            size,
        };
        self.total_bytes += size;
        self.entries.insert(key, entry);
        true
    }

    pub fn has(&mut self, key: &str) -> bool {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(e) if e.is_expired(now) => {
                self.remove_entry(key);
                self.expirations += 1;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            total_bytes: self.total_bytes,
            max_entries: self.config.max_entries,
            max_bytes: self.config.max_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
        }
    }

    /// Housekeeping pass dropping every expired entry. Returns how many went.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            self.remove_entry(k);
        }
        self.expirations += expired.len() as u64;
        expired.len()
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let e = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(e.size);
        Some(e)
    }

    fn evict_by_score(&mut self) {
        let now = Instant::now();
        let quota = ((self.config.max_entries as f64 * EVICT_FRACTION).ceil() as usize).max(1);
        let before = (self.entries.len(), self.total_bytes);
        let mut ranked: Vec<(String, f64, Instant)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.score(now), e.created))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)));
        for (k, _, _) in ranked.into_iter().take(quota) {
            self.remove_entry(&k);
            self.evictions += 1;
        }
        debug!(
            cache = self.name,
            "evicted by score: entries {}->{} bytes {}->{}",
            before.0,
            self.entries.len(),
            before.1,
            self.total_bytes
        );
    }

    fn evict_for_size(&mut self, incoming: usize) {
        let before = (self.entries.len(), self.total_bytes);
        let mut by_size: Vec<(String, usize)> =
            self.entries.iter().map(|(k, e)| (k.clone(), e.size)).collect();
        by_size.sort_by_key(|(_, size)| *size);
        for (k, _) in by_size {
            if self.total_bytes + incoming <= self.config.max_bytes {
                break;
            }
            self.remove_entry(&k);
            self.evictions += 1;
        }
        debug!(
            cache = self.name,
            "evicted by size: entries {}->{} bytes {}->{}",
            before.0,
            self.entries.len(),
            before.1,
            self.total_bytes
        );
    }
}

/// The three memo stores the engine uses, constructed once and passed by `&mut`.
#[derive(Debug)]
pub struct CacheService {
    pub results: SimCache<Arc<SimulationResult>>,
    pub gates: SimCache<ComplexMatrix>,
    pub visuals: SimCache<Arc<Vec<ReducedState>>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CacheServiceStats {
    pub results: CacheStats,
    pub gates: CacheStats,
    pub visuals: CacheStats,
}

impl CacheService {
    pub fn new(config: CacheConfig) -> Self {
        // gate matrices are tiny and never go stale
        let gate_config = CacheConfig { default_ttl: None, ..config.clone() };
        Self {
            results: SimCache::new("results", config.clone()),
            gates: SimCache::new("gates", gate_config),
            visuals: SimCache::new("visuals", config),
        }
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.gates.clear();
        self.visuals.clear();
    }

    pub fn purge_expired(&mut self) -> usize {
        self.results.purge_expired() + self.gates.purge_expired() + self.visuals.purge_expired()
    }

    pub fn stats(&self) -> CacheServiceStats {
        CacheServiceStats {
            results: self.results.stats(),
            gates: self.gates.stats(),
            visuals: self.visuals.stats(),
        }
    }
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
