use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use qsim_kernel::core::kernel::{Circuit, Engine, GateRegistry, InitialState, SimulationOptions};
use qsim_kernel::core::sim_cache::{CacheConfig, CacheService, SimCache};

#[test]
fn ttl_hit_then_miss() {
    let mut cache: SimCache<String> = SimCache::new("ttl", CacheConfig::default());
    cache.set("k", "payload".to_string(), Some(Duration::from_millis(10)));
    assert_eq!(cache.get("k").as_deref(), Some("payload"));
    sleep(Duration::from_millis(15));
    assert!(cache.get("k").is_none());
}

#[test]
fn overfilling_respects_entry_limit() {
    let config = CacheConfig { max_entries: 16, ..CacheConfig::default() };
    let mut cache: SimCache<String> = SimCache::new("fill", config);
    for i in 0..100 {
        cache.set(format!("key-{i}"), "v".repeat(i), None);
        assert!(cache.len() <= 16);
    }
    let stats = cache.stats();
    assert!(stats.evictions >= 84);
    assert!(cache.has("key-99"));
}

#[test]
fn engine_results_are_memoized_per_input() {
    let engine = Engine::new(GateRegistry::shared());
    let mut caches = CacheService::default();
    let opts = SimulationOptions::default();

    let a = engine.simulate_cached(&Circuit::bell(), None, &opts, &mut caches);
    let b = engine.simulate_cached(&Circuit::bell(), Some(&InitialState::Basis(1)), &opts, &mut caches);
    assert!(!Arc::ptr_eq(&a, &b));
    assert!((b.probabilities[1] - 0.5).abs() < 1e-9);
    assert!((b.probabilities[2] - 0.5).abs() < 1e-9);

    let again = engine.simulate_cached(&Circuit::bell(), None, &opts, &mut caches);
    assert!(Arc::ptr_eq(&a, &again));
    assert_eq!(caches.stats().results.hits, 1);
}

#[test]
fn failed_results_are_not_cached() {
    let engine = Engine::new(GateRegistry::shared());
    let mut caches = CacheService::default();
    let res = engine.simulate_cached(&Circuit::new(0), None, &SimulationOptions::default(), &mut caches);
    assert!(res.error.is_some());
    assert!(caches.results.is_empty());
}

#[test]
fn bypassing_the_cache() {
    let engine = Engine::new(GateRegistry::shared());
    let mut caches = CacheService::default();
    let opts = SimulationOptions { use_cache: false, ..SimulationOptions::default() };
    engine.simulate_cached(&Circuit::bell(), None, &opts, &mut caches);
    assert!(caches.results.is_empty());
    assert!(caches.gates.is_empty());
}

#[test]
fn per_call_ttl_overrides_default() {
    let engine = Engine::new(GateRegistry::shared());
    let mut caches = CacheService::default();
    let opts = SimulationOptions { ttl: Some(Duration::from_millis(10)), ..SimulationOptions::default() };
    engine.simulate_cached(&Circuit::bell(), None, &opts, &mut caches);
    assert_eq!(caches.results.len(), 1);
    sleep(Duration::from_millis(20));
    assert_eq!(caches.purge_expired(), 1);
    assert!(caches.results.is_empty());
}
