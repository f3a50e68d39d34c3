//! State shared by every heuristic running within one optimization run.
//!
//! Three pieces, each with its own synchronization:
//! - [`DistanceCache`]: memoized haversine distances behind an `RwLock`,
//!   keyed by the unordered coordinate pair. It outlives a run and stays warm
//!   while the coordinate set is unchanged.
//! - [`ConcurrencyLimiter`]: a counting semaphore bounding how many heuristic
//!   bodies execute at once.
//! - The claim ledger inside [`SharedRunState`]: delivery claim flags, the
//!   vehicle registry, best route per vehicle and live counters, all behind
//!   one `Mutex`. [`SharedRunState::claim`] is the only way a stop becomes
//!   delivered.

use crate::config::EngineConfig;
use crate::distance;
use crate::scenario::{DeliveryPoint, Vehicle};
use crate::solution::{Route, RunMetrics};
use chrono::Local;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};

type CoordKey = (u64, u64);
type PairKey = (CoordKey, CoordKey);

fn coord_key((lat, lon): (f64, f64)) -> CoordKey {
    // -0.0 and 0.0 describe the same place
    let normalize = |x: f64| if x == 0.0 { 0.0f64 } else { x };
    (normalize(lat).to_bits(), normalize(lon).to_bits())
}

/// Canonical key for an unordered pair: (a, b) and (b, a) map to the same entry
fn pair_key(a: (f64, f64), b: (f64, f64)) -> PairKey {
    let (ka, kb) = (coord_key(a), coord_key(b));
    if ka <= kb {
        (ka, kb)
    } else {
        (kb, ka)
    }
}

/// Hash of every coordinate a run can ask the cache about
pub fn coordinate_fingerprint(deliveries: &[DeliveryPoint], vehicles: &[Vehicle]) -> u64 {
    let mut keys: Vec<CoordKey> = deliveries
        .iter()
        .map(|d| coord_key(d.coordinates()))
        .chain(vehicles.iter().map(|v| coord_key(v.coordinates())))
        .collect();
    keys.sort_unstable();
    keys.dedup();

    let mut hasher = DefaultHasher::new();
    keys.hash(&mut hasher);
    hasher.finish()
}

/// Memoized symmetric distances.
///
/// Concurrent misses on the same key may both compute; the value is
/// deterministic so whichever insert lands last is equivalent.
#[derive(Debug, Default)]
pub struct DistanceCache {
    entries: RwLock<HashMap<PairKey, f64>>,
    fingerprint: Mutex<Option<u64>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl DistanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&self, a: (f64, f64), b: (f64, f64)) -> f64 {
        let key = pair_key(a, b);
        if let Some(&d) = self.entries.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return d;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let d = distance::distance(a.0, a.1, b.0, b.1);
        self.entries.write().unwrap_or_else(PoisonError::into_inner).insert(key, d);
        d
    }

    /// Keep entries if `fingerprint` matches the previous run, otherwise clear.
    /// Returns whether the cache was cleared.
    pub fn prepare(&self, fingerprint: u64) -> bool {
        let mut current = self.fingerprint.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == Some(fingerprint) {
            return false;
        }
        self.clear();
        *current = Some(fingerprint);
        true
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    active: usize,
    peak: usize,
}

/// Counting semaphore: at most `limit` permits out at once
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    limit: usize,
    state: Mutex<LimiterState>,
    released: Condvar,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        ConcurrencyLimiter {
            limit: limit.max(1),
            state: Mutex::new(LimiterState::default()),
            released: Condvar::new(),
        }
    }

    /// Block until a slot is free
    pub fn acquire(&self) -> Permit<'_> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.active >= self.limit {
            state = self.released.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.active += 1;
        state.peak = state.peak.max(state.active);
        Permit { limiter: self }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn active(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).active
    }

    /// Highest number of permits held simultaneously so far
    pub fn peak(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).peak
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.released.notify_one();
    }
}

/// Slot held while a heuristic body runs; released on drop
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct Permit<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[derive(Debug, Clone, Default)]
struct RunLedger {
    deliveries: HashMap<u32, DeliveryPoint>,
    vehicles: HashMap<u32, Vehicle>,
    best_routes: HashMap<u32, Route>,
    claims_won: usize,
    claims_contended: usize,
}

impl RunLedger {
    fn populate(deliveries: &[DeliveryPoint], vehicles: &[Vehicle]) -> Self {
        let deliveries = deliveries
            .iter()
            .map(|d| {
                let mut d = d.clone();
                d.reset();
                (d.id, d)
            })
            .collect();
        let vehicles = vehicles
            .iter()
            .map(|v| {
                let mut v = v.clone();
                v.assigned_deliveries.clear();
                v.current_load = 0.0;
                (v.id, v)
            })
            .collect();

        RunLedger {
            deliveries,
            vehicles,
            ..Default::default()
        }
    }

    /// Same claims and registry, fresh best routes and counters
    fn snapshot(&self) -> Self {
        RunLedger {
            deliveries: self.deliveries.clone(),
            vehicles: self.vehicles.clone(),
            ..Default::default()
        }
    }
}

/// Coordinator for one optimization run
#[derive(Debug)]
pub struct SharedRunState {
    config: Arc<EngineConfig>,
    cache: Arc<DistanceCache>,
    limiter: Arc<ConcurrencyLimiter>,
    ledger: Mutex<RunLedger>,
}

impl SharedRunState {
    /// Empty state; call [`SharedRunState::reset`] before use
    pub fn new(config: Arc<EngineConfig>, cache: Arc<DistanceCache>, max_workers: usize) -> Self {
        SharedRunState {
            config,
            cache,
            limiter: Arc::new(ConcurrencyLimiter::new(max_workers)),
            ledger: Mutex::new(RunLedger::default()),
        }
    }

    /// Register every delivery as unclaimed and every vehicle as empty.
    ///
    /// The distance cache is cleared only when the coordinate set differs from
    /// the one it was last prepared for.
    pub fn reset(&self, deliveries: &[DeliveryPoint], vehicles: &[Vehicle]) {
        let cleared = self.cache.prepare(coordinate_fingerprint(deliveries, vehicles));
        log::debug!(
            "run state reset: {} deliveries, {} vehicles, distance cache {}",
            deliveries.len(),
            vehicles.len(),
            if cleared { "cleared" } else { "kept warm" }
        );
        *self.lock() = RunLedger::populate(deliveries, vehicles);
    }

    /// Independent ledger copy sharing cache and limiter, for speculative construction
    pub fn speculative_fork(&self) -> SharedRunState {
        SharedRunState {
            config: Arc::clone(&self.config),
            cache: Arc::clone(&self.cache),
            limiter: Arc::clone(&self.limiter),
            ledger: Mutex::new(self.lock().snapshot()),
        }
    }

    /// Independent ledger copy with its own limiter
    pub fn branch(&self, max_workers: usize) -> SharedRunState {
        SharedRunState {
            config: Arc::clone(&self.config),
            cache: Arc::clone(&self.cache),
            limiter: Arc::new(ConcurrencyLimiter::new(max_workers)),
            ledger: Mutex::new(self.lock().snapshot()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunLedger> {
        // every critical section leaves the ledger consistent, so a poisoned lock is still usable
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &DistanceCache {
        &self.cache
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn distance(&self, from: (f64, f64), to: (f64, f64)) -> f64 {
        self.cache.get_or_compute(from, to)
    }

    /// Registered and not yet claimed
    pub fn is_claimable(&self, delivery_id: u32) -> bool {
        self.lock()
            .deliveries
            .get(&delivery_id)
            .map(|d| !d.is_delivered)
            .unwrap_or(false)
    }

    /// Drop every candidate that is unknown or already claimed, under one lock
    pub fn retain_claimable(&self, candidates: &mut Vec<DeliveryPoint>) {
        let ledger = self.lock();
        candidates.retain(|c| ledger.deliveries.get(&c.id).map(|d| !d.is_delivered).unwrap_or(false));
    }

    /// Atomically claim a stop. Returns the stamped delivery if this caller won.
    pub fn claim(&self, delivery_id: u32) -> Option<DeliveryPoint> {
        let mut ledger = self.lock();
        let claimed = match ledger.deliveries.get_mut(&delivery_id) {
            Some(d) if !d.is_delivered => {
                d.is_delivered = true;
                d.delivered_at = Some(Local::now());
                Some(d.clone())
            }
            _ => None,
        };

        if claimed.is_some() {
            ledger.claims_won += 1;
        } else {
            ledger.claims_contended += 1;
            log::trace!("claim on delivery {} lost", delivery_id);
        }
        claimed
    }

    pub fn try_claim(&self, delivery_id: u32) -> bool {
        self.claim(delivery_id).is_some()
    }

    /// Claim every stop of a route built elsewhere; returns how many were won
    pub fn commit(&self, route: &Route) -> usize {
        let won = route.deliveries.iter().filter(|d| self.try_claim(d.id)).count();
        self.record_route(route);
        won
    }

    /// Update the vehicle registry and keep the route if it is the best seen for its vehicle.
    ///
    /// A non-empty route beats an empty one; among non-empty routes the shorter wins.
    pub fn record_route(&self, route: &Route) {
        let mut ledger = self.lock();
        if let Some(vehicle) = ledger.vehicles.get_mut(&route.vehicle_id) {
            vehicle.assigned_deliveries = route.delivery_ids();
            vehicle.current_load = route.deliveries.iter().map(|d| d.package_weight).sum();
        }

        let replace = match ledger.best_routes.get(&route.vehicle_id) {
            None => true,
            Some(best) if best.is_empty() => !route.is_empty(),
            Some(best) => !route.is_empty() && route.total_distance < best.total_distance,
        };
        if replace {
            ledger.best_routes.insert(route.vehicle_id, route.clone());
        }
    }

    pub fn best_route(&self, vehicle_id: u32) -> Option<Route> {
        self.lock().best_routes.get(&vehicle_id).cloned()
    }

    pub fn delivery(&self, delivery_id: u32) -> Option<DeliveryPoint> {
        self.lock().deliveries.get(&delivery_id).cloned()
    }

    pub fn vehicle(&self, vehicle_id: u32) -> Option<Vehicle> {
        self.lock().vehicles.get(&vehicle_id).cloned()
    }

    pub fn claimed_count(&self) -> usize {
        self.lock().deliveries.values().filter(|d| d.is_delivered).count()
    }

    pub fn registered_deliveries(&self) -> usize {
        self.lock().deliveries.len()
    }

    pub fn metrics(&self) -> RunMetrics {
        let ledger = self.lock();
        RunMetrics {
            claims_won: ledger.claims_won,
            claims_contended: ledger.claims_contended,
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            peak_workers: self.limiter.peak(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn state_with(deliveries: &[DeliveryPoint], workers: usize) -> SharedRunState {
        let state = SharedRunState::new(
            Arc::new(EngineConfig::default()),
            Arc::new(DistanceCache::new()),
            workers,
        );
        state.reset(deliveries, &[Vehicle::new(1, 0.0, 0.0, 10)]);
        state
    }

    #[test]
    fn test_cache_key_is_unordered() {
        let cache = DistanceCache::new();
        let a = (18.48, -69.93);
        let b = (18.52, -69.88);
        let ab = cache.get_or_compute(a, b);
        let ba = cache.get_or_compute(b, a);
        assert_eq!(ab, ba);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);

        cache.get_or_compute((0.0, 0.0), (-0.0, 1.0));
        cache.get_or_compute((-0.0, 1.0), (0.0, -0.0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_kept_warm_for_same_coordinates() {
        let deliveries = vec![DeliveryPoint::new(1, 0.1, 0.1), DeliveryPoint::new(2, 0.2, 0.2)];
        let state = state_with(&deliveries, 1);
        state.distance((0.1, 0.1), (0.2, 0.2));
        assert_eq!(state.cache().len(), 1);

        state.reset(&deliveries, &[Vehicle::new(1, 0.0, 0.0, 10)]);
        assert_eq!(state.cache().len(), 1);

        let moved = vec![DeliveryPoint::new(1, 0.1, 0.1), DeliveryPoint::new(2, 0.3, 0.2)];
        state.reset(&moved, &[Vehicle::new(1, 0.0, 0.0, 10)]);
        assert!(state.cache().is_empty());
    }

    #[test]
    fn test_claim_once() {
        let state = state_with(&[DeliveryPoint::new(7, 0.1, 0.1)], 1);
        assert!(state.is_claimable(7));
        let claimed = state.claim(7).unwrap();
        assert!(claimed.is_delivered);
        assert!(claimed.delivered_at.is_some());
        assert!(!state.try_claim(7));
        assert!(!state.try_claim(99));
        assert!(!state.is_claimable(7));

        let metrics = state.metrics();
        assert_eq!(metrics.claims_won, 1);
        assert_eq!(metrics.claims_contended, 2);
    }

    #[test]
    fn test_reset_clears_claims() {
        let deliveries = vec![DeliveryPoint::new(1, 0.1, 0.1), DeliveryPoint::new(2, 0.2, 0.2)];
        let state = state_with(&deliveries, 1);
        assert!(state.try_claim(1));
        assert_eq!(state.claimed_count(), 1);

        state.reset(&deliveries, &[]);
        assert_eq!(state.claimed_count(), 0);
        assert!(state.try_claim(1));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let deliveries: Vec<DeliveryPoint> =
            (0..200).map(|i| DeliveryPoint::new(i, 0.0, i as f64 * 0.001)).collect();
        let state = state_with(&deliveries, 8);

        let wins: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| (0..200).filter(|&id| state.try_claim(id)).count()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(wins, 200);
        assert_eq!(state.claimed_count(), 200);
        assert_eq!(state.metrics().claims_won, 200);
    }

    #[test]
    fn test_limiter_bounds_concurrency() {
        let limiter = ConcurrencyLimiter::new(3);
        thread::scope(|s| {
            for _ in 0..12 {
                s.spawn(|| {
                    let _permit = limiter.acquire();
                    assert!(limiter.active() <= 3);
                    thread::sleep(Duration::from_millis(5));
                });
            }
        });
        assert!(limiter.peak() <= 3);
        assert!(limiter.peak() >= 1);
        assert_eq!(limiter.active(), 0);
    }

    #[test]
    fn test_speculative_fork_does_not_touch_parent() {
        let deliveries = vec![DeliveryPoint::new(1, 0.1, 0.1)];
        let state = state_with(&deliveries, 2);
        let fork = state.speculative_fork();
        assert!(fork.try_claim(1));
        assert!(state.is_claimable(1));
        assert_eq!(fork.limiter().limit(), state.limiter().limit());
    }

    #[test]
    fn test_best_route_registry() {
        let config = EngineConfig::default();
        let state = state_with(&[DeliveryPoint::new(1, 0.1, 0.1)], 1);
        let vehicle = Vehicle::new(1, 0.0, 0.0, 10);
        let stop = vec![DeliveryPoint::new(1, 0.1, 0.1)];

        state.record_route(&Route::empty(1, "empty"));
        state.record_route(&Route::from_sequence(&vehicle, stop.clone(), 20.0, "long", &config));
        state.record_route(&Route::from_sequence(&vehicle, stop.clone(), 10.0, "short", &config));
        state.record_route(&Route::from_sequence(&vehicle, stop, 15.0, "middle", &config));
        state.record_route(&Route::empty(1, "empty"));

        assert_eq!(state.best_route(1).unwrap().heuristic, "short");
        assert_eq!(state.vehicle(1).unwrap().assigned_deliveries, Vec::<u32>::new());
    }
}
