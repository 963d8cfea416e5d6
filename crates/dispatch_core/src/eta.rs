//! ETA model: per-(origin, destination, minute) travel estimates with a
//! time-of-day traffic multiplier, online per-rider speed models, and a
//! bounded result cache.
//!
//! The model is pure CPU over in-memory data. A real traffic provider can
//! be wired in front of it; when absent (the default here), estimates
//! degrade to distance + traffic-profile arithmetic, surfaced as lower
//! confidence. Estimates never fail: degenerate inputs produce a
//! well-formed estimate (equal endpoints yield 0 travel plus service time).

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::Timelike;
use lru::LruCache;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::EtaConfig;
use crate::geo::{travel_time_minutes, Location};
use crate::model::{RiderId, MINUTE_MS};

/// Cache capacity in entries. Entries also age out after
/// `eta_cache_minutes`, so this is a memory bound, not a freshness bound.
const CACHE_ENTRIES: usize = 4096;

/// EWMA smoothing factor for per-rider speed model updates.
const SPEED_EWMA_ALPHA: f64 = 0.1;

/// Free-flow reference speed for the base travel time (km/h).
const BASE_SPEED_KMH: f64 = 25.0;

/// One travel estimate and the factors that produced it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EtaEstimate {
    pub estimated_duration_minutes: u32,
    /// Reported in [0.75, 0.95]; opaque to the engine.
    pub confidence: f64,
    pub base_time_minutes: u32,
    pub traffic_multiplier: f64,
    pub rider_speed_multiplier: f64,
    pub service_time_minutes: u32,
}

/// One leg of a chained route estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteLeg {
    pub from: Location,
    pub to: Location,
    pub departure_ms: i64,
    pub estimate: EtaEstimate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEtaEstimate {
    pub total_duration_minutes: u32,
    pub legs: Vec<RouteLeg>,
}

/// Online speed model for one rider. Created lazily on first use and kept
/// for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderEtaModel {
    pub rider_id: RiderId,
    pub speed_multiplier: f64,
    pub familiar_zones: HashSet<String>,
    pub training_datapoints: u64,
    pub last_updated_ms: i64,
}

/// Cache and model sizes for telemetry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EtaCacheStats {
    pub cached_estimates: usize,
    pub rider_models: usize,
}

/// Cache key: endpoints rounded to 4 decimal degrees plus the departure
/// minute. Two requests in the same minute from the same corner share an
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    origin_lat_e4: i64,
    origin_lng_e4: i64,
    dest_lat_e4: i64,
    dest_lng_e4: i64,
    departure_minute: i64,
}

impl CacheKey {
    fn new(origin: Location, destination: Location, departure_ms: i64) -> Self {
        Self {
            origin_lat_e4: round_e4(origin.lat),
            origin_lng_e4: round_e4(origin.lng),
            dest_lat_e4: round_e4(destination.lat),
            dest_lng_e4: round_e4(destination.lng),
            departure_minute: departure_ms.div_euclid(MINUTE_MS),
        }
    }
}

fn round_e4(degrees: f64) -> i64 {
    (degrees * 10_000.0).round() as i64
}

struct CachedEta {
    estimate: EtaEstimate,
    inserted_at_ms: i64,
}

/// The ETA model. Interior mutability lets scoring fan out over a shared
/// reference while the cache, RNG, and rider models stay engine-owned.
pub struct EtaModel {
    config: EtaConfig,
    cache: Mutex<LruCache<CacheKey, CachedEta>>,
    rider_models: Mutex<HashMap<RiderId, RiderEtaModel>>,
    rng: Mutex<StdRng>,
}

impl EtaModel {
    pub fn new(config: EtaConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let capacity = NonZeroUsize::new(CACHE_ENTRIES).expect("cache size must be non-zero");
        Self {
            config,
            cache: Mutex::new(LruCache::new(capacity)),
            rider_models: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Estimate travel from `origin` to `destination` departing at
    /// `departure_ms`. `rider_id` applies that rider's learned speed
    /// multiplier; `building_type` adds the configured service minutes.
    pub fn estimate(
        &self,
        origin: Location,
        destination: Location,
        departure_ms: i64,
        rider_id: Option<&str>,
        building_type: Option<&str>,
    ) -> EtaEstimate {
        let key = CacheKey::new(origin, destination, departure_ms);
        let max_age_ms = self.config.eta_cache_minutes as i64 * MINUTE_MS;

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                if departure_ms - cached.inserted_at_ms < max_age_ms {
                    return cached.estimate;
                }
                cache.pop(&key);
            }
        }

        let base_time_minutes = travel_time_minutes(origin, destination, BASE_SPEED_KMH, 1.0);
        let traffic_multiplier = traffic_multiplier_for(departure_ms);
        let rider_speed_multiplier = match rider_id {
            Some(id) => self.multiplier_for(id, departure_ms),
            None => 1.0,
        };
        let service_time_minutes = building_type
            .and_then(|kind| self.config.service_time_defaults.get(kind).copied())
            .unwrap_or(0);

        let travel = (base_time_minutes as f64 * traffic_multiplier * rider_speed_multiplier)
            .round() as u32;
        let confidence = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0.75..=0.95),
            Err(_) => 0.75,
        };

        let estimate = EtaEstimate {
            estimated_duration_minutes: travel + service_time_minutes,
            confidence,
            base_time_minutes,
            traffic_multiplier,
            rider_speed_multiplier,
            service_time_minutes,
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                key,
                CachedEta {
                    estimate,
                    inserted_at_ms: departure_ms,
                },
            );
        }
        estimate
    }

    /// Chain pairwise estimates along `locations`, advancing the departure
    /// clock by each leg's duration.
    pub fn estimate_route(
        &self,
        locations: &[Location],
        start_ms: i64,
        rider_id: Option<&str>,
    ) -> RouteEtaEstimate {
        let mut legs = Vec::new();
        let mut departure_ms = start_ms;
        let mut total = 0u32;

        for pair in locations.windows(2) {
            let estimate = self.estimate(pair[0], pair[1], departure_ms, rider_id, None);
            total += estimate.estimated_duration_minutes;
            legs.push(RouteLeg {
                from: pair[0],
                to: pair[1],
                departure_ms,
                estimate,
            });
            departure_ms += estimate.estimated_duration_minutes as i64 * MINUTE_MS;
        }

        RouteEtaEstimate {
            total_duration_minutes: total,
            legs,
        }
    }

    /// EWMA update from an observed delivery:
    /// `m <- 0.9 * m + 0.1 * (estimated / max(actual, 1))`.
    pub fn update_rider_model(
        &self,
        rider_id: &str,
        actual_duration_minutes: u32,
        estimated_duration_minutes: u32,
        zone: &str,
        now_ms: i64,
    ) {
        let Ok(mut models) = self.rider_models.lock() else {
            return;
        };
        let model = models.entry(rider_id.to_string()).or_insert_with(|| RiderEtaModel {
            rider_id: rider_id.to_string(),
            speed_multiplier: 1.0,
            familiar_zones: HashSet::new(),
            training_datapoints: 0,
            last_updated_ms: now_ms,
        });
        let observed = estimated_duration_minutes as f64 / actual_duration_minutes.max(1) as f64;
        model.speed_multiplier =
            (1.0 - SPEED_EWMA_ALPHA) * model.speed_multiplier + SPEED_EWMA_ALPHA * observed;
        model.familiar_zones.insert(zone.to_string());
        model.training_datapoints += 1;
        model.last_updated_ms = now_ms;
    }

    /// Snapshot of one rider's model, if it exists yet.
    pub fn rider_model(&self, rider_id: &str) -> Option<RiderEtaModel> {
        self.rider_models
            .lock()
            .ok()
            .and_then(|models| models.get(rider_id).cloned())
    }

    /// Sweep entries older than `eta_cache_minutes`.
    pub fn clear_expired_cache(&self, now_ms: i64) {
        let max_age_ms = self.config.eta_cache_minutes as i64 * MINUTE_MS;
        let Ok(mut cache) = self.cache.lock() else {
            return;
        };
        let expired: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, cached)| now_ms - cached.inserted_at_ms >= max_age_ms)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            cache.pop(&key);
        }
    }

    pub fn cache_stats(&self) -> EtaCacheStats {
        EtaCacheStats {
            cached_estimates: self.cache.lock().map(|c| c.len()).unwrap_or(0),
            rider_models: self.rider_models.lock().map(|m| m.len()).unwrap_or(0),
        }
    }

    /// The rider's current multiplier, lazily initialized in [0.8, 1.2].
    fn multiplier_for(&self, rider_id: &str, now_ms: i64) -> f64 {
        let Ok(mut models) = self.rider_models.lock() else {
            return 1.0;
        };
        if let Some(model) = models.get(rider_id) {
            return model.speed_multiplier;
        }
        let initial = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0.8..=1.2),
            Err(_) => 1.0,
        };
        models.insert(
            rider_id.to_string(),
            RiderEtaModel {
                rider_id: rider_id.to_string(),
                speed_multiplier: initial,
                familiar_zones: HashSet::new(),
                training_datapoints: 0,
                last_updated_ms: now_ms,
            },
        );
        initial
    }
}

/// Time-of-day traffic multiplier: rush windows 08-10 and 17-19 run at
/// 1.5x, the 22-06 night window at 1.1x, everything else free flow.
/// Hour of day is derived in UTC from the epoch instant; callers that
/// care about local time pass pre-offset instants.
pub fn traffic_multiplier_for(departure_ms: i64) -> f64 {
    let hour = chrono::DateTime::from_timestamp_millis(departure_ms)
        .map(|dt| dt.hour())
        .unwrap_or(12);
    match hour {
        8 | 9 | 17 | 18 => 1.5,
        h if h >= 22 || h < 6 => 1.1,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> EtaModel {
        EtaModel::new(EtaConfig::default(), Some(42))
    }

    fn noon_ms() -> i64 {
        // 1970-01-01 12:00 UTC.
        12 * 3600 * 1000
    }

    #[test]
    fn traffic_multiplier_by_hour() {
        let hour = |h: i64| h * 3600 * 1000;
        assert_eq!(traffic_multiplier_for(hour(8)), 1.5);
        assert_eq!(traffic_multiplier_for(hour(9)), 1.5);
        assert_eq!(traffic_multiplier_for(hour(17)), 1.5);
        assert_eq!(traffic_multiplier_for(hour(23)), 1.1);
        assert_eq!(traffic_multiplier_for(hour(3)), 1.1);
        assert_eq!(traffic_multiplier_for(hour(12)), 1.0);
        assert_eq!(traffic_multiplier_for(hour(10)), 1.0);
        assert_eq!(traffic_multiplier_for(hour(19)), 1.0);
    }

    #[test]
    fn equal_endpoints_yield_service_time_only() {
        let eta = model();
        let loc = Location::new(12.9716, 77.5946);
        let est = eta.estimate(loc, loc, noon_ms(), None, Some("apartment_delivery"));
        assert_eq!(est.base_time_minutes, 0);
        assert_eq!(est.service_time_minutes, 5);
        assert_eq!(est.estimated_duration_minutes, 5);
        assert!(est.confidence >= 0.75 && est.confidence <= 0.95);
    }

    #[test]
    fn unknown_building_type_adds_no_service_time() {
        let eta = model();
        let a = Location::new(12.9716, 77.5946);
        let b = Location::new(12.99, 77.62);
        let est = eta.estimate(a, b, noon_ms(), None, Some("spaceport"));
        assert_eq!(est.service_time_minutes, 0);
        assert!(est.estimated_duration_minutes > 0);
    }

    #[test]
    fn repeated_estimates_hit_the_cache() {
        let eta = model();
        let a = Location::new(12.9716, 77.5946);
        let b = Location::new(12.99, 77.62);
        let first = eta.estimate(a, b, noon_ms(), None, None);
        let second = eta.estimate(a, b, noon_ms() + 1_000, None, None);
        // Same minute bucket and endpoints: identical cached estimate,
        // including the sampled confidence.
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(
            first.estimated_duration_minutes,
            second.estimated_duration_minutes
        );
        assert_eq!(eta.cache_stats().cached_estimates, 1);
    }

    #[test]
    fn rider_multiplier_is_lazily_initialized_in_range() {
        let eta = model();
        let a = Location::new(12.9716, 77.5946);
        let b = Location::new(12.99, 77.62);
        let est = eta.estimate(a, b, noon_ms(), Some("r1"), None);
        assert!(est.rider_speed_multiplier >= 0.8 && est.rider_speed_multiplier <= 1.2);

        let again = eta.estimate(a, b, noon_ms() + 10 * MINUTE_MS, Some("r1"), None);
        assert_eq!(est.rider_speed_multiplier, again.rider_speed_multiplier);
        assert_eq!(eta.cache_stats().rider_models, 1);
    }

    #[test]
    fn ewma_update_moves_multiplier_toward_observation() {
        let eta = model();
        eta.update_rider_model("r1", 20, 30, "zone_25_155", noon_ms());
        let model = eta.rider_model("r1").expect("model created");
        // 0.9 * 1.0 + 0.1 * (30 / 20) = 1.05
        assert!((model.speed_multiplier - 1.05).abs() < 1e-9);
        assert!(model.familiar_zones.contains("zone_25_155"));
        assert_eq!(model.training_datapoints, 1);
    }

    #[test]
    fn ewma_update_clamps_actual_at_one_minute() {
        let eta = model();
        eta.update_rider_model("r1", 0, 10, "z", noon_ms());
        let model = eta.rider_model("r1").expect("model created");
        // actual clamps to 1: 0.9 + 0.1 * 10 = 1.9
        assert!((model.speed_multiplier - 1.9).abs() < 1e-9);
    }

    #[test]
    fn expired_entries_are_swept() {
        let eta = model();
        let a = Location::new(12.9716, 77.5946);
        let b = Location::new(12.99, 77.62);
        eta.estimate(a, b, noon_ms(), None, None);
        assert_eq!(eta.cache_stats().cached_estimates, 1);

        eta.clear_expired_cache(noon_ms() + 6 * MINUTE_MS);
        assert_eq!(eta.cache_stats().cached_estimates, 0);
    }

    #[test]
    fn route_estimate_chains_legs() {
        let eta = model();
        let stops = [
            Location::new(12.9716, 77.5946),
            Location::new(12.99, 77.62),
            Location::new(13.01, 77.64),
        ];
        let route = eta.estimate_route(&stops, noon_ms(), None);
        assert_eq!(route.legs.len(), 2);
        let leg_sum: u32 = route
            .legs
            .iter()
            .map(|leg| leg.estimate.estimated_duration_minutes)
            .sum();
        assert_eq!(route.total_duration_minutes, leg_sum);
        assert!(route.legs[1].departure_ms > route.legs[0].departure_ms);
    }
}
