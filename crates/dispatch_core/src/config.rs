//! Engine configuration: one immutable value built through a staged
//! builder that validates cross-field invariants.
//!
//! Construction is the only fatal failure point in the crate. A config
//! that builds is guaranteed internally consistent; everything downstream
//! treats it as read-only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::VehicleType;

/// Cycle-level knobs. `cycle_interval_seconds` documents the caller's
/// cadence; the engine itself never sleeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    pub cycle_interval_seconds: u32,
    pub max_orders_per_cycle: usize,
    pub max_riders_per_assignment: usize,
    pub optimizer_timeout_seconds: f64,
    /// Problem sizes (orders x riders) up to this run the exact solver.
    pub hungarian_threshold: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cycle_interval_seconds: 30,
            max_orders_per_cycle: 500,
            max_riders_per_assignment: 200,
            optimizer_timeout_seconds: 1.5,
            hungarian_threshold: 10_000,
        }
    }
}

/// The six scoring weights. Must sum to 1.0 within +/-0.01 at build time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub time: f64,
    pub sla_risk: f64,
    pub distance: f64,
    pub batch_disruption: f64,
    pub workload: f64,
    pub affinity: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.time + self.sla_risk + self.distance + self.batch_disruption + self.workload
            + self.affinity
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            time: 0.30,
            sla_risk: 0.25,
            distance: 0.15,
            batch_disruption: 0.12,
            workload: 0.15,
            affinity: 0.03,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub initial_radius_km: f64,
    pub expanded_radius_km: f64,
    pub max_radius_km: f64,
    /// Orders with less SLA slack than this skip straight to the max radius.
    pub radius_expansion_minutes_threshold: f64,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            initial_radius_km: 5.0,
            expanded_radius_km: 10.0,
            max_radius_km: 20.0,
            radius_expansion_minutes_threshold: 20.0,
        }
    }
}

/// Per-vehicle batch caps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchSizes {
    pub bike: u32,
    pub car: u32,
    pub van: u32,
}

impl BatchSizes {
    pub fn for_vehicle(&self, vehicle: VehicleType) -> u32 {
        match vehicle {
            VehicleType::Bike => self.bike,
            VehicleType::Car => self.car,
            VehicleType::Van => self.van,
        }
    }

    pub fn bumped(&self, increment: u32) -> Self {
        Self {
            bike: self.bike + increment,
            car: self.car + increment,
            van: self.van + increment,
        }
    }
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            bike: 3,
            car: 5,
            van: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    pub max_batch_size: BatchSizes,
    pub max_batch_duration_minutes: u32,
    pub two_opt_iteration_limit: u32,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: BatchSizes::default(),
            max_batch_duration_minutes: 90,
            two_opt_iteration_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignmentConfig {
    pub max_reassignment_attempts: u32,
    pub suppression_radius_meters: f64,
    pub trigger_eta_spike_minutes: f64,
    pub trigger_high_priority_sla_cutoff_minutes: f64,
}

impl Default for ReassignmentConfig {
    fn default() -> Self {
        Self {
            max_reassignment_attempts: 3,
            suppression_radius_meters: 500.0,
            trigger_eta_spike_minutes: 15.0,
            trigger_high_priority_sla_cutoff_minutes: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeConfig {
    pub soft_surge_ratio: f64,
    pub hard_surge_ratio: f64,
    pub crisis_ratio: f64,
    pub preposition_lookback_minutes: u32,
    pub batch_size_increment: u32,
    pub radius_expansion_factor: f64,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            soft_surge_ratio: 1.2,
            hard_surge_ratio: 1.6,
            crisis_ratio: 2.0,
            preposition_lookback_minutes: 30,
            batch_size_increment: 1,
            radius_expansion_factor: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtaConfig {
    pub traffic_api_refresh_seconds: u32,
    /// Cron expression for offline retraining of rider models. Carried for
    /// the external scheduler; the engine only does online EWMA updates.
    pub rider_model_retrain_cron: String,
    /// Service minutes per building type key.
    pub service_time_defaults: HashMap<String, u32>,
    pub eta_cache_minutes: u32,
}

impl Default for EtaConfig {
    fn default() -> Self {
        let mut service_time_defaults = HashMap::new();
        service_time_defaults.insert("restaurant_pickup".to_string(), 7);
        service_time_defaults.insert("dark_store_pickup".to_string(), 4);
        service_time_defaults.insert("apartment_delivery".to_string(), 5);
        service_time_defaults.insert("ground_floor_delivery".to_string(), 2);
        service_time_defaults.insert("house_delivery".to_string(), 3);
        service_time_defaults.insert("commercial_delivery".to_string(), 6);
        Self {
            traffic_api_refresh_seconds: 300,
            rider_model_retrain_cron: "0 3 * * *".to_string(),
            service_time_defaults,
            eta_cache_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatigueConfig {
    pub max_continuous_driving_minutes: u32,
    pub mandatory_break_minutes: u32,
    pub max_shift_driving_minutes: u32,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            max_continuous_driving_minutes: 120,
            mandatory_break_minutes: 15,
            max_shift_driving_minutes: 480,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaConfig {
    pub near_breach_threshold_minutes: f64,
    pub breach_escalation_alert_threshold_pct: f64,
    /// Sigmoid scale for SLA risk; steeper scale = sharper penalty.
    pub sla_risk_sigmoid_scale: f64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            near_breach_threshold_minutes: 10.0,
            breach_escalation_alert_threshold_pct: 5.0,
            sla_risk_sigmoid_scale: 10.0,
        }
    }
}

/// The full engine configuration. Immutable once built; surge modifiers
/// operate on per-cycle copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub cycle: CycleConfig,
    pub weights: ScoringWeights,
    pub candidates: CandidateConfig,
    pub batching: BatchingConfig,
    pub reassignment: ReassignmentConfig,
    pub surge: SurgeConfig,
    pub eta: EtaConfig,
    pub fatigue: FatigueConfig,
    pub sla: SlaConfig,
    /// Seed for the ETA model's RNG. `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl DispatchConfig {
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::default()
    }
}

/// Validation failures surfaced by [DispatchConfigBuilder::build].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Scoring weights must sum to 1.0 within +/-0.01.
    WeightSumInvalid { sum: f64 },
    /// Surge ratios must satisfy soft < hard < crisis.
    RatiosNotIncreasing,
    /// Candidate radii must satisfy initial < expanded < max.
    RadiiNotIncreasing,
    /// The named numeric field must be non-negative.
    NegativeValue { field: &'static str },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::WeightSumInvalid { sum } => {
                write!(f, "scoring weights sum to {sum}, expected 1.0 +/- 0.01")
            }
            ConfigError::RatiosNotIncreasing => {
                write!(f, "surge ratios must be strictly increasing")
            }
            ConfigError::RadiiNotIncreasing => {
                write!(f, "candidate radii must be strictly increasing")
            }
            ConfigError::NegativeValue { field } => {
                write!(f, "{field} must be non-negative")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Staged accumulator for [DispatchConfig]. Defaults match the reference
/// deployment; `build()` runs the invariant checks.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfigBuilder {
    cycle: CycleConfig,
    weights: ScoringWeights,
    candidates: CandidateConfig,
    batching: BatchingConfig,
    reassignment: ReassignmentConfig,
    surge: SurgeConfig,
    eta: EtaConfig,
    fatigue: FatigueConfig,
    sla: SlaConfig,
    rng_seed: Option<u64>,
}

impl DispatchConfigBuilder {
    pub fn with_cycle(mut self, cycle: CycleConfig) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_candidates(mut self, candidates: CandidateConfig) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_batching(mut self, batching: BatchingConfig) -> Self {
        self.batching = batching;
        self
    }

    pub fn with_reassignment(mut self, reassignment: ReassignmentConfig) -> Self {
        self.reassignment = reassignment;
        self
    }

    pub fn with_surge(mut self, surge: SurgeConfig) -> Self {
        self.surge = surge;
        self
    }

    pub fn with_eta(mut self, eta: EtaConfig) -> Self {
        self.eta = eta;
        self
    }

    pub fn with_fatigue(mut self, fatigue: FatigueConfig) -> Self {
        self.fatigue = fatigue;
        self
    }

    pub fn with_sla(mut self, sla: SlaConfig) -> Self {
        self.sla = sla;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<DispatchConfig, ConfigError> {
        let weight_sum = self.weights.sum();
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::WeightSumInvalid { sum: weight_sum });
        }

        if !(self.surge.soft_surge_ratio < self.surge.hard_surge_ratio
            && self.surge.hard_surge_ratio < self.surge.crisis_ratio)
        {
            return Err(ConfigError::RatiosNotIncreasing);
        }

        if !(self.candidates.initial_radius_km < self.candidates.expanded_radius_km
            && self.candidates.expanded_radius_km < self.candidates.max_radius_km)
        {
            return Err(ConfigError::RadiiNotIncreasing);
        }

        let non_negative: [(&'static str, f64); 14] = [
            ("optimizer_timeout_seconds", self.cycle.optimizer_timeout_seconds),
            ("w1_time", self.weights.time),
            ("w2_sla_risk", self.weights.sla_risk),
            ("w3_distance", self.weights.distance),
            ("w4_batch_disruption", self.weights.batch_disruption),
            ("w5_workload", self.weights.workload),
            ("w6_affinity", self.weights.affinity),
            ("initial_radius_km", self.candidates.initial_radius_km),
            (
                "radius_expansion_minutes_threshold",
                self.candidates.radius_expansion_minutes_threshold,
            ),
            ("suppression_radius_meters", self.reassignment.suppression_radius_meters),
            ("trigger_eta_spike_minutes", self.reassignment.trigger_eta_spike_minutes),
            ("soft_surge_ratio", self.surge.soft_surge_ratio),
            ("radius_expansion_factor", self.surge.radius_expansion_factor),
            ("sla_risk_sigmoid_scale", self.sla.sla_risk_sigmoid_scale),
        ];
        for (field, value) in non_negative {
            if value < 0.0 {
                return Err(ConfigError::NegativeValue { field });
            }
        }

        Ok(DispatchConfig {
            cycle: self.cycle,
            weights: self.weights,
            candidates: self.candidates,
            batching: self.batching,
            reassignment: self.reassignment,
            surge: self.surge,
            eta: self.eta,
            fatigue: self.fatigue,
            sla: self.sla,
            rng_seed: self.rng_seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builder_builds() {
        let config = DispatchConfig::builder().with_seed(7).build().expect("default config");
        assert!((config.weights.sum() - 1.0).abs() <= 0.01);
        assert_eq!(config.cycle.hungarian_threshold, 10_000);
        assert_eq!(config.eta.service_time_defaults["restaurant_pickup"], 7);
    }

    #[test]
    fn rejects_bad_weight_sum() {
        let weights = ScoringWeights {
            time: 0.5,
            sla_risk: 0.5,
            distance: 0.5,
            batch_disruption: 0.0,
            workload: 0.0,
            affinity: 0.0,
        };
        let err = DispatchConfig::builder().with_weights(weights).build().unwrap_err();
        assert!(matches!(err, ConfigError::WeightSumInvalid { .. }));
    }

    #[test]
    fn accepts_weight_sum_within_tolerance() {
        let weights = ScoringWeights {
            time: 0.31,
            sla_risk: 0.25,
            distance: 0.15,
            batch_disruption: 0.12,
            workload: 0.15,
            affinity: 0.03,
        };
        assert!(DispatchConfig::builder().with_weights(weights).build().is_ok());
    }

    #[test]
    fn rejects_non_increasing_ratios() {
        let surge = SurgeConfig {
            soft_surge_ratio: 1.5,
            hard_surge_ratio: 1.5,
            ..SurgeConfig::default()
        };
        let err = DispatchConfig::builder().with_surge(surge).build().unwrap_err();
        assert_eq!(err, ConfigError::RatiosNotIncreasing);
    }

    #[test]
    fn rejects_non_increasing_radii() {
        let candidates = CandidateConfig {
            initial_radius_km: 10.0,
            expanded_radius_km: 10.0,
            ..CandidateConfig::default()
        };
        let err = DispatchConfig::builder().with_candidates(candidates).build().unwrap_err();
        assert_eq!(err, ConfigError::RadiiNotIncreasing);
    }

    #[test]
    fn rejects_negative_numeric() {
        let sla = SlaConfig {
            sla_risk_sigmoid_scale: -1.0,
            ..SlaConfig::default()
        };
        let err = DispatchConfig::builder().with_sla(sla).build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::NegativeValue {
                field: "sla_risk_sigmoid_scale"
            }
        );
    }

    #[test]
    fn batch_sizes_bump_per_vehicle() {
        let sizes = BatchSizes::default().bumped(2);
        assert_eq!(sizes.for_vehicle(VehicleType::Bike), 5);
        assert_eq!(sizes.for_vehicle(VehicleType::Van), 10);
    }
}
