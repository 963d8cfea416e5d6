//! Candidate generation: an adaptive-radius geographic filter followed by
//! six hard-constraint checks.
//!
//! The geographic phase widens the scan radius in stages when nothing is
//! found, and skips straight to the maximum radius for orders close to
//! their SLA deadline. The constraint phase runs every check per rider so
//! rejections carry the full list of failed constraints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{CandidateConfig, FatigueConfig};
use crate::geo::{travel_time_minutes, within_radius, DEFAULT_SPEED_KMH, DEFAULT_TRAFFIC_FACTOR};
use crate::model::{Order, OrderId, Rider, RiderId, VehicleRequirement, Capability, MINUTE_MS};

/// Fixed per-delivery service minutes assumed by the shift-end check.
const DELIVERY_SERVICE_MINUTES: u32 = 3;

/// Minimum minutes a feasible trip must leave before shift end.
const SHIFT_END_BUFFER_MINUTES: u32 = 5;

/// Identifiers for the six hard-constraint checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintViolation {
    CapacityExceeded,
    VehicleIncompatible,
    ShiftEndTime,
    FatigueLimitExceeded,
    SlaInfeasible,
    RiderOfflineOrUnavailable,
}

/// Why an order produced no candidates at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateFailure {
    NoRidersInServiceRadius,
    AllRidersFailedConstraints,
}

/// Per-order candidate result. `rejected` keeps the failed-check list per
/// rider for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSet {
    pub order_id: OrderId,
    pub candidate_rider_ids: Vec<RiderId>,
    pub failure_reason: Option<CandidateFailure>,
    pub rejected: Vec<(RiderId, Vec<ConstraintViolation>)>,
}

pub struct CandidateGenerator {
    candidates: CandidateConfig,
    fatigue: FatigueConfig,
}

impl CandidateGenerator {
    pub fn new(candidates: CandidateConfig, fatigue: FatigueConfig) -> Self {
        Self { candidates, fatigue }
    }

    /// Generate candidate riders for one pending order.
    pub fn generate(
        &self,
        order: &Order,
        riders: &HashMap<RiderId, Rider>,
        now_ms: i64,
    ) -> CandidateSet {
        let in_radius = self.geographic_filter(order, riders, now_ms);
        if in_radius.is_empty() {
            return CandidateSet {
                order_id: order.id.clone(),
                candidate_rider_ids: Vec::new(),
                failure_reason: Some(CandidateFailure::NoRidersInServiceRadius),
                rejected: Vec::new(),
            };
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for rider_id in in_radius {
            let Some(rider) = riders.get(&rider_id) else {
                continue;
            };
            let violations = self.check_constraints(order, rider, now_ms);
            if violations.is_empty() {
                accepted.push(rider_id);
            } else {
                rejected.push((rider_id, violations));
            }
        }

        let failure_reason = if accepted.is_empty() {
            Some(CandidateFailure::AllRidersFailedConstraints)
        } else {
            None
        };
        CandidateSet {
            order_id: order.id.clone(),
            candidate_rider_ids: accepted,
            failure_reason,
            rejected,
        }
    }

    /// Staged radius scan around the pickup. SLA-urgent orders go straight
    /// to the maximum radius.
    fn geographic_filter(
        &self,
        order: &Order,
        riders: &HashMap<RiderId, Rider>,
        now_ms: i64,
    ) -> Vec<RiderId> {
        let locations: HashMap<String, crate::geo::Location> = riders
            .iter()
            .map(|(id, rider)| (id.clone(), rider.location))
            .collect();

        let urgent = order.sla_minutes_remaining(now_ms)
            < self.candidates.radius_expansion_minutes_threshold;
        let radii: &[f64] = if urgent {
            &[self.candidates.max_radius_km]
        } else {
            &[
                self.candidates.initial_radius_km,
                self.candidates.expanded_radius_km,
                self.candidates.max_radius_km,
            ]
        };

        for radius_km in radii {
            let found = within_radius(&locations, order.pickup.location, *radius_km);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Run all six checks, accumulating every failure.
    fn check_constraints(
        &self,
        order: &Order,
        rider: &Rider,
        now_ms: i64,
    ) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        if rider.remaining_weight_kg() < order.payload.weight_kg
            || rider.remaining_volume_liters() < order.payload.volume_liters
            || rider.remaining_items() < order.payload.item_count
        {
            violations.push(ConstraintViolation::CapacityExceeded);
        }

        if !vehicle_compatible(order, rider) {
            violations.push(ConstraintViolation::VehicleIncompatible);
        }

        if !self.fits_shift(order, rider, now_ms) {
            violations.push(ConstraintViolation::ShiftEndTime);
        }

        if rider.shift.continuous_driving_minutes >= self.fatigue.max_continuous_driving_minutes
            || rider.shift.total_shift_driving_minutes >= self.fatigue.max_shift_driving_minutes
        {
            violations.push(ConstraintViolation::FatigueLimitExceeded);
        }

        if !sla_reachable(order, rider, now_ms) {
            violations.push(ConstraintViolation::SlaInfeasible);
        }

        if !rider.is_available() {
            violations.push(ConstraintViolation::RiderOfflineOrUnavailable);
        }

        violations
    }

    /// Estimated round trip (approach + pickup wait + delivery leg +
    /// service) must leave the shift-end buffer intact.
    fn fits_shift(&self, order: &Order, rider: &Rider, now_ms: i64) -> bool {
        let approach = travel_time_minutes(
            rider.location,
            order.pickup.location,
            DEFAULT_SPEED_KMH,
            DEFAULT_TRAFFIC_FACTOR,
        );
        let delivery_leg = travel_time_minutes(
            order.pickup.location,
            order.delivery.location,
            DEFAULT_SPEED_KMH,
            DEFAULT_TRAFFIC_FACTOR,
        );
        let trip_minutes = approach
            + order.pickup.estimated_wait_minutes
            + delivery_leg
            + DELIVERY_SERVICE_MINUTES;
        let done_ms = now_ms + (trip_minutes + SHIFT_END_BUFFER_MINUTES) as i64 * MINUTE_MS;
        done_ms <= rider.shift.end_ms
    }
}

fn vehicle_compatible(order: &Order, rider: &Rider) -> bool {
    let vehicle_ok = match order.payload.vehicle_requirement {
        VehicleRequirement::Any => true,
        VehicleRequirement::Bike => rider.vehicle.vehicle_type == crate::model::VehicleType::Bike,
        VehicleRequirement::Car => rider.vehicle.vehicle_type == crate::model::VehicleType::Car,
        VehicleRequirement::Van => rider.vehicle.vehicle_type == crate::model::VehicleType::Van,
        VehicleRequirement::Refrigerated => {
            rider.vehicle.capabilities.contains(&Capability::ColdChain)
        }
    };
    let fragile_ok =
        !order.payload.fragile || rider.vehicle.capabilities.contains(&Capability::Fragile);
    let cold_ok = !order.payload.requires_cold_chain
        || rider.vehicle.capabilities.contains(&Capability::ColdChain);
    vehicle_ok && fragile_ok && cold_ok
}

/// Optimistic minimum trip (free flow, 25 km/h) must land before the
/// deadline.
fn sla_reachable(order: &Order, rider: &Rider, now_ms: i64) -> bool {
    let approach = travel_time_minutes(
        rider.location,
        order.pickup.location,
        DEFAULT_SPEED_KMH,
        1.0,
    );
    let delivery_leg = travel_time_minutes(
        order.pickup.location,
        order.delivery.location,
        DEFAULT_SPEED_KMH,
        1.0,
    );
    now_ms + (approach + delivery_leg) as i64 * MINUTE_MS <= order.sla_deadline_ms
}
