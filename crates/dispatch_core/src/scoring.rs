//! Multi-objective assignment scoring.
//!
//! The cost of pairing an order with a rider is a weighted sum of six
//! factors. Five are normalized to [0, 1]; affinity is a signed reward in
//! [-1, 0]. Lower cost is better. The score for a pair is:
//!
//! ```text
//! cost = w1*time + w2*sla_risk + w3*distance + w4*batch_disruption
//!      + w5*workload + w6*affinity
//! ```
//!
//! Time uses the ETA model for unloaded riders and an insertion-cost proxy
//! for riders that already carry a route, which couples scoring to the
//! batch optimizer.

use crate::config::ScoringWeights;
use crate::eta::EtaModel;
use crate::geo::haversine_km;
use crate::model::{zone_key, CostBreakdown, Order, Rider, MINUTE_MS};

/// Fixed minute penalty standing in for the paired delivery detour when a
/// pickup is inserted into an existing route.
const INSERTION_DELIVERY_PENALTY_MINUTES: f64 = 10.0;

/// Normalizer for the two-leg ETA of an unloaded rider (minutes).
const UNLOADED_TIME_SCALE: f64 = 120.0;

/// Normalizer for the insertion cost of a loaded rider.
const INSERTION_TIME_SCALE: f64 = 60.0;

/// Normalizer for the approach distance factor (km).
const DISTANCE_SCALE_KM: f64 = 20.0;

/// Workload knee: below this combined load score the factor is zero.
const WORKLOAD_KNEE: f64 = 0.7;

pub struct Scorer<'a> {
    weights: ScoringWeights,
    sigmoid_scale: f64,
    eta: &'a EtaModel,
}

impl<'a> Scorer<'a> {
    pub fn new(weights: ScoringWeights, sigmoid_scale: f64, eta: &'a EtaModel) -> Self {
        Self {
            weights,
            sigmoid_scale,
            eta,
        }
    }

    /// Score one (order, rider) pair at the frozen cycle instant.
    pub fn score(&self, order: &Order, rider: &Rider, now_ms: i64) -> CostBreakdown {
        let time_cost = self.time_factor(order, rider, now_ms);
        let sla_risk_cost = self.sla_risk_factor(order, rider, now_ms);
        let distance_cost =
            (haversine_km(rider.location, order.pickup.location) / DISTANCE_SCALE_KM).min(1.0);
        let batch_disruption_cost = batch_disruption_factor(rider);
        let workload_cost = workload_factor(rider);
        let affinity_cost = affinity_factor(order, rider);

        let w = &self.weights;
        let total = w.time * time_cost
            + w.sla_risk * sla_risk_cost
            + w.distance * distance_cost
            + w.batch_disruption * batch_disruption_cost
            + w.workload * workload_cost
            + w.affinity * affinity_cost;

        CostBreakdown {
            time_cost,
            sla_risk_cost,
            distance_cost,
            batch_disruption_cost,
            workload_cost,
            affinity_cost,
            total,
        }
    }

    /// Unloaded riders: two-leg ETA over 120 minutes. Loaded riders: the
    /// cheapest pickup insertion over 60.
    fn time_factor(&self, order: &Order, rider: &Rider, now_ms: i64) -> f64 {
        if rider.current_assignments.is_empty() {
            let approach = self.eta.estimate(
                rider.location,
                order.pickup.location,
                now_ms,
                Some(&rider.id),
                None,
            );
            let delivery = self.eta.estimate(
                order.pickup.location,
                order.delivery.location,
                now_ms,
                Some(&rider.id),
                None,
            );
            let minutes = (approach.estimated_duration_minutes
                + delivery.estimated_duration_minutes) as f64;
            (minutes / UNLOADED_TIME_SCALE).min(1.0)
        } else {
            (insertion_cost(rider, order) / INSERTION_TIME_SCALE).min(1.0)
        }
    }

    /// Sigmoid of negative slack: slack 0 scores 0.5, large positive slack
    /// approaches 0, breached deadlines approach 1.
    fn sla_risk_factor(&self, order: &Order, rider: &Rider, now_ms: i64) -> f64 {
        let eta = self.eta.estimate(
            rider.location,
            order.delivery.location,
            now_ms,
            Some(&rider.id),
            None,
        );
        let slack_minutes = (order.sla_deadline_ms - now_ms) as f64 / MINUTE_MS as f64
            - eta.estimated_duration_minutes as f64;
        let risk = 1.0 / (1.0 + (slack_minutes / self.sigmoid_scale).exp());
        risk.clamp(0.0, 1.0)
    }
}

/// Cheapest insertion of the order's pickup into the rider's current
/// route: the triangle detour at the best position plus a fixed penalty
/// for the paired delivery. Riders with an empty route pay the direct
/// approach distance plus the penalty.
pub fn insertion_cost(rider: &Rider, order: &Order) -> f64 {
    let pickup = order.pickup.location;
    let route = &rider.current_route;
    if route.is_empty() {
        return haversine_km(rider.location, pickup) + INSERTION_DELIVERY_PENALTY_MINUTES;
    }

    let mut best = f64::INFINITY;
    for insert_pos in 0..route.len() {
        let prev = if insert_pos == 0 {
            rider.location
        } else {
            route[insert_pos - 1].location
        };
        let next = route[insert_pos].location;
        let detour =
            haversine_km(prev, pickup) + haversine_km(pickup, next) - haversine_km(prev, next);
        if detour < best {
            best = detour;
        }
    }
    best + INSERTION_DELIVERY_PENALTY_MINUTES
}

/// 0.2 per already-assigned order, capped at 1.0. Riders without a route
/// cost nothing to disturb.
fn batch_disruption_factor(rider: &Rider) -> f64 {
    if rider.current_route.is_empty() {
        return 0.0;
    }
    (0.2 * rider.current_assignments.len() as f64).min(1.0)
}

/// Combined load score with a knee at 0.7: below it the factor is 0, above
/// it ramps linearly to 1 at full load.
fn workload_factor(rider: &Rider) -> f64 {
    let weight_share = if rider.vehicle.max_weight_kg > 0.0 {
        rider.load.weight_kg / rider.vehicle.max_weight_kg
    } else {
        0.0
    };
    let item_share = if rider.vehicle.max_items > 0 {
        rider.load.item_count as f64 / rider.vehicle.max_items as f64
    } else {
        0.0
    };
    let load_score = 0.7 * weight_share + 0.3 * item_share;
    if load_score < WORKLOAD_KNEE {
        0.0
    } else {
        ((load_score - WORKLOAD_KNEE) / (1.0 - WORKLOAD_KNEE)).min(1.0)
    }
}

/// Signed reward in [-1, 0] combining zone familiarity at the delivery
/// end, historical success rate, and the learned speed multiplier.
fn affinity_factor(order: &Order, rider: &Rider) -> f64 {
    let zone = zone_key(order.delivery.location);
    let familiarity = rider
        .performance
        .zone_familiarity
        .get(&zone)
        .copied()
        .unwrap_or(0.0);
    let affinity = 0.5 * familiarity
        + 0.3 * rider.performance.avg_delivery_success_rate
        + 0.2 * (rider.performance.avg_speed_multiplier - 0.9).max(0.0);
    -affinity.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EtaConfig;
    use crate::geo::Location;
    use crate::model::{RouteStop, StopKind};
    use crate::test_helpers::{test_order, test_rider};

    fn eta() -> EtaModel {
        EtaModel::new(EtaConfig::default(), Some(42))
    }

    fn scorer(eta: &EtaModel) -> Scorer<'_> {
        Scorer::new(ScoringWeights::default(), 10.0, eta)
    }

    #[test]
    fn cost_stays_in_documented_bounds() {
        let eta = eta();
        let scorer = scorer(&eta);
        let order = test_order("o1", 0);
        let rider = test_rider("r1", Location::new(12.972, 77.591));

        let breakdown = scorer.score(&order, &rider, 0);
        assert!(breakdown.total >= -0.03 && breakdown.total <= 1.03);
        for factor in [
            breakdown.time_cost,
            breakdown.sla_risk_cost,
            breakdown.distance_cost,
            breakdown.batch_disruption_cost,
            breakdown.workload_cost,
        ] {
            assert!((0.0..=1.0).contains(&factor), "factor {factor} out of range");
        }
        assert!((-1.0..=0.0).contains(&breakdown.affinity_cost));
    }

    #[test]
    fn sla_risk_is_half_at_zero_slack() {
        let eta = eta();
        let scorer = scorer(&eta);
        let mut order = test_order("o1", 0);
        let rider = test_rider("r1", order.delivery.location);

        // Rider standing on the delivery point: ETA 0, so slack equals the
        // deadline distance. Deadline exactly now gives slack 0.
        order.sla_deadline_ms = 0;
        let breakdown = scorer.score(&order, &rider, 0);
        assert!((breakdown.sla_risk_cost - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sla_risk_saturates_in_both_directions() {
        let eta = eta();
        let scorer = scorer(&eta);
        let mut order = test_order("o1", 0);
        let rider = test_rider("r1", order.delivery.location);

        order.sla_deadline_ms = 10_000 * MINUTE_MS;
        let relaxed = scorer.score(&order, &rider, 0);
        assert!(relaxed.sla_risk_cost < 1e-6);

        order.sla_deadline_ms = -10_000 * MINUTE_MS;
        let breached = scorer.score(&order, &rider, 0);
        assert!(breached.sla_risk_cost > 1.0 - 1e-6);
    }

    #[test]
    fn closer_rider_scores_cheaper() {
        let eta = eta();
        let scorer = scorer(&eta);
        let order = test_order("o1", 0);
        let near = test_rider("near", Location::new(12.972, 77.591));
        let far = test_rider("far", Location::new(13.05, 77.75));

        let near_cost = scorer.score(&order, &near, 0).total;
        let far_cost = scorer.score(&order, &far, 0).total;
        assert!(near_cost < far_cost);
    }

    #[test]
    fn loaded_rider_uses_insertion_cost_path() {
        let eta = eta();
        let scorer = scorer(&eta);
        let order = test_order("o1", 0);
        let mut rider = test_rider("r1", Location::new(12.972, 77.591));
        rider.current_assignments.push("other".to_string());
        rider.current_route = vec![
            RouteStop {
                kind: StopKind::Pickup,
                order_id: "other".to_string(),
                location: Location::new(12.98, 77.60),
                sequence_index: 0,
                estimated_arrival_ms: None,
                estimated_departure_ms: None,
            },
            RouteStop {
                kind: StopKind::Delivery,
                order_id: "other".to_string(),
                location: Location::new(12.99, 77.61),
                sequence_index: 1,
                estimated_arrival_ms: None,
                estimated_departure_ms: None,
            },
        ];

        let breakdown = scorer.score(&order, &rider, 0);
        // Insertion path: detour is sub-km here, so the factor is dominated
        // by the fixed 10-minute delivery penalty over the 60-minute scale.
        assert!(breakdown.time_cost >= 10.0 / 60.0 - 1e-9);
        assert!(breakdown.batch_disruption_cost > 0.0);
    }

    #[test]
    fn insertion_cost_picks_cheapest_position() {
        let order = test_order("o1", 0);
        let mut rider = test_rider("r1", Location::new(12.9716, 77.5946));
        rider.current_route = vec![
            RouteStop {
                kind: StopKind::Pickup,
                order_id: "a".to_string(),
                // Essentially on top of the new pickup.
                location: order.pickup.location,
                sequence_index: 0,
                estimated_arrival_ms: None,
                estimated_departure_ms: None,
            },
            RouteStop {
                kind: StopKind::Delivery,
                order_id: "a".to_string(),
                location: Location::new(13.1, 77.8),
                sequence_index: 1,
                estimated_arrival_ms: None,
                estimated_departure_ms: None,
            },
        ];

        let cost = insertion_cost(&rider, &order);
        // Best position detours via a coincident point: detour ~0, leaving
        // just the fixed penalty.
        assert!((cost - INSERTION_DELIVERY_PENALTY_MINUTES).abs() < 0.5);
    }

    #[test]
    fn workload_kicks_in_above_the_knee() {
        let eta = eta();
        let scorer = scorer(&eta);
        let order = test_order("o1", 0);

        let mut light = test_rider("light", Location::new(12.972, 77.591));
        light.load.weight_kg = 0.1 * light.vehicle.max_weight_kg;
        assert_eq!(scorer.score(&order, &light, 0).workload_cost, 0.0);

        let mut heavy = test_rider("heavy", Location::new(12.972, 77.591));
        heavy.load.weight_kg = heavy.vehicle.max_weight_kg;
        heavy.load.item_count = heavy.vehicle.max_items;
        let cost = scorer.score(&order, &heavy, 0).workload_cost;
        assert!((cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn familiar_zone_earns_a_reward() {
        let eta = eta();
        let scorer = scorer(&eta);
        let order = test_order("o1", 0);

        let stranger = test_rider("stranger", Location::new(12.972, 77.591));
        let mut local = test_rider("local", Location::new(12.972, 77.591));
        local
            .performance
            .zone_familiarity
            .insert(zone_key(order.delivery.location), 1.0);

        let stranger_affinity = scorer.score(&order, &stranger, 0).affinity_cost;
        let local_affinity = scorer.score(&order, &local, 0).affinity_cost;
        assert!(local_affinity < stranger_affinity);
    }
}
