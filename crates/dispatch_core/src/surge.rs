//! Surge handling: demand/supply classification, per-cycle config
//! modifiers, order holds, and preposition target selection.
//!
//! Surge state is recomputed from scratch at the start of every cycle and
//! carries no memory. The recommended-action tokens are stable opaque
//! strings interpreted by external tooling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{DispatchConfig, SurgeConfig};
use crate::geo::{haversine_km, Location};
use crate::model::{Order, OrderId, OrderStatus, Priority, Rider, RiderId, RiderStatus, MINUTE_MS};

/// Normal-priority orders with more slack than this are held back during
/// hard surge.
const HOLD_HORIZON_MINUTES: i64 = 30;

/// Side length of the preposition clustering buckets, in degrees.
const PREPOSITION_BUCKET_DEGREES: f64 = 0.5;

const SOFT_SURGE_ACTIONS: &[&str] = &[
    "increase_batch_sizes_by_1",
    "expand_candidate_radius_50pct",
    "reduce_fairness_weight",
];

const HARD_SURGE_ACTIONS: &[&str] = &[
    "enable_preposioning",
    "hold_sla_orders",
    "increase_batch_sizes",
    "expand_search_radius",
];

const CRISIS_ACTIONS: &[&str] = &[
    "escalate_sla_windows",
    "notify_customers",
    "activate_emergency_protocol",
    "request_additional_supply",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurgeLevel {
    Normal,
    SoftSurge,
    HardSurge,
    Crisis,
}

/// Snapshot of demand pressure at the start of a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeState {
    pub level: SurgeLevel,
    pub demand_supply_ratio: f64,
    pub pending_order_count: usize,
    pub available_capacity: usize,
    pub recommended_actions: Vec<String>,
}

/// An idle rider pointed at a demand cluster centroid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepositionTarget {
    pub location: Location,
    pub rider_id: RiderId,
}

pub struct SurgeDetector {
    config: SurgeConfig,
}

impl SurgeDetector {
    pub fn new(config: SurgeConfig) -> Self {
        Self { config }
    }

    /// Classify pending demand against available batch capacity.
    ///
    /// Capacity is available riders times the largest `max_items` in the
    /// current rider population, so one well-equipped van raises the whole
    /// fleet's denominator.
    pub fn detect(&self, pending_order_count: usize, riders: &HashMap<RiderId, Rider>) -> SurgeState {
        let available_riders = riders.values().filter(|r| r.is_available()).count();
        let batch_capacity = riders
            .values()
            .map(|r| r.vehicle.max_items as usize)
            .max()
            .unwrap_or(0);
        let available_capacity = available_riders * batch_capacity;
        let ratio = pending_order_count as f64 / available_capacity.max(1) as f64;

        let level = if ratio < self.config.soft_surge_ratio {
            SurgeLevel::Normal
        } else if ratio < self.config.hard_surge_ratio {
            SurgeLevel::SoftSurge
        } else if ratio < self.config.crisis_ratio {
            SurgeLevel::HardSurge
        } else {
            SurgeLevel::Crisis
        };

        let recommended_actions = match level {
            SurgeLevel::Normal => &[][..],
            SurgeLevel::SoftSurge => SOFT_SURGE_ACTIONS,
            SurgeLevel::HardSurge => HARD_SURGE_ACTIONS,
            SurgeLevel::Crisis => CRISIS_ACTIONS,
        }
        .iter()
        .map(|s| s.to_string())
        .collect();

        SurgeState {
            level,
            demand_supply_ratio: ratio,
            pending_order_count,
            available_capacity,
            recommended_actions,
        }
    }
}

/// Soft-surge modifier: relax fairness, sharpen SLA pressure, widen the
/// search. Returns a per-cycle copy; the built config is never mutated.
pub fn apply_soft_surge(config: &DispatchConfig) -> DispatchConfig {
    let mut modified = config.clone();
    modified.weights.workload *= 0.5;
    modified.weights.sla_risk = (modified.weights.sla_risk * 1.2).min(1.0);
    modified.batching.max_batch_size = modified
        .batching
        .max_batch_size
        .bumped(config.surge.batch_size_increment);
    scale_radii(&mut modified, config.surge.radius_expansion_factor);
    modified
}

/// Hard-surge modifier: pin the weights to an SLA-first profile, double
/// the batch bump, square the radius factor.
pub fn apply_hard_surge(config: &DispatchConfig) -> DispatchConfig {
    let mut modified = config.clone();
    modified.weights.workload = 0.0;
    modified.weights.sla_risk = 0.5;
    modified.weights.time = 0.3;
    modified.weights.distance = 0.2;
    modified.batching.max_batch_size = modified
        .batching
        .max_batch_size
        .bumped(2 * config.surge.batch_size_increment);
    let factor = config.surge.radius_expansion_factor;
    scale_radii(&mut modified, factor * factor);
    modified
}

fn scale_radii(config: &mut DispatchConfig, factor: f64) {
    config.candidates.initial_radius_km *= factor;
    config.candidates.expanded_radius_km *= factor;
    config.candidates.max_radius_km *= factor;
}

/// Normal-priority pending orders comfortable enough to defer this cycle.
pub fn held_orders(orders: &HashMap<OrderId, Order>, now_ms: i64) -> Vec<OrderId> {
    orders
        .values()
        .filter(|order| {
            order.status == OrderStatus::PendingAssignment
                && order.priority == Priority::Normal
                && order.sla_deadline_ms > now_ms + HOLD_HORIZON_MINUTES * MINUTE_MS
        })
        .map(|order| order.id.clone())
        .collect()
}

/// Cluster pending pickups into half-degree buckets and point one idle
/// rider at each of the top-N centroids, N = min(idle, buckets).
pub fn preposition_targets(
    orders: &HashMap<OrderId, Order>,
    riders: &HashMap<RiderId, Rider>,
) -> Vec<PrepositionTarget> {
    let mut buckets: HashMap<(i64, i64), Vec<Location>> = HashMap::new();
    for order in orders.values() {
        if order.status != OrderStatus::PendingAssignment {
            continue;
        }
        let loc = order.pickup.location;
        let key = (
            (loc.lat / PREPOSITION_BUCKET_DEGREES).floor() as i64,
            (loc.lng / PREPOSITION_BUCKET_DEGREES).floor() as i64,
        );
        buckets.entry(key).or_default().push(loc);
    }

    let mut idle: Vec<&Rider> = riders
        .values()
        .filter(|r| r.status == RiderStatus::Active && r.current_assignments.is_empty())
        .collect();
    if idle.is_empty() || buckets.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<((i64, i64), Vec<Location>)> = buckets.into_iter().collect();
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));
    let target_count = idle.len().min(ranked.len());

    let mut targets = Vec::with_capacity(target_count);
    for (_, members) in ranked.into_iter().take(target_count) {
        let centroid = Location::new(
            members.iter().map(|l| l.lat).sum::<f64>() / members.len() as f64,
            members.iter().map(|l| l.lng).sum::<f64>() / members.len() as f64,
        );
        // Send the nearest still-unclaimed idle rider.
        let nearest = idle
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                haversine_km(a.location, centroid)
                    .partial_cmp(&haversine_km(b.location, centroid))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(idx, _)| idx);
        let Some(idx) = nearest else {
            break;
        };
        let rider = idle.remove(idx);
        targets.push(PrepositionTarget {
            location: centroid,
            rider_id: rider.id.clone(),
        });
    }
    targets
}
