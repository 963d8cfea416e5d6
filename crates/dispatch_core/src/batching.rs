//! Batch route construction: cheapest insertion seeded from the rider,
//! improved by a bounded 2-opt sweep, emitted as paired pickup/delivery
//! stops.
//!
//! Feasibility is checked before any routing work: batch size is capped
//! per vehicle type and the aggregate payload must fit the vehicle.

use serde::{Deserialize, Serialize};

use crate::config::BatchingConfig;
use crate::geo::haversine_km;
use crate::model::{Order, OrderId, Rider, RouteStop, StopKind};

/// Travel minutes assumed between consecutive stops of one order.
const INTRA_ORDER_TRAVEL_MINUTES: u32 = 10;

/// Service minutes assumed at each delivery stop.
const DELIVERY_SERVICE_MINUTES: u32 = 3;

/// Travel minutes assumed between adjacent orders in a batch.
const INTER_ORDER_HOP_MINUTES: u32 = 10;

/// A feasible batch plan for one rider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub stops: Vec<RouteStop>,
    pub total_distance_km: f64,
    pub total_duration_minutes: u32,
    pub orders_sequence: Vec<OrderId>,
}

/// Why a batch was rejected before routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchRejection {
    TooManyOrders { max: u32 },
    CapacityExceeded,
}

pub struct BatchOptimizer {
    config: BatchingConfig,
}

impl BatchOptimizer {
    pub fn new(config: BatchingConfig) -> Self {
        Self { config }
    }

    /// Sequence `orders` into a route for `rider`, or reject the batch.
    pub fn optimize(&self, rider: &Rider, orders: &[Order]) -> Result<BatchPlan, BatchRejection> {
        let max = self.config.max_batch_size.for_vehicle(rider.vehicle.vehicle_type);
        if orders.len() as u32 > max {
            return Err(BatchRejection::TooManyOrders { max });
        }

        let total_weight: f64 = orders.iter().map(|o| o.payload.weight_kg).sum();
        let total_volume: f64 = orders.iter().map(|o| o.payload.volume_liters).sum();
        let total_items: u32 = orders.iter().map(|o| o.payload.item_count).sum();
        if total_weight > rider.vehicle.max_weight_kg
            || total_volume > rider.vehicle.max_volume_liters
            || total_items > rider.vehicle.max_items
        {
            return Err(BatchRejection::CapacityExceeded);
        }

        if orders.is_empty() {
            return Ok(BatchPlan {
                stops: Vec::new(),
                total_distance_km: 0.0,
                total_duration_minutes: 0,
                orders_sequence: Vec::new(),
            });
        }

        let mut sequence = self.cheapest_insertion(rider, orders);
        self.two_opt(rider, orders, &mut sequence);

        let stops = emit_stops(orders, &sequence);
        let total_distance_km = route_distance(rider, orders, &sequence);
        let total_duration_minutes = duration_estimate(orders, &sequence);

        Ok(BatchPlan {
            stops,
            total_distance_km,
            total_duration_minutes,
            orders_sequence: sequence.iter().map(|&i| orders[i].id.clone()).collect(),
        })
    }

    /// Seed with the pickup nearest the rider, then repeatedly insert the
    /// (order, position) pair with the smallest pickup-triangle detour.
    fn cheapest_insertion(&self, rider: &Rider, orders: &[Order]) -> Vec<usize> {
        let seed = (0..orders.len())
            .min_by(|&a, &b| {
                let da = haversine_km(rider.location, orders[a].pickup.location);
                let db = haversine_km(rider.location, orders[b].pickup.location);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("orders is non-empty");

        let mut sequence = vec![seed];
        let mut unplaced: Vec<usize> = (0..orders.len()).filter(|&i| i != seed).collect();

        while !unplaced.is_empty() {
            let mut best: Option<(usize, usize, f64)> = None; // (unplaced idx, position, detour)
            for (u, &order_idx) in unplaced.iter().enumerate() {
                let pickup = orders[order_idx].pickup.location;
                for pos in 0..=sequence.len() {
                    let prev = if pos == 0 {
                        rider.location
                    } else {
                        orders[sequence[pos - 1]].pickup.location
                    };
                    let detour = match sequence.get(pos) {
                        Some(&next_idx) => {
                            let next = orders[next_idx].pickup.location;
                            haversine_km(prev, pickup) + haversine_km(pickup, next)
                                - haversine_km(prev, next)
                        }
                        None => haversine_km(prev, pickup),
                    };
                    if best.map_or(true, |(_, _, d)| detour < d) {
                        best = Some((u, pos, detour));
                    }
                }
            }
            let (u, pos, _) = best.expect("unplaced is non-empty");
            let order_idx = unplaced.remove(u);
            sequence.insert(pos, order_idx);
        }
        sequence
    }

    /// Reverse sub-sequences while the route keeps getting shorter,
    /// restarting the sweep on every improvement, bounded by the
    /// configured iteration limit.
    fn two_opt(&self, rider: &Rider, orders: &[Order], sequence: &mut Vec<usize>) {
        if sequence.len() < 3 {
            return;
        }
        let mut iterations = 0u32;
        let mut best_distance = route_distance(rider, orders, sequence);

        'sweep: loop {
            if iterations >= self.config.two_opt_iteration_limit {
                break;
            }
            iterations += 1;

            for i in 0..sequence.len() {
                for j in (i + 2)..sequence.len() {
                    sequence[i + 1..=j].reverse();
                    let candidate = route_distance(rider, orders, sequence);
                    if candidate < best_distance {
                        best_distance = candidate;
                        continue 'sweep;
                    }
                    sequence[i + 1..=j].reverse(); // undo
                }
            }
            break;
        }
    }
}

/// Emit paired stops in sequence order: each order's pickup immediately
/// followed by its delivery, with true coordinates.
fn emit_stops(orders: &[Order], sequence: &[usize]) -> Vec<RouteStop> {
    let mut stops = Vec::with_capacity(sequence.len() * 2);
    for &order_idx in sequence {
        let order = &orders[order_idx];
        stops.push(RouteStop {
            kind: StopKind::Pickup,
            order_id: order.id.clone(),
            location: order.pickup.location,
            sequence_index: stops.len(),
            estimated_arrival_ms: None,
            estimated_departure_ms: None,
        });
        stops.push(RouteStop {
            kind: StopKind::Delivery,
            order_id: order.id.clone(),
            location: order.delivery.location,
            sequence_index: stops.len(),
            estimated_arrival_ms: None,
            estimated_departure_ms: None,
        });
    }
    stops
}

/// Full route length: rider through every pickup and delivery in emitted
/// stop order.
fn route_distance(rider: &Rider, orders: &[Order], sequence: &[usize]) -> f64 {
    let mut total = 0.0;
    let mut cursor = rider.location;
    for &order_idx in sequence {
        let order = &orders[order_idx];
        total += haversine_km(cursor, order.pickup.location);
        total += haversine_km(order.pickup.location, order.delivery.location);
        cursor = order.delivery.location;
    }
    total
}

/// Coarse duration model: per order the pickup wait, a fixed travel leg,
/// and the delivery service, plus a fixed hop between adjacent orders.
fn duration_estimate(orders: &[Order], sequence: &[usize]) -> u32 {
    let per_order: u32 = sequence
        .iter()
        .map(|&i| {
            orders[i].pickup.estimated_wait_minutes
                + INTRA_ORDER_TRAVEL_MINUTES
                + DELIVERY_SERVICE_MINUTES
        })
        .sum();
    let hops = sequence.len().saturating_sub(1) as u32 * INTER_ORDER_HOP_MINUTES;
    per_order + hops
}
