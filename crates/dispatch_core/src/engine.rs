//! The assignment cycle orchestrator.
//!
//! One [DispatchEngine] owns the order/rider/assignment maps, the ETA
//! model, and the reassignment counters for its process lifetime. A cycle
//! is atomic from the caller's perspective: surge detection, candidate
//! generation, scoring, global assignment, state mutation, and trigger
//! detection all run against a single `now` captured at cycle start. The
//! engine never blocks or sleeps; cadence belongs to the caller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use crate::batching::BatchOptimizer;
use crate::candidates::{CandidateGenerator, CandidateSet};
use crate::clock::{Clock, SystemClock};
use crate::config::DispatchConfig;
use crate::eta::EtaModel;
use crate::model::{
    Assignment, AssignmentStatus, CostBreakdown, Order, OrderId, OrderStatus, Rider, RiderId,
    MINUTE_MS,
};
use crate::optimizer::{AdaptiveOptimizer, AssignmentMatrix, SENTINEL_COST};
use crate::reassign::{ReassignmentEngine, TriggerKind};
use crate::scoring::Scorer;
use crate::surge::{apply_hard_surge, apply_soft_surge, held_orders, preposition_targets,
    PrepositionTarget, SurgeDetector, SurgeLevel, SurgeState};
use crate::telemetry::{
    AssignmentCycleResult, AssignmentDecision, AssignmentEngineState, CycleMetrics, EngineMetrics,
};

pub struct DispatchEngine {
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    orders: HashMap<OrderId, Order>,
    riders: HashMap<RiderId, Rider>,
    /// Live assignments keyed by order id, which enforces the one-live-
    /// assignment-per-order rule by construction.
    assignments: HashMap<OrderId, Assignment>,
    eta: EtaModel,
    reassignment: ReassignmentEngine,
    cycle_counter: u64,
    history: Vec<AssignmentCycleResult>,
    total_assignments: u64,
    last_surge: Option<SurgeState>,
    last_preposition_targets: Vec<PrepositionTarget>,
}

impl DispatchEngine {
    pub fn new(config: DispatchConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build with an injected clock so tests drive deterministic cycles.
    pub fn with_clock(config: DispatchConfig, clock: Arc<dyn Clock>) -> Self {
        let eta = EtaModel::new(config.eta.clone(), config.rng_seed);
        let reassignment = ReassignmentEngine::new(config.reassignment.clone());
        Self {
            config,
            clock,
            orders: HashMap::new(),
            riders: HashMap::new(),
            assignments: HashMap::new(),
            eta,
            reassignment,
            cycle_counter: 0,
            history: Vec::new(),
            total_assignments: 0,
            last_surge: None,
            last_preposition_targets: Vec::new(),
        }
    }

    /// Merge a snapshot into the engine's maps. New entities are inserted
    /// whole; for known riders the mutable telemetry (position, status,
    /// shift, load, performance) is refreshed while the engine-owned
    /// assignment sequence and route are preserved. Known orders are left
    /// untouched so in-flight state transitions survive resubmission.
    pub fn update_state(&mut self, orders: Vec<Order>, riders: Vec<Rider>) {
        for order in orders {
            self.orders.entry(order.id.clone()).or_insert(order);
        }
        for rider in riders {
            match self.riders.get_mut(&rider.id) {
                Some(existing) => {
                    existing.status = rider.status;
                    existing.location = rider.location;
                    existing.vehicle = rider.vehicle;
                    existing.shift = rider.shift;
                    existing.load = rider.load;
                    existing.performance = rider.performance;
                }
                None => {
                    self.riders.insert(rider.id.clone(), rider);
                }
            }
        }
    }

    /// Run one assignment cycle and append its result to history.
    pub fn execute_cycle(&mut self) -> AssignmentCycleResult {
        let now_ms = self.clock.now_ms();
        let cycle_id = format!("cycle_{}_{}", now_ms, self.cycle_counter);
        self.cycle_counter += 1;

        let mut pending_ids: Vec<OrderId> = self
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::PendingAssignment)
            .map(|order| order.id.clone())
            .collect();
        pending_ids.sort();
        let pending_count = pending_ids.len();

        let surge = SurgeDetector::new(self.config.surge.clone())
            .detect(pending_count, &self.riders);
        self.last_surge = Some(surge.clone());

        if pending_ids.is_empty() {
            let mut result = AssignmentCycleResult::empty(cycle_id, now_ms);
            result.metrics.rider_utilization = self.rider_utilization();
            self.history.push(result.clone());
            return result;
        }

        let cycle_config = match surge.level {
            SurgeLevel::SoftSurge => apply_soft_surge(&self.config),
            SurgeLevel::HardSurge => apply_hard_surge(&self.config),
            SurgeLevel::Normal | SurgeLevel::Crisis => self.config.clone(),
        };
        let force_greedy = surge.level == SurgeLevel::Crisis;

        // Hard surge defers comfortable normal orders; they stay pending
        // and count as failures for this cycle.
        let held: HashSet<OrderId> = if surge.level == SurgeLevel::HardSurge {
            held_orders(&self.orders, now_ms).into_iter().collect()
        } else {
            HashSet::new()
        };
        let work_ids: Vec<OrderId> = pending_ids
            .iter()
            .filter(|id| !held.contains(*id))
            .take(cycle_config.cycle.max_orders_per_cycle)
            .cloned()
            .collect();

        let generator = CandidateGenerator::new(
            cycle_config.candidates.clone(),
            cycle_config.fatigue.clone(),
        );
        let candidate_sets: Vec<CandidateSet> = work_ids
            .iter()
            .filter_map(|id| self.orders.get(id))
            .map(|order| {
                let mut set = generator.generate(order, &self.riders, now_ms);
                set.candidate_rider_ids
                    .truncate(cycle_config.cycle.max_riders_per_assignment);
                set
            })
            .collect();

        if surge.level == SurgeLevel::HardSurge {
            self.last_preposition_targets = preposition_targets(&self.orders, &self.riders);
        }

        let (matrix, scored) = self.score_and_pivot(&candidate_sets, &cycle_config, now_ms);
        let optimizer = AdaptiveOptimizer::new(
            cycle_config.cycle.hungarian_threshold,
            Duration::from_secs_f64(cycle_config.cycle.optimizer_timeout_seconds),
        );
        let outcome = optimizer.solve(&matrix, force_greedy);

        let mut decisions = Vec::new();
        let mut chosen_costs = Vec::new();
        let mut total_slack_minutes = 0.0;
        let mut touched_riders: HashSet<RiderId> = HashSet::new();

        // Apply in matrix order so ties stay stable within a process run.
        for order_id in &matrix.order_ids {
            let Some(rider_id) = outcome.assignments.get(order_id) else {
                continue;
            };
            if !self.riders.contains_key(rider_id) {
                continue;
            }
            let breakdown = scored
                .get(&(order_id.clone(), rider_id.clone()))
                .copied()
                .unwrap_or_default();

            let Some(order) = self.orders.get_mut(order_id) else {
                continue;
            };
            order.status = OrderStatus::Assigned;
            order.assigned_rider_id = Some(rider_id.clone());
            order.assignment_attempts += 1;
            let pickup_loc = order.pickup.location;
            let delivery_loc = order.delivery.location;
            let pickup_wait = order.pickup.estimated_wait_minutes;
            let sla_deadline_ms = order.sla_deadline_ms;

            let Some(rider) = self.riders.get_mut(rider_id) else {
                continue;
            };
            let sequence_index = rider.current_assignments.len();
            rider.current_assignments.push(order_id.clone());
            let rider_location = rider.location;
            touched_riders.insert(rider_id.clone());

            let approach =
                self.eta
                    .estimate(rider_location, pickup_loc, now_ms, Some(rider_id), None);
            let pickup_at_ms =
                now_ms + approach.estimated_duration_minutes as i64 * MINUTE_MS;
            let depart_ms = pickup_at_ms + pickup_wait as i64 * MINUTE_MS;
            let delivery_leg =
                self.eta
                    .estimate(pickup_loc, delivery_loc, depart_ms, Some(rider_id), None);
            let delivery_at_ms =
                depart_ms + delivery_leg.estimated_duration_minutes as i64 * MINUTE_MS;
            let slack_minutes = (sla_deadline_ms - delivery_at_ms) as f64 / MINUTE_MS as f64;
            total_slack_minutes += slack_minutes;

            self.assignments.insert(
                order_id.clone(),
                Assignment {
                    id: format!("asg_{}_{}", cycle_id, order_id),
                    order_id: order_id.clone(),
                    rider_id: rider_id.clone(),
                    assigned_at_ms: now_ms,
                    cycle_id: cycle_id.clone(),
                    cost_breakdown: breakdown,
                    estimated_pickup_at_ms: pickup_at_ms,
                    estimated_delivery_at_ms: delivery_at_ms,
                    sla_deadline_ms,
                    sla_slack_minutes: slack_minutes,
                    reassignment_count: self.reassignment.attempt_count(order_id),
                    status: AssignmentStatus::Dispatched,
                },
            );

            decisions.push(AssignmentDecision {
                order_id: order_id.clone(),
                rider_id: rider_id.clone(),
                sequence_index,
            });
            chosen_costs.push(breakdown.total);
        }

        for rider_id in &touched_riders {
            self.refresh_rider_route(rider_id);
        }

        self.apply_reassignment_triggers(now_ms);

        let success_count = decisions.len();
        let avg_cost = if chosen_costs.is_empty() {
            0.0
        } else {
            chosen_costs.iter().sum::<f64>() / chosen_costs.len() as f64
        };

        let result = AssignmentCycleResult {
            cycle_id,
            timestamp_ms: now_ms,
            decisions,
            success_count,
            failure_count: pending_count - success_count,
            metrics: CycleMetrics {
                avg_cost,
                total_sla_slack_minutes: total_slack_minutes,
                rider_utilization: self.rider_utilization(),
            },
        };
        self.total_assignments += success_count as u64;
        self.history.push(result.clone());
        result
    }

    pub fn get_state(&self) -> AssignmentEngineState {
        AssignmentEngineState {
            orders: self.orders.clone(),
            riders: self.riders.clone(),
            assignments: self.assignments.clone(),
            cycle_count: self.cycle_counter,
        }
    }

    pub fn get_metrics(&self) -> EngineMetrics {
        EngineMetrics {
            cycle_count: self.cycle_counter,
            last_cycle: self.history.last().cloned(),
            surge_state: self.last_surge.clone(),
            reassignment_stats: self.reassignment.stats(),
            total_assignments: self.total_assignments,
            eta_cache_stats: self.eta.cache_stats(),
        }
    }

    pub fn cycle_history(&self) -> &[AssignmentCycleResult] {
        &self.history
    }

    /// Preposition pairings computed during the most recent hard-surge
    /// cycle, for external repositioning tooling.
    pub fn preposition_targets(&self) -> &[PrepositionTarget] {
        &self.last_preposition_targets
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// The ETA model, exposed for observed-delivery feedback
    /// (`update_rider_model`) and cache maintenance.
    pub fn eta_model(&self) -> &EtaModel {
        &self.eta
    }

    /// Score every (order, candidate) pair and pivot into a dense matrix.
    /// Scoring is pure over the frozen snapshot, so pairs fan out across
    /// threads.
    fn score_and_pivot(
        &self,
        candidate_sets: &[CandidateSet],
        cycle_config: &DispatchConfig,
        now_ms: i64,
    ) -> (
        AssignmentMatrix,
        HashMap<(OrderId, RiderId), CostBreakdown>,
    ) {
        let order_ids: Vec<OrderId> = candidate_sets
            .iter()
            .filter(|set| !set.candidate_rider_ids.is_empty())
            .map(|set| set.order_id.clone())
            .collect();

        let mut rider_ids: Vec<RiderId> = Vec::new();
        let mut seen = HashSet::new();
        for set in candidate_sets {
            for rider_id in &set.candidate_rider_ids {
                if seen.insert(rider_id.clone()) {
                    rider_ids.push(rider_id.clone());
                }
            }
        }

        let pairs: Vec<(OrderId, RiderId)> = candidate_sets
            .iter()
            .flat_map(|set| {
                set.candidate_rider_ids
                    .iter()
                    .map(|rider_id| (set.order_id.clone(), rider_id.clone()))
            })
            .collect();

        let scorer = Scorer::new(
            cycle_config.weights,
            cycle_config.sla.sla_risk_sigmoid_scale,
            &self.eta,
        );
        let orders = &self.orders;
        let riders = &self.riders;
        let scored: HashMap<(OrderId, RiderId), CostBreakdown> = pairs
            .par_iter()
            .filter_map(|(order_id, rider_id)| {
                let order = orders.get(order_id)?;
                let rider = riders.get(rider_id)?;
                Some((
                    (order_id.clone(), rider_id.clone()),
                    scorer.score(order, rider, now_ms),
                ))
            })
            .collect();

        let costs: Vec<Vec<f64>> = order_ids
            .iter()
            .map(|order_id| {
                rider_ids
                    .iter()
                    .map(|rider_id| {
                        scored
                            .get(&(order_id.clone(), rider_id.clone()))
                            .map(|b| b.total)
                            .unwrap_or(SENTINEL_COST)
                    })
                    .collect()
            })
            .collect();

        (
            AssignmentMatrix {
                order_ids,
                rider_ids,
                costs,
            },
            scored,
        )
    }

    /// Re-sequence a rider's route through the batch optimizer. When the
    /// batch is not feasible (cap or capacity), the existing route is kept
    /// and the new stops are appended pairwise instead.
    fn refresh_rider_route(&mut self, rider_id: &str) {
        let Some(rider) = self.riders.get(rider_id) else {
            return;
        };
        let batch_orders: Vec<Order> = rider
            .current_assignments
            .iter()
            .filter_map(|order_id| self.orders.get(order_id))
            .cloned()
            .collect();

        let plan = BatchOptimizer::new(self.config.batching.clone()).optimize(rider, &batch_orders);
        let Some(rider) = self.riders.get_mut(rider_id) else {
            return;
        };
        match plan {
            Ok(plan) => rider.current_route = plan.stops,
            Err(_) => {
                let present: HashSet<&OrderId> = rider
                    .current_route
                    .iter()
                    .map(|stop| &stop.order_id)
                    .collect();
                let missing: Vec<Order> = batch_orders
                    .iter()
                    .filter(|order| !present.contains(&order.id))
                    .cloned()
                    .collect();
                for order in missing {
                    let next_index = rider.current_route.len();
                    rider.current_route.push(crate::model::RouteStop {
                        kind: crate::model::StopKind::Pickup,
                        order_id: order.id.clone(),
                        location: order.pickup.location,
                        sequence_index: next_index,
                        estimated_arrival_ms: None,
                        estimated_departure_ms: None,
                    });
                    rider.current_route.push(crate::model::RouteStop {
                        kind: crate::model::StopKind::Delivery,
                        order_id: order.id.clone(),
                        location: order.delivery.location,
                        sequence_index: next_index + 1,
                        estimated_arrival_ms: None,
                        estimated_departure_ms: None,
                    });
                }
            }
        }
    }

    /// Detect triggers and free every affected order that passes the
    /// guards; freed orders re-enter the pipeline next cycle.
    fn apply_reassignment_triggers(&mut self, now_ms: i64) {
        let triggers = self.reassignment.detect_triggers(
            &self.orders,
            &self.riders,
            &self.assignments,
            &self.eta,
            now_ms,
        );

        for trigger in triggers {
            if trigger.kind == TriggerKind::NewRiderOnline {
                continue;
            }
            let Some(order_id) = trigger.order_id else {
                continue;
            };
            if !self.reassignment.can_reassign(&order_id, now_ms) {
                continue;
            }
            let Some(order) = self.orders.get(&order_id) else {
                continue;
            };
            if order.status != OrderStatus::Assigned {
                continue;
            }
            let pickup_loc = order.pickup.location;
            let rider_id = order.assigned_rider_id.clone();

            if let Some(rider_id) = &rider_id {
                if let Some(rider) = self.riders.get(rider_id) {
                    if self.reassignment.is_suppressed(rider, pickup_loc) {
                        continue;
                    }
                }
            }

            if let Some(order) = self.orders.get_mut(&order_id) {
                order.status = OrderStatus::PendingAssignment;
                order.assigned_rider_id = None;
            }
            if let Some(rider_id) = &rider_id {
                if let Some(rider) = self.riders.get_mut(rider_id) {
                    rider.current_assignments.retain(|id| id != &order_id);
                    rider.current_route.retain(|stop| stop.order_id != order_id);
                }
            }
            if let Some(assignment) = self.assignments.get_mut(&order_id) {
                assignment.status = AssignmentStatus::Reassigned;
                assignment.reassignment_count += 1;
            }
            self.reassignment.record_reassignment(&order_id, now_ms);
        }
    }

    fn rider_utilization(&self) -> HashMap<RiderId, f64> {
        self.riders
            .iter()
            .map(|(id, rider)| {
                let utilization = if rider.vehicle.max_items > 0 {
                    rider.load.item_count as f64 / rider.vehicle.max_items as f64
                } else {
                    0.0
                };
                (id.clone(), utilization)
            })
            .collect()
    }
}
