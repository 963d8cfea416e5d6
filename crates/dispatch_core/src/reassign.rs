//! Reassignment detection and guards.
//!
//! After each cycle's decisions are applied, the engine scans for four
//! trigger kinds and frees the affected orders for the next cycle, subject
//! to two guards: a per-order attempt budget with a minimum interval, and
//! proximity suppression for riders already committed to a pickup.
//!
//! Attempt counters live here for the lifetime of the process so an order
//! can never thrash past its budget, however many cycles it survives.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::ReassignmentConfig;
use crate::eta::EtaModel;
use crate::geo::{haversine_km, Location};
use crate::model::{
    Assignment, Order, OrderId, OrderStatus, Priority, Rider, RiderId, RiderStatus, MINUTE_MS,
};

/// Minimum gap between two reassignments of the same order.
const MIN_REASSIGN_INTERVAL_MS: i64 = 30_000;

/// Radius around a priority pickup in which already-assigned normal orders
/// become takeover candidates.
const HIGH_PRIORITY_TAKEOVER_RADIUS_KM: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    RiderOffline,
    EtaSpike,
    HighPriorityArrival,
    NewRiderOnline,
}

/// One detected trigger. `order_id` is the order that may be freed;
/// `new_rider_online` carries only the rider hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignmentTrigger {
    pub kind: TriggerKind,
    pub order_id: Option<OrderId>,
    pub rider_id: Option<RiderId>,
}

#[derive(Debug, Clone, Copy, Default)]
struct AttemptRecord {
    count: u32,
    last_attempt_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReassignmentStats {
    pub total_reassignments: u64,
    pub orders_tracked: usize,
}

pub struct ReassignmentEngine {
    config: ReassignmentConfig,
    attempts: HashMap<OrderId, AttemptRecord>,
    total_reassignments: u64,
}

impl ReassignmentEngine {
    pub fn new(config: ReassignmentConfig) -> Self {
        Self {
            config,
            attempts: HashMap::new(),
            total_reassignments: 0,
        }
    }

    /// Scan the live assignments and rider population for triggers.
    pub fn detect_triggers(
        &self,
        orders: &HashMap<OrderId, Order>,
        riders: &HashMap<RiderId, Rider>,
        assignments: &HashMap<OrderId, Assignment>,
        eta: &EtaModel,
        now_ms: i64,
    ) -> Vec<ReassignmentTrigger> {
        let mut triggers = Vec::new();

        for assignment in assignments.values().filter(|a| a.is_live()) {
            let Some(order) = orders.get(&assignment.order_id) else {
                continue;
            };
            if order.status != OrderStatus::Assigned {
                continue;
            }

            match riders.get(&assignment.rider_id) {
                None => triggers.push(ReassignmentTrigger {
                    kind: TriggerKind::RiderOffline,
                    order_id: Some(assignment.order_id.clone()),
                    rider_id: Some(assignment.rider_id.clone()),
                }),
                Some(rider) if rider.status == RiderStatus::Offline => {
                    triggers.push(ReassignmentTrigger {
                        kind: TriggerKind::RiderOffline,
                        order_id: Some(assignment.order_id.clone()),
                        rider_id: Some(rider.id.clone()),
                    })
                }
                Some(rider) => {
                    let current = eta.estimate(
                        rider.location,
                        order.delivery.location,
                        now_ms,
                        Some(&rider.id),
                        None,
                    );
                    let promised = assignment.promised_duration_minutes();
                    let spike =
                        current.estimated_duration_minutes as f64 - promised;
                    if spike > self.config.trigger_eta_spike_minutes {
                        triggers.push(ReassignmentTrigger {
                            kind: TriggerKind::EtaSpike,
                            order_id: Some(assignment.order_id.clone()),
                            rider_id: Some(rider.id.clone()),
                        });
                    }
                }
            }
        }

        triggers.extend(self.high_priority_triggers(orders, riders, now_ms));

        for rider in riders.values() {
            if rider.status == RiderStatus::Active && rider.current_assignments.is_empty() {
                triggers.push(ReassignmentTrigger {
                    kind: TriggerKind::NewRiderOnline,
                    order_id: None,
                    rider_id: Some(rider.id.clone()),
                });
            }
        }

        triggers
    }

    /// Urgent critical orders (and unassigned high ones) can claim the
    /// riders of nearby normal assignments.
    fn high_priority_triggers(
        &self,
        orders: &HashMap<OrderId, Order>,
        riders: &HashMap<RiderId, Rider>,
        now_ms: i64,
    ) -> Vec<ReassignmentTrigger> {
        let cutoff_ms =
            (self.config.trigger_high_priority_sla_cutoff_minutes * MINUTE_MS as f64) as i64;
        let urgent: Vec<&Order> = orders
            .values()
            .filter(|order| match order.priority {
                Priority::Critical => true,
                Priority::High => order.assigned_rider_id.is_none(),
                Priority::Normal => false,
            })
            .filter(|order| order.sla_deadline_ms - now_ms <= cutoff_ms)
            .collect();
        if urgent.is_empty() {
            return Vec::new();
        }

        let mut triggers = Vec::new();
        for order in orders.values() {
            if order.priority != Priority::Normal || order.status != OrderStatus::Assigned {
                continue;
            }
            let Some(rider_id) = &order.assigned_rider_id else {
                continue;
            };
            let Some(rider) = riders.get(rider_id) else {
                continue;
            };
            let near_urgent = urgent.iter().any(|priority_order| {
                haversine_km(rider.location, priority_order.pickup.location)
                    <= HIGH_PRIORITY_TAKEOVER_RADIUS_KM
            });
            if near_urgent {
                triggers.push(ReassignmentTrigger {
                    kind: TriggerKind::HighPriorityArrival,
                    order_id: Some(order.id.clone()),
                    rider_id: Some(rider_id.clone()),
                });
            }
        }
        triggers
    }

    /// Attempt budget: under the cap and at least 30 seconds since the
    /// last recorded reassignment.
    pub fn can_reassign(&self, order_id: &str, now_ms: i64) -> bool {
        let Some(record) = self.attempts.get(order_id) else {
            return self.config.max_reassignment_attempts > 0;
        };
        if record.count >= self.config.max_reassignment_attempts {
            return false;
        }
        match record.last_attempt_ms {
            Some(last) => now_ms - last >= MIN_REASSIGN_INTERVAL_MS,
            None => true,
        }
    }

    /// A rider already at (or nearly at) the pickup is committed and not
    /// disturbed.
    pub fn is_suppressed(&self, rider: &Rider, pickup: Location) -> bool {
        haversine_km(rider.location, pickup) < self.config.suppression_radius_meters / 1000.0
    }

    pub fn record_reassignment(&mut self, order_id: &str, now_ms: i64) {
        let record = self.attempts.entry(order_id.to_string()).or_default();
        record.count += 1;
        record.last_attempt_ms = Some(now_ms);
        self.total_reassignments += 1;
    }

    /// Attempts recorded so far for one order.
    pub fn attempt_count(&self, order_id: &str) -> u32 {
        self.attempts.get(order_id).map(|r| r.count).unwrap_or(0)
    }

    pub fn stats(&self) -> ReassignmentStats {
        ReassignmentStats {
            total_reassignments: self.total_reassignments,
            orders_tracked: self.attempts.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EtaConfig;
    use crate::test_helpers::{test_assignment, test_order, test_rider};

    fn engine() -> ReassignmentEngine {
        ReassignmentEngine::new(ReassignmentConfig::default())
    }

    fn eta() -> EtaModel {
        EtaModel::new(EtaConfig::default(), Some(42))
    }

    #[test]
    fn attempt_cap_and_interval_guard() {
        let mut engine = engine();
        assert!(engine.can_reassign("o1", 0));

        engine.record_reassignment("o1", 0);
        // Too soon: 30 seconds must pass.
        assert!(!engine.can_reassign("o1", 10_000));
        assert!(engine.can_reassign("o1", 30_000));

        engine.record_reassignment("o1", 40_000);
        assert!(engine.can_reassign("o1", 80_000));
        engine.record_reassignment("o1", 80_000);

        // Third attempt recorded: capped for good.
        assert!(!engine.can_reassign("o1", i64::MAX));
        assert_eq!(engine.attempt_count("o1"), 3);
        assert_eq!(engine.stats().total_reassignments, 3);
    }

    #[test]
    fn suppression_radius_protects_committed_riders() {
        let engine = engine();
        let pickup = Location::new(12.9716, 77.5946);
        let at_door = test_rider("r1", Location::new(12.9717, 77.5947));
        let blocks_away = test_rider("r2", Location::new(12.99, 77.62));
        assert!(engine.is_suppressed(&at_door, pickup));
        assert!(!engine.is_suppressed(&blocks_away, pickup));
    }

    #[test]
    fn offline_rider_triggers_reassignment() {
        let engine = engine();
        let eta = eta();
        let mut order = test_order("o1", 0);
        order.status = OrderStatus::Assigned;
        order.assigned_rider_id = Some("r1".to_string());
        let mut rider = test_rider("r1", Location::new(12.97, 77.59));
        rider.status = RiderStatus::Offline;
        let assignment = test_assignment("o1", "r1", 0);

        let orders = HashMap::from([(order.id.clone(), order)]);
        let riders = HashMap::from([(rider.id.clone(), rider)]);
        let assignments = HashMap::from([("o1".to_string(), assignment)]);

        let triggers = engine.detect_triggers(&orders, &riders, &assignments, &eta, 0);
        assert!(triggers
            .iter()
            .any(|t| t.kind == TriggerKind::RiderOffline
                && t.order_id.as_deref() == Some("o1")));
    }

    #[test]
    fn vanished_rider_counts_as_offline() {
        let engine = engine();
        let eta = eta();
        let mut order = test_order("o1", 0);
        order.status = OrderStatus::Assigned;
        order.assigned_rider_id = Some("ghost".to_string());
        let assignment = test_assignment("o1", "ghost", 0);

        let orders = HashMap::from([(order.id.clone(), order)]);
        let assignments = HashMap::from([("o1".to_string(), assignment)]);

        let triggers = engine.detect_triggers(&orders, &HashMap::new(), &assignments, &eta, 0);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::RiderOffline);
    }

    #[test]
    fn eta_spike_compares_minutes_to_minutes() {
        let engine = engine();
        let eta = eta();
        let mut order = test_order("o1", 0);
        order.status = OrderStatus::Assigned;
        order.assigned_rider_id = Some("r1".to_string());
        // Rider has drifted far from the delivery: the fresh estimate dwarfs
        // the promised 10 minutes.
        let rider = test_rider("r1", Location::new(13.6, 78.3));
        let mut assignment = test_assignment("o1", "r1", 0);
        assignment.estimated_delivery_at_ms = 10 * MINUTE_MS;

        let orders = HashMap::from([(order.id.clone(), order)]);
        let riders = HashMap::from([(rider.id.clone(), rider)]);
        let assignments = HashMap::from([("o1".to_string(), assignment)]);

        let triggers = engine.detect_triggers(&orders, &riders, &assignments, &eta, 0);
        assert!(triggers.iter().any(|t| t.kind == TriggerKind::EtaSpike));
    }

    #[test]
    fn critical_arrival_claims_nearby_normal_assignment() {
        let engine = engine();
        let eta = eta();

        let mut normal = test_order("normal", 0);
        normal.status = OrderStatus::Assigned;
        normal.assigned_rider_id = Some("r1".to_string());

        let mut critical = test_order("critical", 0);
        critical.priority = Priority::Critical;
        critical.sla_deadline_ms = 15 * MINUTE_MS;
        critical.pickup.location = Location::new(12.972, 77.595);

        let rider = test_rider("r1", Location::new(12.975, 77.60));
        let assignment = test_assignment("normal", "r1", 0);

        let orders = HashMap::from([
            (normal.id.clone(), normal),
            (critical.id.clone(), critical),
        ]);
        let riders = HashMap::from([(rider.id.clone(), rider)]);
        let assignments = HashMap::from([("normal".to_string(), assignment)]);

        let triggers = engine.detect_triggers(&orders, &riders, &assignments, &eta, 0);
        assert!(triggers
            .iter()
            .any(|t| t.kind == TriggerKind::HighPriorityArrival
                && t.order_id.as_deref() == Some("normal")));
    }

    #[test]
    fn idle_active_rider_is_a_pure_hint() {
        let engine = engine();
        let eta = eta();
        let rider = test_rider("fresh", Location::new(12.97, 77.59));
        let riders = HashMap::from([(rider.id.clone(), rider)]);

        let triggers =
            engine.detect_triggers(&HashMap::new(), &riders, &HashMap::new(), &eta, 0);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::NewRiderOnline);
        assert!(triggers[0].order_id.is_none());
    }
}
