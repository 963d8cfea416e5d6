//! Cycle results and engine-level metrics.
//!
//! One record per cycle, appended to the engine's history. Timestamps are
//! epoch milliseconds from the cycle's frozen clock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::eta::EtaCacheStats;
use crate::model::{Assignment, Order, OrderId, Rider, RiderId};
use crate::reassign::ReassignmentStats;
use crate::surge::SurgeState;

/// One (order, rider) pairing emitted by a cycle. `sequence_index` is the
/// order's position in the rider's assignment sequence at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentDecision {
    pub order_id: OrderId,
    pub rider_id: RiderId,
    pub sequence_index: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleMetrics {
    /// Arithmetic mean of the chosen pairs' scorer costs.
    pub avg_cost: f64,
    /// Summed SLA slack across this cycle's new assignments, in minutes.
    pub total_sla_slack_minutes: f64,
    /// Item-count load over item capacity, per rider.
    pub rider_utilization: HashMap<RiderId, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentCycleResult {
    pub cycle_id: String,
    pub timestamp_ms: i64,
    pub decisions: Vec<AssignmentDecision>,
    pub success_count: usize,
    pub failure_count: usize,
    pub metrics: CycleMetrics,
}

impl AssignmentCycleResult {
    pub fn empty(cycle_id: String, timestamp_ms: i64) -> Self {
        Self {
            cycle_id,
            timestamp_ms,
            decisions: Vec::new(),
            success_count: 0,
            failure_count: 0,
            metrics: CycleMetrics::default(),
        }
    }

    /// Share of the cycle's pending orders that got a rider.
    pub fn assignment_rate(&self) -> f64 {
        let attempted = self.success_count + self.failure_count;
        if attempted == 0 {
            return 0.0;
        }
        self.success_count as f64 / attempted as f64
    }
}

/// Snapshot of everything the engine owns, for callers and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentEngineState {
    pub orders: HashMap<OrderId, Order>,
    pub riders: HashMap<RiderId, Rider>,
    pub assignments: HashMap<OrderId, Assignment>,
    pub cycle_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub cycle_count: u64,
    pub last_cycle: Option<AssignmentCycleResult>,
    pub surge_state: Option<SurgeState>,
    pub reassignment_stats: ReassignmentStats,
    pub total_assignments: u64,
    pub eta_cache_stats: EtaCacheStats,
}
