use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{OrderId, RiderId};

/// Cost marking an (order, rider) pair infeasible in the dense matrix.
/// Solvers never emit pairs at or above this value.
pub const SENTINEL_COST: f64 = 1e10;

/// Dense cost matrix over the cycle's orders and candidate riders.
/// `costs[i][j]` is the scorer cost for (orders[i], riders[j]), or
/// [SENTINEL_COST] when the pair is infeasible.
#[derive(Debug, Clone)]
pub struct AssignmentMatrix {
    pub order_ids: Vec<OrderId>,
    pub rider_ids: Vec<RiderId>,
    pub costs: Vec<Vec<f64>>,
}

impl AssignmentMatrix {
    pub fn problem_size(&self) -> usize {
        self.order_ids.len() * self.rider_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_ids.is_empty() || self.rider_ids.is_empty()
    }
}

/// Which solver produced a result, for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Hungarian,
    Auction,
    Greedy,
}

/// Solver output: chosen pairs and their summed cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerResult {
    pub assignments: HashMap<OrderId, RiderId>,
    pub total_cost: f64,
    pub algorithm: Algorithm,
}

impl OptimizerResult {
    pub fn empty(algorithm: Algorithm) -> Self {
        Self {
            assignments: HashMap::new(),
            total_cost: 0.0,
            algorithm,
        }
    }
}

/// Index pairs produced by a raw solver pass, before ids are resolved.
pub(crate) fn resolve(
    matrix: &AssignmentMatrix,
    pairs: Vec<(usize, usize)>,
    algorithm: Algorithm,
) -> OptimizerResult {
    let mut assignments = HashMap::new();
    let mut total_cost = 0.0;
    for (row, col) in pairs {
        let cost = matrix.costs[row][col];
        if cost >= SENTINEL_COST {
            continue;
        }
        total_cost += cost;
        assignments.insert(matrix.order_ids[row].clone(), matrix.rider_ids[col].clone());
    }
    OptimizerResult {
        assignments,
        total_cost,
        algorithm,
    }
}
