//! Greedy per-order assignment for crisis-scale problems.
//!
//! Each order independently takes its cheapest feasible rider. Riders are
//! deliberately reusable: at the problem sizes where this solver runs,
//! uniqueness bookkeeping costs more than the duplicate assignments are
//! worth, and the reassignment engine cleans up behind it.

use super::types::{resolve, Algorithm, AssignmentMatrix, OptimizerResult, SENTINEL_COST};

pub struct GreedySolver;

impl GreedySolver {
    pub fn solve(&self, matrix: &AssignmentMatrix) -> OptimizerResult {
        if matrix.is_empty() {
            return OptimizerResult::empty(Algorithm::Greedy);
        }

        let mut pairs = Vec::new();
        for (row, costs) in matrix.costs.iter().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for (col, &cost) in costs.iter().enumerate() {
                if cost >= SENTINEL_COST {
                    continue;
                }
                if best.map_or(true, |(_, b)| cost < b) {
                    best = Some((col, cost));
                }
            }
            if let Some((col, _)) = best {
                pairs.push((row, col));
            }
        }
        resolve(matrix, pairs, Algorithm::Greedy)
    }
}
