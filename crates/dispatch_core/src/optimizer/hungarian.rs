//! Exact bipartite minimum-cost matching via the potentials-based
//! Kuhn-Munkres algorithm, O(n^3) over a square-padded matrix.
//!
//! The matrix is padded to `max(n, m)` with the sentinel cost; padded
//! pairs and sentinel pairs are discarded from the output. The augmenting
//! loop checks an optional deadline once per row so a stuck solve can be
//! abandoned and retried with a cheaper solver.

use std::time::Instant;

use super::types::{resolve, Algorithm, AssignmentMatrix, OptimizerResult, SENTINEL_COST};

pub struct HungarianSolver {
    /// Abandon the solve once this instant passes. `None` runs unbounded.
    pub deadline: Option<Instant>,
}

impl HungarianSolver {
    pub fn new(deadline: Option<Instant>) -> Self {
        Self { deadline }
    }

    /// Returns `None` only when the deadline expired mid-solve.
    pub fn solve(&self, matrix: &AssignmentMatrix) -> Option<OptimizerResult> {
        if matrix.is_empty() {
            return Some(OptimizerResult::empty(Algorithm::Hungarian));
        }
        let n_orders = matrix.order_ids.len();
        let n_riders = matrix.rider_ids.len();
        let side = n_orders.max(n_riders);

        // Square padding with the sentinel keeps the algorithm's
        // permutation structure; padded pairs never survive `resolve`.
        let mut cost = vec![vec![SENTINEL_COST; side]; side];
        for (i, row) in matrix.costs.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                cost[i][j] = value;
            }
        }

        let column_owner = kuhn_munkres_min(&cost, self.deadline)?;

        let mut pairs = Vec::new();
        for (col, &row) in column_owner.iter().enumerate() {
            if row < n_orders && col < n_riders {
                pairs.push((row, col));
            }
        }
        Some(resolve(matrix, pairs, Algorithm::Hungarian))
    }
}

/// Potentials-based Kuhn-Munkres on a square matrix. Returns, per column,
/// the row assigned to it. `None` if the deadline expired.
fn kuhn_munkres_min(cost: &[Vec<f64>], deadline: Option<Instant>) -> Option<Vec<usize>> {
    let n = cost.len();
    // 1-indexed working arrays; index 0 is the virtual root column.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut owner = vec![0_usize; n + 1];
    let mut way = vec![0_usize; n + 1];

    for i in 1..=n {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return None;
            }
        }

        owner[0] = i;
        let mut j0 = 0_usize;
        let mut min_to = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0_usize;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < min_to[j] {
                    min_to[j] = reduced;
                    way[j] = j0;
                }
                if min_to[j] < delta {
                    delta = min_to[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_to[j] -= delta;
                }
            }

            j0 = j1;
            if owner[j0] == 0 {
                break;
            }
        }

        // Walk the augmenting path back to the root.
        loop {
            let j1 = way[j0];
            owner[j0] = owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    // owner[j] for j in 1..=n is 1-indexed rows; shift both down.
    Some((1..=n).map(|j| owner[j] - 1).collect())
}
