//! Size-adaptive assignment optimization over a dense cost matrix.
//!
//! Three solvers share one job: small problems get the exact Hungarian
//! matching, mid-size problems the auction algorithm, and crisis-scale
//! problems a greedy sweep. The dispatcher also downgrades when the exact
//! solver blows its deadline, so a cycle always produces some assignment.

pub mod auction;
pub mod greedy;
pub mod hungarian;
pub mod types;

use std::time::{Duration, Instant};

pub use auction::AuctionSolver;
pub use greedy::GreedySolver;
pub use hungarian::HungarianSolver;
pub use types::{Algorithm, AssignmentMatrix, OptimizerResult, SENTINEL_COST};

/// Problem sizes (orders x riders) above this always run greedy.
pub const AUCTION_CEILING: usize = 50_000;

/// Dispatches a matrix to the cheapest solver that can afford it.
#[derive(Debug, Clone)]
pub struct AdaptiveOptimizer {
    /// Largest problem size the exact solver accepts.
    pub hungarian_threshold: usize,
    /// Wall-clock budget for the exact solver.
    pub timeout: Duration,
}

impl AdaptiveOptimizer {
    pub fn new(hungarian_threshold: usize, timeout: Duration) -> Self {
        Self {
            hungarian_threshold,
            timeout,
        }
    }

    /// Solve the matrix. `force_greedy` short-circuits straight to the
    /// greedy sweep (the crisis-surge directive).
    pub fn solve(&self, matrix: &AssignmentMatrix, force_greedy: bool) -> OptimizerResult {
        if matrix.is_empty() {
            return OptimizerResult::empty(Algorithm::Greedy);
        }
        if force_greedy {
            return GreedySolver.solve(matrix);
        }

        let problem_size = matrix.problem_size();
        if problem_size <= self.hungarian_threshold {
            let deadline = Instant::now() + self.timeout;
            if let Some(result) = HungarianSolver::new(Some(deadline)).solve(matrix) {
                return result;
            }
            // Deadline blown: degrade, never fail the cycle.
            return AuctionSolver::default().solve(matrix);
        }
        if problem_size <= AUCTION_CEILING {
            return AuctionSolver::default().solve(matrix);
        }
        GreedySolver.solve(matrix)
    }
}
