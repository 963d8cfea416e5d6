//! Auction algorithm for mid-size assignment problems.
//!
//! Orders bid for riders with an epsilon increment; outbid orders return
//! to the queue. Bidding stops when every order with a feasible rider is
//! assigned or the iteration cap is reached, and whatever has converged by
//! then is returned. Runs near-optimal in practice at sizes where the
//! exact solver's cubic cost starts to hurt.

use super::types::{resolve, Algorithm, AssignmentMatrix, OptimizerResult, SENTINEL_COST};

/// Minimum bid increment. Bounds how far total cost can drift from the
/// optimum (n * epsilon).
pub const DEFAULT_EPSILON: f64 = 0.01;

/// Bids processed before the auction gives up and returns its partial
/// assignment.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

pub struct AuctionSolver {
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl Default for AuctionSolver {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl AuctionSolver {
    pub fn solve(&self, matrix: &AssignmentMatrix) -> OptimizerResult {
        if matrix.is_empty() {
            return OptimizerResult::empty(Algorithm::Auction);
        }
        let n_orders = matrix.order_ids.len();
        let n_riders = matrix.rider_ids.len();

        let mut prices = vec![0.0_f64; n_riders];
        let mut order_of_rider: Vec<Option<usize>> = vec![None; n_riders];
        let mut rider_of_order: Vec<Option<usize>> = vec![None; n_orders];
        let mut queue: Vec<usize> = (0..n_orders).collect();
        let mut iterations = 0usize;

        while let Some(order) = queue.pop() {
            if iterations >= self.max_iterations {
                break;
            }
            iterations += 1;

            // Benefit of rider j to this order is -(cost + price); track
            // the best and second-best to size the bid.
            let mut best: Option<(usize, f64)> = None;
            let mut second_value = f64::NEG_INFINITY;
            for j in 0..n_riders {
                let cost = matrix.costs[order][j];
                if cost >= SENTINEL_COST {
                    continue;
                }
                let value = -(cost + prices[j]);
                match best {
                    None => best = Some((j, value)),
                    Some((_, best_value)) if value > best_value => {
                        second_value = best_value;
                        best = Some((j, value));
                    }
                    Some(_) => {
                        if value > second_value {
                            second_value = value;
                        }
                    }
                }
            }

            let Some((rider, best_value)) = best else {
                continue; // no feasible rider for this order
            };
            let raise = if second_value.is_finite() {
                best_value - second_value + self.epsilon
            } else {
                self.epsilon
            };
            prices[rider] += raise;

            if let Some(displaced) = order_of_rider[rider].replace(order) {
                rider_of_order[displaced] = None;
                queue.push(displaced);
            }
            rider_of_order[order] = Some(rider);
        }

        let pairs = rider_of_order
            .iter()
            .enumerate()
            .filter_map(|(order, rider)| rider.map(|r| (order, r)))
            .collect();
        resolve(matrix, pairs, Algorithm::Auction)
    }
}
