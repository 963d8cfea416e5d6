//! Real-time last-mile dispatch engine.
//!
//! On a caller-driven cadence, [engine::DispatchEngine::execute_cycle]
//! matches pending delivery orders to riders by minimizing a weighted
//! multi-objective cost under hard feasibility constraints. Candidate
//! generation, scoring, batching, the size-adaptive assignment solvers,
//! surge handling, and reassignment detection each live in their own
//! module.

pub mod batching;
pub mod candidates;
pub mod clock;
pub mod config;
pub mod engine;
pub mod eta;
pub mod geo;
pub mod model;
pub mod optimizer;
pub mod reassign;
pub mod scoring;
pub mod surge;
pub mod telemetry;
pub mod test_helpers;
