//! Run a handful of assignment cycles over a synthetic city snapshot and
//! print the decisions.
//!
//! Run with: cargo run -p dispatch_core --example cycle_run

use std::sync::Arc;

use dispatch_core::clock::ManualClock;
use dispatch_core::config::DispatchConfig;
use dispatch_core::engine::DispatchEngine;
use dispatch_core::geo::Location;
use dispatch_core::test_helpers::{test_order, test_rider};

fn main() {
    const NUM_ORDERS: usize = 40;
    const NUM_RIDERS: usize = 15;
    const CYCLES: usize = 4;
    const CYCLE_INTERVAL_MS: i64 = 30_000;

    let clock = Arc::new(ManualClock::new(0));
    let config = DispatchConfig::builder()
        .with_seed(123)
        .build()
        .expect("default config is valid");
    let mut engine = DispatchEngine::with_clock(config, clock.clone());

    let orders = (0..NUM_ORDERS)
        .map(|i| {
            let mut order = test_order(&format!("order_{i:03}"), 0);
            order.pickup.location =
                Location::new(12.9716 + (i % 8) as f64 * 0.004, 77.5946 + (i % 5) as f64 * 0.003);
            order.delivery.location =
                Location::new(order.pickup.location.lat + 0.01, order.pickup.location.lng + 0.008);
            order
        })
        .collect();
    let riders = (0..NUM_RIDERS)
        .map(|j| {
            test_rider(
                &format!("rider_{j:02}"),
                Location::new(12.9716 + j as f64 * 0.002, 77.5946 - j as f64 * 0.001),
            )
        })
        .collect();
    engine.update_state(orders, riders);

    println!(
        "--- Dispatch run ({NUM_ORDERS} orders, {NUM_RIDERS} riders, {CYCLES} cycles, seed 123) ---"
    );
    for _ in 0..CYCLES {
        let result = engine.execute_cycle();
        let surge = engine
            .get_metrics()
            .surge_state
            .map(|s| format!("{:?}", s.level))
            .unwrap_or_default();
        println!(
            "{}  assigned={} failed={} avg_cost={:.3} slack={:.0}min surge={}",
            result.cycle_id,
            result.success_count,
            result.failure_count,
            result.metrics.avg_cost,
            result.metrics.total_sla_slack_minutes,
            surge,
        );
        for decision in result.decisions.iter().take(5) {
            println!(
                "    {} -> {} (stop #{})",
                decision.order_id, decision.rider_id, decision.sequence_index
            );
        }
        if result.decisions.len() > 5 {
            println!("    ... and {} more", result.decisions.len() - 5);
        }
        clock.advance(CYCLE_INTERVAL_MS);
    }

    let metrics = engine.get_metrics();
    println!(
        "total assignments: {}  cycles: {}  eta cache entries: {}",
        metrics.total_assignments, metrics.cycle_count, metrics.eta_cache_stats.cached_estimates
    );
}
