//! Performance benchmarks for dispatch_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use dispatch_core::clock::ManualClock;
use dispatch_core::config::DispatchConfig;
use dispatch_core::engine::DispatchEngine;
use dispatch_core::geo::Location;
use dispatch_core::optimizer::{AdaptiveOptimizer, AssignmentMatrix, GreedySolver, HungarianSolver};
use dispatch_core::test_helpers::{test_order, test_rider};

fn synthetic_matrix(orders: usize, riders: usize) -> AssignmentMatrix {
    let order_ids = (0..orders).map(|i| format!("o{i}")).collect();
    let rider_ids = (0..riders).map(|j| format!("r{j}")).collect();
    let costs = (0..orders)
        .map(|i| {
            (0..riders)
                .map(|j| ((i * 31 + j * 17) % 97) as f64 / 97.0)
                .collect()
        })
        .collect();
    AssignmentMatrix {
        order_ids,
        rider_ids,
        costs,
    }
}

fn bench_solvers(c: &mut Criterion) {
    let mut group = c.benchmark_group("solvers");
    for (orders, riders) in [(20, 20), (50, 50), (100, 50)] {
        let matrix = synthetic_matrix(orders, riders);
        group.bench_with_input(
            BenchmarkId::new("greedy", format!("{orders}x{riders}")),
            &matrix,
            |b, m| b.iter(|| black_box(GreedySolver.solve(m))),
        );
        group.bench_with_input(
            BenchmarkId::new("hungarian", format!("{orders}x{riders}")),
            &matrix,
            |b, m| b.iter(|| black_box(HungarianSolver::new(None).solve(m))),
        );
    }
    group.finish();
}

fn bench_full_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle");
    for (orders, riders) in [(20, 10), (100, 50)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{orders}x{riders}")),
            &(orders, riders),
            |b, &(orders, riders)| {
                b.iter(|| {
                    let clock = Arc::new(ManualClock::new(0));
                    let config = DispatchConfig::builder()
                        .with_seed(42)
                        .build()
                        .expect("config");
                    let mut engine = DispatchEngine::with_clock(config, clock);
                    let order_list = (0..orders)
                        .map(|i| {
                            let mut order = test_order(&format!("o{i}"), 0);
                            order.pickup.location = Location::new(
                                12.9716 + (i % 10) as f64 * 0.002,
                                77.5946,
                            );
                            order
                        })
                        .collect();
                    let rider_list = (0..riders)
                        .map(|j| {
                            test_rider(
                                &format!("r{j}"),
                                Location::new(12.9716 + j as f64 * 0.001, 77.5946),
                            )
                        })
                        .collect();
                    engine.update_state(order_list, rider_list);
                    black_box(engine.execute_cycle())
                });
            },
        );
    }
    group.finish();
}

fn bench_adaptive_dispatch(c: &mut Criterion) {
    let matrix = synthetic_matrix(100, 50);
    let optimizer = AdaptiveOptimizer::new(10_000, Duration::from_secs_f64(1.5));
    c.bench_function("adaptive_100x50", |b| {
        b.iter(|| black_box(optimizer.solve(&matrix, false)))
    });
}

criterion_group!(benches, bench_solvers, bench_full_cycle, bench_adaptive_dispatch);
criterion_main!(benches);
