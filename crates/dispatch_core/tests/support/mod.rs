//! Shared factories for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use dispatch_core::clock::ManualClock;
use dispatch_core::config::DispatchConfig;
use dispatch_core::engine::DispatchEngine;
use dispatch_core::geo::Location;
use dispatch_core::model::{Order, Rider};
use dispatch_core::test_helpers::{test_order, test_rider};

/// Engine with a manual clock frozen at `now_ms` and a fixed RNG seed.
pub fn engine_at(now_ms: i64) -> (DispatchEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now_ms));
    let config = DispatchConfig::builder()
        .with_seed(7)
        .build()
        .expect("default config builds");
    (DispatchEngine::with_clock(config, clock.clone()), clock)
}

/// `count` bike riders scattered within roughly a kilometer of `center`.
pub fn bike_fleet(count: usize, center: Location) -> Vec<Rider> {
    (0..count)
        .map(|i| {
            let offset = i as f64 * 0.001;
            test_rider(
                &format!("r{i}"),
                Location::new(center.lat + offset, center.lng - offset),
            )
        })
        .collect()
}

/// `count` pending orders with pickups scattered near the reference
/// pickup so every rider in a central fleet is in radius.
pub fn pending_orders(count: usize, created_at_ms: i64) -> Vec<Order> {
    (0..count)
        .map(|i| {
            let mut order = test_order(&format!("o{i:04}"), created_at_ms);
            let offset = (i % 10) as f64 * 0.002;
            order.pickup.location =
                Location::new(order.pickup.location.lat + offset, order.pickup.location.lng);
            order.delivery.location = Location::new(
                order.delivery.location.lat + offset,
                order.delivery.location.lng,
            );
            order
        })
        .collect()
}
