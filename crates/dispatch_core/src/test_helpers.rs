//! Test helpers for common entity setup.
//!
//! Shared factories so unit and integration tests build orders and riders
//! the same way: a small pickup/delivery pair in central Bangalore, a
//! bike rider with slack capacity, and an open-ended shift.

use std::collections::HashSet;

use crate::geo::Location;
use crate::model::{
    Assignment, AssignmentStatus, Capability, CostBreakdown, DeliveryDetails, Load, Order,
    OrderStatus, Payload, Performance, PickupDetails, Priority, Rider, RiderStatus, Shift,
    Vehicle, VehicleRequirement, VehicleType, MINUTE_MS,
};

/// Reference pickup used across tests.
pub fn test_pickup_location() -> Location {
    Location::new(12.9716, 77.5946)
}

/// Reference delivery a short hop from the pickup.
pub fn test_delivery_location() -> Location {
    Location::new(12.975, 77.601)
}

/// A 1 kg, any-vehicle order with a 60-minute SLA from `created_at_ms`.
pub fn test_order(id: &str, created_at_ms: i64) -> Order {
    Order {
        id: id.to_string(),
        status: OrderStatus::PendingAssignment,
        created_at_ms,
        sla_deadline_ms: created_at_ms + 60 * MINUTE_MS,
        pickup: PickupDetails {
            location: test_pickup_location(),
            address: "MG Road 1".to_string(),
            store_id: "store_1".to_string(),
            estimated_wait_minutes: 5,
            open_window: None,
        },
        delivery: DeliveryDetails {
            location: test_delivery_location(),
            address: "Church Street 7".to_string(),
            customer_id: "cust_1".to_string(),
            preferred_window: None,
        },
        payload: Payload {
            weight_kg: 1.0,
            volume_liters: 2.0,
            item_count: 1,
            requires_cold_chain: false,
            fragile: false,
            vehicle_requirement: VehicleRequirement::Any,
        },
        priority: Priority::Normal,
        assignment_attempts: 0,
        assigned_rider_id: None,
    }
}

/// An active, empty-handed bike rider mid-shift at `location`.
pub fn test_rider(id: &str, location: Location) -> Rider {
    Rider {
        id: id.to_string(),
        status: RiderStatus::Active,
        location,
        vehicle: Vehicle {
            vehicle_type: VehicleType::Bike,
            max_weight_kg: 5.0,
            max_volume_liters: 30.0,
            max_items: 5,
            capabilities: HashSet::from([Capability::Standard]),
        },
        shift: Shift {
            start_ms: -2 * 60 * MINUTE_MS,
            end_ms: 8 * 60 * MINUTE_MS,
            continuous_driving_minutes: 0,
            total_shift_driving_minutes: 0,
        },
        load: Load::default(),
        performance: Performance {
            zone_familiarity: Default::default(),
            avg_delivery_success_rate: 0.9,
            avg_speed_multiplier: 1.0,
            total_deliveries: 100,
        },
        current_assignments: Vec::new(),
        current_route: Vec::new(),
    }
}

/// A dispatched assignment promising pickup in 10 and delivery in 30
/// minutes.
pub fn test_assignment(order_id: &str, rider_id: &str, assigned_at_ms: i64) -> Assignment {
    Assignment {
        id: format!("asg_test_{order_id}"),
        order_id: order_id.to_string(),
        rider_id: rider_id.to_string(),
        assigned_at_ms,
        cycle_id: "cycle_test_0".to_string(),
        cost_breakdown: CostBreakdown::default(),
        estimated_pickup_at_ms: assigned_at_ms + 10 * MINUTE_MS,
        estimated_delivery_at_ms: assigned_at_ms + 30 * MINUTE_MS,
        sla_deadline_ms: assigned_at_ms + 60 * MINUTE_MS,
        sla_slack_minutes: 30.0,
        reassignment_count: 0,
        status: AssignmentStatus::Dispatched,
    }
}
