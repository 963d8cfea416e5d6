//! Core entities: orders, riders, assignments, and route stops.
//!
//! Entities are plain data keyed by stable string ids. The engine resolves
//! cross-references (order -> rider, rider -> orders) through its id-keyed
//! maps; entities never hold pointers to each other.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::geo::Location;

pub type OrderId = String;
pub type RiderId = String;

/// Milliseconds per minute, used wherever deadlines and ETAs meet.
pub const MINUTE_MS: i64 = 60_000;

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingAssignment,
    Assigned,
    PickedUp,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleRequirement {
    Any,
    Bike,
    Car,
    Van,
    Refrigerated,
}

/// An open/close or delivery-preference window in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupDetails {
    pub location: Location,
    pub address: String,
    pub store_id: String,
    pub estimated_wait_minutes: u32,
    pub open_window: Option<TimeWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub location: Location,
    pub address: String,
    pub customer_id: String,
    pub preferred_window: Option<TimeWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub weight_kg: f64,
    pub volume_liters: f64,
    pub item_count: u32,
    pub requires_cold_chain: bool,
    pub fragile: bool,
    pub vehicle_requirement: VehicleRequirement,
}

/// A delivery order.
///
/// Status lifecycle: `pending_assignment -> assigned -> picked_up ->
/// delivered`, with side branches to `cancelled`. Only orders in
/// `pending_assignment` enter an assignment cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub created_at_ms: i64,
    pub sla_deadline_ms: i64,
    pub pickup: PickupDetails,
    pub delivery: DeliveryDetails,
    pub payload: Payload,
    pub priority: Priority,
    pub assignment_attempts: u32,
    pub assigned_rider_id: Option<RiderId>,
}

impl Order {
    /// Minutes until the SLA deadline at `now_ms` (negative if breached).
    pub fn sla_minutes_remaining(&self, now_ms: i64) -> f64 {
        (self.sla_deadline_ms - now_ms) as f64 / MINUTE_MS as f64
    }
}

// ---------------------------------------------------------------------------
// Riders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiderStatus {
    Active,
    OnDelivery,
    Break,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Bike,
    Car,
    Van,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Standard,
    Fragile,
    ColdChain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_type: VehicleType,
    pub max_weight_kg: f64,
    pub max_volume_liters: f64,
    pub max_items: u32,
    pub capabilities: HashSet<Capability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub start_ms: i64,
    pub end_ms: i64,
    pub continuous_driving_minutes: u32,
    pub total_shift_driving_minutes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Load {
    pub weight_kg: f64,
    pub volume_liters: f64,
    pub item_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Performance {
    /// Familiarity per zone key, each in [0, 1].
    pub zone_familiarity: HashMap<String, f64>,
    pub avg_delivery_success_rate: f64,
    pub avg_speed_multiplier: f64,
    pub total_deliveries: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Pickup,
    Delivery,
}

/// One stop in a rider's planned route. Each assigned order contributes a
/// pickup stop and a delivery stop, pickup always sequenced first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub kind: StopKind,
    pub order_id: OrderId,
    pub location: Location,
    pub sequence_index: usize,
    pub estimated_arrival_ms: Option<i64>,
    pub estimated_departure_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: RiderId,
    pub status: RiderStatus,
    pub location: Location,
    pub vehicle: Vehicle,
    pub shift: Shift,
    pub load: Load,
    pub performance: Performance,
    /// Order ids in assignment order; an order's position here is the
    /// sequence index reported in its assignment decision.
    pub current_assignments: Vec<OrderId>,
    pub current_route: Vec<RouteStop>,
}

impl Rider {
    /// Riders on break or offline never enter candidacy.
    pub fn is_available(&self) -> bool {
        matches!(self.status, RiderStatus::Active | RiderStatus::OnDelivery)
    }

    pub fn remaining_weight_kg(&self) -> f64 {
        (self.vehicle.max_weight_kg - self.load.weight_kg).max(0.0)
    }

    pub fn remaining_volume_liters(&self) -> f64 {
        (self.vehicle.max_volume_liters - self.load.volume_liters).max(0.0)
    }

    pub fn remaining_items(&self) -> u32 {
        self.vehicle.max_items.saturating_sub(self.load.item_count)
    }
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Dispatched,
    Accepted,
    Rejected,
    Reassigned,
    Completed,
}

/// Per-factor costs for one scored (order, rider) pair. Each factor is the
/// normalized pre-weight value (affinity is signed); `total` is the
/// weighted sum.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub time_cost: f64,
    pub sla_risk_cost: f64,
    pub distance_cost: f64,
    pub batch_disruption_cost: f64,
    pub workload_cost: f64,
    pub affinity_cost: f64,
    pub total: f64,
}

/// A live order -> rider binding. Unique per order at any time; the engine
/// replaces rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub order_id: OrderId,
    pub rider_id: RiderId,
    pub assigned_at_ms: i64,
    pub cycle_id: String,
    pub cost_breakdown: CostBreakdown,
    pub estimated_pickup_at_ms: i64,
    pub estimated_delivery_at_ms: i64,
    pub sla_deadline_ms: i64,
    pub sla_slack_minutes: f64,
    pub reassignment_count: u32,
    pub status: AssignmentStatus,
}

impl Assignment {
    /// The delivery duration this assignment promised, in minutes.
    pub fn promised_duration_minutes(&self) -> f64 {
        (self.estimated_delivery_at_ms - self.assigned_at_ms) as f64 / MINUTE_MS as f64
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self.status,
            AssignmentStatus::Dispatched | AssignmentStatus::Accepted
        )
    }
}

/// Zone key used by rider familiarity scores and surge clustering:
/// half-degree lat/lng buckets.
pub fn zone_key(location: Location) -> String {
    format!(
        "zone_{}_{}",
        (location.lat / 0.5).floor() as i64,
        (location.lng / 0.5).floor() as i64
    )
}
