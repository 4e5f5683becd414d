//! Shared primitive types used across the entire engine.

use chrono::{DateTime, Utc};

/// Every instant the engine compares is a UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Customer, network address, device, product and order identifiers
/// are opaque strings owned by the collaborator.
pub type EntityId = String;

/// Order statuses are free-form; the tracker never validates transitions.
pub type OrderStatus = String;

/// Status recorded as `previous_status` for an order seen for the first time.
pub const UNKNOWN_STATUS: &str = "unknown";
