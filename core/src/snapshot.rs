//! Point-in-time capture of every ledger, registry and log, as JSON.
//!
//! The engine never writes a snapshot anywhere. A collaborator that wants
//! state to survive a restart takes one with `AnalyticsEngine::snapshot()`
//! and hands it back to `AnalyticsEngine::restore()`.

use crate::{
    fraud_detection_subsystem::SuspiciousActivity,
    ledger::TransactionRecord,
    order_tracking_subsystem::OrderHistory,
    stock_monitor_subsystem::ProductWatch,
    types::{EntityId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub version:           u32,
    pub taken_at:          Timestamp,
    pub customer_ledger:   BTreeMap<EntityId, Vec<TransactionRecord>>,
    pub network_ledger:    BTreeMap<String, Vec<TransactionRecord>>,
    pub device_ledger:     BTreeMap<EntityId, Vec<TransactionRecord>>,
    pub suspicious:        Vec<SuspiciousActivity>,
    pub products:          Vec<ProductWatch>,
    pub orders:            Vec<OrderHistory>,
}

impl AnalyticsSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
