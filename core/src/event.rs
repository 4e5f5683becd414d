//! Inbound business events and the outcomes the engine returns for them.
//!
//! RULE: Input is validated here, before it reaches any subsystem.
//! A rejected event never mutates engine state.

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    fraud_detection_subsystem::FraudAssessment,
    order_tracking_subsystem::OrderStatusEvent,
    stock_monitor_subsystem::StockAlert,
    types::{EntityId, Timestamp},
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A validated payment transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub customer_id:     Option<EntityId>,
    pub amount:          f64,
    pub network_address: Option<String>,
    pub device_id:       Option<EntityId>,
    pub timestamp:       Timestamp,
}

impl Transaction {
    pub fn new(amount: f64, timestamp: Timestamp) -> Self {
        Self {
            customer_id: None,
            amount,
            network_address: None,
            device_id: None,
            timestamp,
        }
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = non_blank(Some(customer_id.into()));
        self
    }

    pub fn network_address(mut self, address: impl Into<String>) -> Self {
        self.network_address = non_blank(Some(address.into()));
        self
    }

    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = non_blank(Some(device_id.into()));
        self
    }

    pub(crate) fn validate(&self) -> AnalyticsResult<()> {
        if !self.amount.is_finite() {
            return Err(AnalyticsError::validation(
                "amount",
                format!("must be a finite number, got {}", self.amount),
            ));
        }
        Ok(())
    }
}

/// A transaction as received from the collaborator: loosely typed,
/// timestamp still a string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionInput {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default, alias = "ip_address")]
    pub network_address: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl TransactionInput {
    pub fn into_transaction(self) -> AnalyticsResult<Transaction> {
        let amount = self
            .amount
            .ok_or_else(|| AnalyticsError::validation("amount", "is required"))?;
        let raw_ts = self
            .timestamp
            .ok_or_else(|| AnalyticsError::validation("timestamp", "is required"))?;
        let transaction = Transaction {
            customer_id:     non_blank(self.customer_id),
            amount,
            network_address: non_blank(self.network_address),
            device_id:       non_blank(self.device_id),
            timestamp:       parse_timestamp(&raw_ts)?,
        };
        transaction.validate()?;
        Ok(transaction)
    }
}

/// Parse an ISO-8601 timestamp. Offsets are honoured; a naive
/// date-time is taken as UTC. Date and time may be split by `T` or a space.
pub fn parse_timestamp(value: &str) -> AnalyticsResult<Timestamp> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| AnalyticsError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Every event the engine ingests.
/// Variants are added over time. Never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusinessEvent {
    Transaction(TransactionInput),
    InventoryLevel {
        product_id:    EntityId,
        product_name:  String,
        current_stock: i64,
        #[serde(default)]
        threshold:     Option<i64>,
    },
    OrderStatus {
        order_id:     EntityId,
        new_status:   String,
        customer_id:  EntityId,
        total_amount: f64,
    },
}

impl BusinessEvent {
    /// Stable name used for logging and persistence.
    pub fn kind(&self) -> &'static str {
        match self {
            BusinessEvent::Transaction(_)         => "transaction",
            BusinessEvent::InventoryLevel { .. }  => "inventory_level",
            BusinessEvent::OrderStatus { .. }     => "order_status",
        }
    }
}

/// The structured result of ingesting one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventOutcome {
    FraudAssessment(FraudAssessment),
    StockAlert(StockAlert),
    OrderStatusChanged(OrderStatusEvent),
}

impl EventOutcome {
    /// True when the collaborator should dispatch a notification.
    pub fn needs_notification(&self) -> bool {
        match self {
            EventOutcome::FraudAssessment(a)    => a.is_fraudulent,
            EventOutcome::StockAlert(a)         => a.alert_needed,
            EventOutcome::OrderStatusChanged(_) => false,
        }
    }
}
