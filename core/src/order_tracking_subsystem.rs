//! Order Tracking subsystem.
//!
//! A passive, append-only ledger of status transitions per order.
//! Statuses are free-form: any transition is recorded as-is.
//!
//! RULE: The current status and the history live in one registry entry
//! and change under one lock, so `current_status` always equals the
//! `new_status` of the last event.

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    types::{EntityId, OrderStatus, Timestamp, UNKNOWN_STATUS},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusEvent {
    pub order_id:        EntityId,
    pub previous_status: OrderStatus,
    pub new_status:      OrderStatus,
    pub customer_id:     EntityId,
    pub total_amount:    f64,
    pub timestamp:       Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub order_id:             EntityId,
    pub current_status:       OrderStatus,
    pub status_history:       Vec<OrderStatusEvent>,
    pub last_updated:         Timestamp,
    pub total_status_changes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHistory {
    pub order_id:       EntityId,
    pub current_status: OrderStatus,
    pub events:         Vec<OrderStatusEvent>,
}

pub struct OrderTrackingSubsystem {
    orders: DashMap<EntityId, OrderHistory>,
}

impl OrderTrackingSubsystem {
    pub fn new() -> Self {
        Self { orders: DashMap::new() }
    }

    pub fn record_status_change(
        &self,
        order_id: &str,
        new_status: &str,
        customer_id: &str,
        total_amount: f64,
        now: Timestamp,
    ) -> AnalyticsResult<OrderStatusEvent> {
        if order_id.trim().is_empty() {
            return Err(AnalyticsError::validation("order_id", "must not be empty"));
        }
        if !total_amount.is_finite() {
            return Err(AnalyticsError::validation(
                "total_amount",
                format!("must be a finite number, got {total_amount}"),
            ));
        }

        let mut history = self
            .orders
            .entry(order_id.to_string())
            .or_insert_with(|| OrderHistory {
                order_id:       order_id.to_string(),
                current_status: UNKNOWN_STATUS.to_string(),
                events:         Vec::new(),
            });

        let event = OrderStatusEvent {
            order_id:        order_id.to_string(),
            previous_status: history.current_status.clone(),
            new_status:      new_status.to_string(),
            customer_id:     customer_id.to_string(),
            total_amount,
            timestamp:       now,
        };
        history.events.push(event.clone());
        history.current_status = new_status.to_string();

        log::debug!(
            "order {order_id}: {} -> {} ({} changes)",
            event.previous_status,
            event.new_status,
            history.events.len()
        );
        Ok(event)
    }

    /// Full tracking view, or None if the order was never recorded.
    pub fn tracking(&self, order_id: &str) -> Option<TrackingInfo> {
        let history = self.orders.get(order_id)?;
        let last = history.events.last()?;
        Some(TrackingInfo {
            order_id:             history.order_id.clone(),
            current_status:       history.current_status.clone(),
            status_history:       history.events.clone(),
            last_updated:         last.timestamp,
            total_status_changes: history.events.len(),
        })
    }

    pub fn current_status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.get(order_id).map(|h| h.current_status.clone())
    }

    pub fn orders_tracked(&self) -> usize {
        self.orders.len()
    }

    pub(crate) fn export(&self) -> Vec<OrderHistory> {
        let mut histories: Vec<OrderHistory> = self.orders.iter().map(|h| h.value().clone()).collect();
        histories.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        histories
    }

    /// Current status is rebuilt from the last event, whatever the
    /// snapshot claims. Histories with no events are dropped.
    pub(crate) fn import(&self, histories: Vec<OrderHistory>) {
        for mut history in histories {
            let Some(last) = history.events.last() else {
                continue;
            };
            if history.current_status != last.new_status {
                log::warn!(
                    "order {}: snapshot status {:?} disagrees with last event {:?}",
                    history.order_id,
                    history.current_status,
                    last.new_status
                );
                history.current_status = last.new_status.clone();
            }
            self.orders.insert(history.order_id.clone(), history);
        }
    }
}

impl Default for OrderTrackingSubsystem {
    fn default() -> Self { Self::new() }
}
