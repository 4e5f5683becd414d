//! The analytics engine: one explicitly constructed instance owning all
//! windowed state. Share it across request handlers behind an `Arc`.
//!
//! SUBSYSTEMS (independent, never call each other):
//!   1. Fraud detection: three windowed ledgers + suspicious-activity log
//!   2. Stock monitor: per-product threshold and latest alert
//!   3. Order tracking: per-order status history and current-status index
//!
//! RULES:
//!   - Every operation is synchronous, in-memory and bounded.
//!   - Input is validated before any subsystem is touched.
//!   - "Now" always comes from the engine clock.
//!   - The engine performs no I/O, persistence or notification.

use crate::{
    clock::{Clock, SystemClock},
    config::AnalyticsConfig,
    error::{AnalyticsError, AnalyticsResult},
    event::{BusinessEvent, EventOutcome, Transaction, TransactionInput},
    fraud_detection_subsystem::{FraudAssessment, FraudDetectionSubsystem, FraudSummary},
    ledger::LedgerAxis,
    order_tracking_subsystem::{OrderStatusEvent, OrderTrackingSubsystem, TrackingInfo},
    snapshot::{AnalyticsSnapshot, SNAPSHOT_VERSION},
    stock_monitor_subsystem::{StockAlert, StockMonitorSubsystem, StockSummary},
    types::Timestamp,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct AnalyticsEngine {
    config:      AnalyticsConfig,
    clock:       Arc<dyn Clock>,
    fraud:       FraudDetectionSubsystem,
    stock:       StockMonitorSubsystem,
    orders:      OrderTrackingSubsystem,
    assessments: AtomicU64,
}

impl AnalyticsEngine {
    pub fn new(config: AnalyticsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            fraud:       FraudDetectionSubsystem::new(&config),
            stock:       StockMonitorSubsystem::new(config.stock.clone()),
            orders:      OrderTrackingSubsystem::new(),
            assessments: AtomicU64::new(0),
            clock,
            config,
        }
    }

    /// Validate the config and build an engine on the wall clock.
    /// Call this at process start instead of new().
    pub fn build(config: AnalyticsConfig) -> AnalyticsResult<Self> {
        config.validate()?;
        log::info!(
            "analytics engine started: horizon={}s rate_window={}s",
            config.retention.horizon_secs,
            config.retention.rate_window_secs
        );
        Ok(Self::new(config, Arc::new(SystemClock)))
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn fraud(&self) -> &FraudDetectionSubsystem {
        &self.fraud
    }

    pub fn stock(&self) -> &StockMonitorSubsystem {
        &self.stock
    }

    pub fn orders(&self) -> &OrderTrackingSubsystem {
        &self.orders
    }

    // ── Fraud ──────────────────────────────────────────────────

    pub fn assess_transaction(&self, txn: &Transaction) -> AnalyticsResult<FraudAssessment> {
        txn.validate()?;
        let now = self.clock.now();
        let assessment = self.fraud.assess(txn, now);

        let every = self.config.retention.full_sweep_every;
        let count = self.assessments.fetch_add(1, Ordering::Relaxed) + 1;
        if every > 0 && count % every == 0 {
            self.fraud.sweep(now);
        }
        Ok(assessment)
    }

    /// Validate a raw transaction and assess it.
    pub fn assess_input(&self, input: TransactionInput) -> AnalyticsResult<FraudAssessment> {
        let txn = input.into_transaction()?;
        self.assess_transaction(&txn)
    }

    pub fn fraud_summary(&self) -> FraudSummary {
        self.fraud.summary(self.clock.now())
    }

    /// Evict stale records from every ledger. Returns records removed.
    pub fn sweep_retention(&self) -> usize {
        let removed = self.fraud.sweep(self.clock.now());
        if removed > 0 {
            log::debug!("retention sweep removed {removed} records");
        }
        removed
    }

    // ── Stock ──────────────────────────────────────────────────

    pub fn monitor_stock(
        &self,
        product_id: &str,
        product_name: &str,
        current_stock: i64,
        threshold: Option<i64>,
    ) -> AnalyticsResult<StockAlert> {
        self.stock
            .monitor(product_id, product_name, current_stock, threshold, self.clock.now())
    }

    pub fn stock_summary(&self) -> StockSummary {
        self.stock.summary()
    }

    // ── Orders ─────────────────────────────────────────────────

    pub fn record_order_status(
        &self,
        order_id: &str,
        new_status: &str,
        customer_id: &str,
        total_amount: f64,
    ) -> AnalyticsResult<OrderStatusEvent> {
        self.orders
            .record_status_change(order_id, new_status, customer_id, total_amount, self.clock.now())
    }

    pub fn get_order_tracking(&self, order_id: &str) -> Option<TrackingInfo> {
        self.orders.tracking(order_id)
    }

    // ── Events ─────────────────────────────────────────────────

    /// Route one business event to its subsystem.
    pub fn ingest(&self, event: BusinessEvent) -> AnalyticsResult<EventOutcome> {
        let kind = event.kind();
        let outcome = match event {
            BusinessEvent::Transaction(input) => {
                EventOutcome::FraudAssessment(self.assess_input(input)?)
            }
            BusinessEvent::InventoryLevel { product_id, product_name, current_stock, threshold } => {
                EventOutcome::StockAlert(
                    self.monitor_stock(&product_id, &product_name, current_stock, threshold)?,
                )
            }
            BusinessEvent::OrderStatus { order_id, new_status, customer_id, total_amount } => {
                EventOutcome::OrderStatusChanged(
                    self.record_order_status(&order_id, &new_status, &customer_id, total_amount)?,
                )
            }
        };
        log::trace!("ingested {kind} event");
        Ok(outcome)
    }

    // ── Snapshot ───────────────────────────────────────────────

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            version:         SNAPSHOT_VERSION,
            taken_at:        self.clock.now(),
            customer_ledger: self.fraud.ledger(LedgerAxis::Customer).export(),
            network_ledger:  self.fraud.ledger(LedgerAxis::NetworkAddress).export(),
            device_ledger:   self.fraud.ledger(LedgerAxis::Device).export(),
            suspicious:      self.fraud.suspicious_activity(),
            products:        self.stock.export(),
            orders:          self.orders.export(),
        }
    }

    /// Rebuild an engine from a snapshot. Stale ledger records are swept
    /// against the new clock before the engine is returned.
    pub fn restore(
        config: AnalyticsConfig,
        clock: Arc<dyn Clock>,
        snapshot: AnalyticsSnapshot,
    ) -> AnalyticsResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(AnalyticsError::validation(
                "snapshot",
                format!("unsupported version {} (expected {SNAPSHOT_VERSION})", snapshot.version),
            ));
        }
        config.validate()?;

        let engine = Self::new(config, clock);
        engine.fraud.ledger(LedgerAxis::Customer).import(snapshot.customer_ledger);
        engine.fraud.ledger(LedgerAxis::NetworkAddress).import(snapshot.network_ledger);
        engine.fraud.ledger(LedgerAxis::Device).import(snapshot.device_ledger);
        engine.fraud.restore_suspicious(snapshot.suspicious);
        engine.stock.import(snapshot.products);
        engine.orders.import(snapshot.orders);
        let swept = engine.sweep_retention();

        log::info!(
            "restored snapshot taken at {}: {} orders, {} products, {swept} stale records dropped",
            snapshot.taken_at,
            engine.orders.orders_tracked(),
            engine.stock.summary().products_monitored
        );
        Ok(engine)
    }
}
