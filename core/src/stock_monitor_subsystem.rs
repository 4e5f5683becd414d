//! Stock Monitor subsystem.
//!
//! Keeps one entry per product: its threshold and the latest alert.
//! A supplied threshold overwrites the stored one; an omitted threshold
//! falls back to the stored one, or the configured default on first sight.
//!
//! CRITICAL is decided by the absolute critical level, independent of
//! the product threshold.

use crate::{
    config::StockConfig,
    error::{AnalyticsError, AnalyticsResult},
    types::{EntityId, Timestamp},
};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAlert {
    pub product_id:    EntityId,
    pub product_name:  String,
    pub current_stock: i64,
    pub threshold:     i64,
    pub severity:      Severity,
    pub alert_needed:  bool,
    pub timestamp:     Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSummary {
    pub total_alerts:       usize,
    pub critical_count:     usize,
    pub warning_count:      usize,
    pub active_alerts:      usize,
    pub products_monitored: usize,
}

/// Registry entry: the persisted threshold plus the latest alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductWatch {
    pub threshold: i64,
    pub latest:    StockAlert,
}

pub struct StockMonitorSubsystem {
    config:   StockConfig,
    registry: DashMap<EntityId, ProductWatch>,
}

impl StockMonitorSubsystem {
    pub fn new(config: StockConfig) -> Self {
        Self { config, registry: DashMap::new() }
    }

    pub fn monitor(
        &self,
        product_id: &str,
        product_name: &str,
        current_stock: i64,
        threshold: Option<i64>,
        now: Timestamp,
    ) -> AnalyticsResult<StockAlert> {
        if product_id.trim().is_empty() {
            return Err(AnalyticsError::validation("product_id", "must not be empty"));
        }

        // The entry guard holds the shard lock for the whole read-modify-write.
        let alert = match self.registry.entry(product_id.to_string()) {
            Entry::Occupied(mut slot) => {
                let threshold = threshold.unwrap_or(slot.get().threshold);
                let alert = self.build_alert(product_id, product_name, current_stock, threshold, now);
                slot.insert(ProductWatch { threshold, latest: alert.clone() });
                alert
            }
            Entry::Vacant(slot) => {
                let threshold = threshold.unwrap_or(self.config.default_threshold);
                let alert = self.build_alert(product_id, product_name, current_stock, threshold, now);
                slot.insert(ProductWatch { threshold, latest: alert.clone() });
                alert
            }
        };

        if alert.severity == Severity::Critical {
            log::warn!(
                "CRITICAL stock: {} ({}) at {} units",
                alert.product_name,
                alert.product_id,
                alert.current_stock
            );
        }
        Ok(alert)
    }

    fn build_alert(
        &self,
        product_id: &str,
        product_name: &str,
        current_stock: i64,
        threshold: i64,
        now: Timestamp,
    ) -> StockAlert {
        StockAlert {
            product_id:    product_id.to_string(),
            product_name:  product_name.to_string(),
            current_stock,
            threshold,
            severity:      self.classify(current_stock, threshold),
            alert_needed:  current_stock <= threshold,
            timestamp:     now,
        }
    }

    fn classify(&self, current_stock: i64, threshold: i64) -> Severity {
        if current_stock <= self.config.critical_level {
            Severity::Critical
        } else if current_stock <= threshold {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    pub fn stock_alert(&self, product_id: &str) -> Option<StockAlert> {
        self.registry.get(product_id).map(|w| w.latest.clone())
    }

    /// Stored threshold, or None if the product was never monitored.
    pub fn threshold_for(&self, product_id: &str) -> Option<i64> {
        self.registry.get(product_id).map(|w| w.threshold)
    }

    /// Latest alerts that need action, CRITICAL first, then lowest stock.
    pub fn alerts_needing_attention(&self) -> Vec<StockAlert> {
        let mut alerts: Vec<StockAlert> = self
            .registry
            .iter()
            .filter(|w| w.latest.alert_needed)
            .map(|w| w.latest.clone())
            .collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.current_stock.cmp(&b.current_stock))
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        alerts
    }

    pub fn summary(&self) -> StockSummary {
        let mut summary = StockSummary {
            total_alerts:       0,
            critical_count:     0,
            warning_count:      0,
            active_alerts:      0,
            products_monitored: 0,
        };
        for watch in self.registry.iter() {
            summary.total_alerts += 1;
            match watch.latest.severity {
                Severity::Critical => summary.critical_count += 1,
                Severity::Warning  => summary.warning_count += 1,
                Severity::Normal   => {}
            }
            if watch.latest.alert_needed {
                summary.active_alerts += 1;
            }
        }
        summary.products_monitored = summary.total_alerts;
        summary
    }

    pub(crate) fn export(&self) -> Vec<ProductWatch> {
        let mut watches: Vec<ProductWatch> = self.registry.iter().map(|w| w.value().clone()).collect();
        watches.sort_by(|a, b| a.latest.product_id.cmp(&b.latest.product_id));
        watches
    }

    pub(crate) fn import(&self, watches: Vec<ProductWatch>) {
        for watch in watches {
            self.registry.insert(watch.latest.product_id.clone(), watch);
        }
    }
}
