//! Fraud Detection subsystem.
//!
//! For each transaction this subsystem:
//!   1. Reads the rate window for the customer, network address and device
//!   2. Scores velocity, rolling spend, new-customer and amount factors
//!   3. Classifies the accumulated score into ALLOW / REVIEW / BLOCK
//!   4. Appends the scored record to every axis present
//!   5. Prunes the touched keys back to the retention horizon
//!
//! Scoring reads three independent ledgers without holding them together.
//! A concurrent transaction for the same customer may be missed by this
//! assessment; it is always recorded.

use crate::{
    config::{AnalyticsConfig, FraudThresholds, FraudWeights, RetentionConfig},
    event::Transaction,
    ledger::{LedgerAxis, TransactionRecord, WindowedLedger},
    types::{EntityId, Timestamp},
};
use chrono::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

// ── Data Structures ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Allow,
    Review,
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAssessment {
    pub is_fraudulent:     bool,
    /// Accumulated score clamped to [0, 1]. This is the reported value.
    pub risk_score:        f64,
    /// Unclamped sum of factor weights. Classification uses this.
    pub accumulated_score: f64,
    pub risk_factors:      Vec<String>,
    pub recommendation:    Recommendation,
}

impl FraudAssessment {
    fn classify(accumulated: f64, risk_factors: Vec<String>, weights: &FraudWeights) -> Self {
        let recommendation = if accumulated > weights.block_threshold {
            Recommendation::Block
        } else if accumulated > weights.review_threshold {
            Recommendation::Review
        } else {
            Recommendation::Allow
        };
        Self {
            is_fraudulent: accumulated > weights.fraud_threshold,
            risk_score: accumulated.clamp(0.0, 1.0),
            accumulated_score: accumulated,
            risk_factors,
            recommendation,
        }
    }
}

/// An assessment that did not come back ALLOW, kept for the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousActivity {
    pub customer_id:     Option<EntityId>,
    pub network_address: Option<String>,
    pub device_id:       Option<EntityId>,
    pub amount:          f64,
    pub risk_score:      f64,
    pub recommendation:  Recommendation,
    pub risk_factors:    Vec<String>,
    pub transaction_at:  Timestamp,
    /// Engine clock at assessment time. Drives the recent-activity count.
    pub detected_at:     Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSummary {
    pub total_suspicious:    usize,
    pub recent_suspicious:   usize,
    pub customers_monitored: usize,
    pub ips_monitored:       usize,
    pub devices_monitored:   usize,
    pub thresholds:          FraudThresholds,
}

// ── Subsystem ────────────────────────────────────────────────────────────────

pub struct FraudDetectionSubsystem {
    thresholds:        FraudThresholds,
    weights:           FraudWeights,
    retention:         RetentionConfig,
    customers:         WindowedLedger,
    network_addresses: WindowedLedger,
    devices:           WindowedLedger,
    suspicious:        Mutex<VecDeque<SuspiciousActivity>>,
}

impl FraudDetectionSubsystem {
    pub fn new(config: &AnalyticsConfig) -> Self {
        let cap = config.retention.max_records_per_key;
        Self {
            thresholds:        config.fraud.clone(),
            weights:           config.weights.clone(),
            retention:         config.retention.clone(),
            customers:         WindowedLedger::new(LedgerAxis::Customer, cap),
            network_addresses: WindowedLedger::new(LedgerAxis::NetworkAddress, cap),
            devices:           WindowedLedger::new(LedgerAxis::Device, cap),
            suspicious:        Mutex::new(VecDeque::new()),
        }
    }

    pub fn ledger(&self, axis: LedgerAxis) -> &WindowedLedger {
        match axis {
            LedgerAxis::Customer       => &self.customers,
            LedgerAxis::NetworkAddress => &self.network_addresses,
            LedgerAxis::Device         => &self.devices,
        }
    }

    /// Score, record and prune. `now` is the engine clock; the rate
    /// window is measured from the transaction's own timestamp.
    pub fn assess(&self, txn: &Transaction, now: Timestamp) -> FraudAssessment {
        let assessment = self.score(txn, now);

        if assessment.recommendation == Recommendation::Block {
            log::warn!(
                "BLOCK recommended: customer={:?} amount={:.2} score={:.2} factors={:?}",
                txn.customer_id,
                txn.amount,
                assessment.accumulated_score,
                assessment.risk_factors
            );
        } else {
            log::debug!(
                "assessed customer={:?} amount={:.2} score={:.2} -> {:?}",
                txn.customer_id,
                txn.amount,
                assessment.accumulated_score,
                assessment.recommendation
            );
        }

        self.record(txn, &assessment, now);
        assessment
    }

    /// Compute the assessment against current ledger state without
    /// recording anything. Records older than the horizon at `now` are
    /// ignored even if no sweep has evicted them yet.
    pub fn score(&self, txn: &Transaction, now: Timestamp) -> FraudAssessment {
        let window = self.retention.rate_window();
        let window_label = describe_window(window);
        let th = &self.thresholds;
        let w = &self.weights;

        let mut score = 0.0;
        let mut factors = Vec::new();

        // Customer: frequency, rolling spend, first-seen amount
        if let Some(customer_id) = &txn.customer_id {
            let recent = self.customers.records_within(customer_id, txn.timestamp, window);

            if recent.len() >= th.max_orders_per_hour {
                score += w.high_frequency;
                factors.push(format!(
                    "High transaction frequency: {} in {window_label}",
                    recent.len()
                ));
            }

            let total: f64 = recent.iter().map(|r| r.amount).sum::<f64>() + txn.amount;
            if total > th.max_amount_per_hour {
                score += w.high_amount;
                factors.push(format!("High amount in {window_label}: ${total:.2}"));
            }

            let seen = self.customers.any_within(customer_id, now, self.retention.horizon());
            if !seen && txn.amount > th.new_customer_limit {
                score += w.new_customer;
                factors.push(format!("New customer with high amount: ${:.2}", txn.amount));
            }
        }

        if let Some(address) = &txn.network_address {
            let count = self.network_addresses.records_within(address, txn.timestamp, window).len();
            if count >= th.max_ip_transactions_per_hour {
                score += w.shared_ip;
                factors.push(format!("Multiple transactions from same IP: {count}"));
            }
        }

        if let Some(device_id) = &txn.device_id {
            let count = self.devices.records_within(device_id, txn.timestamp, window).len();
            if count >= th.max_device_transactions_per_hour {
                score += w.shared_device;
                factors.push(format!("Multiple transactions from same device: {count}"));
            }
        }

        if txn.amount > th.suspicious_amount {
            score += w.suspicious_amount;
            factors.push(format!("Suspicious amount: ${:.2}", txn.amount));
        }

        FraudAssessment::classify(score, factors, w)
    }

    fn record(&self, txn: &Transaction, assessment: &FraudAssessment, now: Timestamp) {
        let record = Arc::new(TransactionRecord {
            customer_id:     txn.customer_id.clone(),
            amount:          txn.amount,
            network_address: txn.network_address.clone(),
            device_id:       txn.device_id.clone(),
            timestamp:       txn.timestamp,
            risk_score:      assessment.accumulated_score,
            risk_factors:    assessment.risk_factors.clone(),
        });

        let horizon = self.retention.horizon();
        let axes = [
            (&self.customers, &txn.customer_id),
            (&self.network_addresses, &txn.network_address),
            (&self.devices, &txn.device_id),
        ];
        for (ledger, key) in axes {
            if let Some(key) = key {
                ledger.append(key, Arc::clone(&record));
                ledger.prune_key(key, now, horizon);
            }
        }

        if assessment.recommendation != Recommendation::Allow {
            self.push_suspicious(SuspiciousActivity {
                customer_id:     txn.customer_id.clone(),
                network_address: txn.network_address.clone(),
                device_id:       txn.device_id.clone(),
                amount:          txn.amount,
                risk_score:      assessment.risk_score,
                recommendation:  assessment.recommendation,
                risk_factors:    assessment.risk_factors.clone(),
                transaction_at:  txn.timestamp,
                detected_at:     now,
            });
        }
    }

    fn push_suspicious(&self, activity: SuspiciousActivity) {
        let capacity = self.retention.suspicious_log_capacity;
        if capacity == 0 {
            return;
        }
        let mut entries = self.suspicious.lock();
        while entries.len() >= capacity {
            entries.pop_front();
        }
        entries.push_back(activity);
    }

    /// Evict stale records from all three ledgers. Returns records removed.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let horizon = self.retention.horizon();
        self.customers.prune(now, horizon)
            + self.network_addresses.prune(now, horizon)
            + self.devices.prune(now, horizon)
    }

    pub fn summary(&self, now: Timestamp) -> FraudSummary {
        let cutoff = now.checked_sub_signed(self.retention.rate_window());
        let (total, recent) = {
            let entries = self.suspicious.lock();
            let recent = match cutoff {
                Some(cutoff) => entries.iter().filter(|a| a.detected_at > cutoff).count(),
                None => entries.len(),
            };
            (entries.len(), recent)
        };
        FraudSummary {
            total_suspicious:    total,
            recent_suspicious:   recent,
            customers_monitored: self.customers.key_count(),
            ips_monitored:       self.network_addresses.key_count(),
            devices_monitored:   self.devices.key_count(),
            thresholds:          self.thresholds.clone(),
        }
    }

    pub fn suspicious_activity(&self) -> Vec<SuspiciousActivity> {
        self.suspicious.lock().iter().cloned().collect()
    }

    pub(crate) fn restore_suspicious(&self, activity: Vec<SuspiciousActivity>) {
        for item in activity {
            self.push_suspicious(item);
        }
    }
}

/// "1 hour", "2 hours", "30 minutes".
fn describe_window(window: Duration) -> String {
    let secs = window.num_seconds();
    if secs > 0 && secs % 3600 == 0 {
        match secs / 3600 {
            1 => "1 hour".to_string(),
            h => format!("{h} hours"),
        }
    } else {
        match window.num_minutes() {
            1 => "1 minute".to_string(),
            m => format!("{m} minutes"),
        }
    }
}
