use chrono::Duration;
use serde::{Deserialize, Serialize};

// ── Fraud scoring ──────────────────────────────────────────────────

/// Rule thresholds. Reported verbatim in the fraud summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudThresholds {
    /// Rolling spend (window + current amount) above which a customer is flagged.
    pub max_amount_per_hour: f64,
    /// Prior transactions in the rate window at which a customer is flagged.
    pub max_orders_per_hour: usize,
    /// Reserved. Not referenced by any scoring rule.
    pub max_failed_payments: u32,
    /// Single-transaction amount above which the transaction is flagged.
    pub suspicious_amount: f64,
    /// Amount above which a customer with no retained history is flagged.
    pub new_customer_limit: f64,
    pub max_ip_transactions_per_hour: usize,
    pub max_device_transactions_per_hour: usize,
}

impl Default for FraudThresholds {
    fn default() -> Self {
        Self {
            max_amount_per_hour: 1000.0,
            max_orders_per_hour: 5,
            max_failed_payments: 3,
            suspicious_amount: 500.0,
            new_customer_limit: 200.0,
            max_ip_transactions_per_hour: 3,
            max_device_transactions_per_hour: 3,
        }
    }
}

/// Score contributions per factor and the classification cut-offs.
/// Cut-offs compare against the unclamped accumulated score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudWeights {
    pub high_frequency: f64,
    pub high_amount: f64,
    pub new_customer: f64,
    pub shared_ip: f64,
    pub shared_device: f64,
    pub suspicious_amount: f64,
    pub fraud_threshold: f64,
    pub block_threshold: f64,
    pub review_threshold: f64,
}

impl Default for FraudWeights {
    fn default() -> Self {
        Self {
            high_frequency: 0.3,
            high_amount: 0.4,
            new_customer: 0.5,
            shared_ip: 0.2,
            shared_device: 0.2,
            suspicious_amount: 0.3,
            fraud_threshold: 0.7,
            block_threshold: 0.8,
            review_threshold: 0.5,
        }
    }
}

// ── Retention ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Ledger records older than this are evicted.
    pub horizon_secs: i64,
    /// Trailing window for the frequency and amount rules.
    pub rate_window_secs: i64,
    /// Hard cap per ledger key; the oldest record is dropped on overflow.
    pub max_records_per_key: usize,
    /// Run a whole-ledger sweep after every N assessments. 1 sweeps after
    /// each one; 0 leaves idle keys to explicit or background sweeps.
    pub full_sweep_every: u64,
    /// Interval for the optional background sweeper thread.
    pub sweep_interval_secs: Option<u64>,
    pub suspicious_log_capacity: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon_secs: 24 * 3600,
            rate_window_secs: 3600,
            max_records_per_key: 10_000,
            full_sweep_every: 1,
            sweep_interval_secs: None,
            suspicious_log_capacity: 1000,
        }
    }
}

impl RetentionConfig {
    /// Saturates at `Duration::MAX` for values `validate` would reject.
    pub fn horizon(&self) -> Duration {
        Duration::try_seconds(self.horizon_secs).unwrap_or(Duration::MAX)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::try_seconds(self.rate_window_secs).unwrap_or(Duration::MAX)
    }

    pub fn sweep_interval(&self) -> Option<std::time::Duration> {
        self.sweep_interval_secs.map(std::time::Duration::from_secs)
    }
}

// ── Stock ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockConfig {
    /// Threshold used for a product until one is explicitly set.
    pub default_threshold: i64,
    /// Stock at or below this is CRITICAL regardless of the product threshold.
    pub critical_level: i64,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self { default_threshold: 10, critical_level: 5 }
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub fraud: FraudThresholds,
    pub weights: FraudWeights,
    pub retention: RetentionConfig,
    pub stock: StockConfig,
}

impl AnalyticsConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    /// In tests, use AnalyticsConfig::default().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AnalyticsConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        log::info!("Loaded analytics config from {path}");
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let r = &self.retention;
        if r.rate_window_secs <= 0 {
            anyhow::bail!("retention.rate_window_secs must be positive");
        }
        if Duration::try_seconds(r.rate_window_secs).is_none() {
            anyhow::bail!("retention.rate_window_secs ({}) is out of range", r.rate_window_secs);
        }
        if Duration::try_seconds(r.horizon_secs).is_none() {
            anyhow::bail!("retention.horizon_secs ({}) is out of range", r.horizon_secs);
        }
        if r.horizon_secs < r.rate_window_secs {
            anyhow::bail!(
                "retention.horizon_secs ({}) is shorter than the rate window ({})",
                r.horizon_secs,
                r.rate_window_secs
            );
        }
        if r.max_records_per_key == 0 {
            anyhow::bail!("retention.max_records_per_key must be at least 1");
        }
        if r.sweep_interval_secs == Some(0) {
            anyhow::bail!("retention.sweep_interval_secs must be positive when set");
        }
        Ok(())
    }
}
