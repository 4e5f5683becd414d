//! SQLite outcome log.
//!
//! RULE: Only store.rs talks to the database.
//! The runner hands it engine outcomes; it never reads engine state.

use anyhow::Result;
use pulse_core::{
    event::EventOutcome,
    fraud_detection_subsystem::FraudAssessment,
    order_tracking_subsystem::OrderStatusEvent,
    stock_monitor_subsystem::{Severity, StockAlert},
    types::Timestamp,
};
use rusqlite::{params, Connection};
use uuid::Uuid;

pub struct AnalyticsStore {
    conn: Connection,
}

impl AnalyticsStore {
    /// Open (or create) the outcome database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(include_str!("../migrations/001_analytics.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str, started_at: Timestamp) -> Result<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed as i64, version, started_at.to_rfc3339()],
        )?;
        Ok(())
    }

    // ── Outcomes ───────────────────────────────────────────────

    pub fn record_outcome(&self, run_id: &str, at: Timestamp, outcome: &EventOutcome) -> Result<()> {
        match outcome {
            EventOutcome::FraudAssessment(a)    => self.insert_assessment(run_id, at, a),
            EventOutcome::StockAlert(a)         => self.insert_stock_alert(run_id, a),
            EventOutcome::OrderStatusChanged(e) => self.insert_order_event(run_id, e),
        }
    }

    pub fn insert_assessment(&self, run_id: &str, at: Timestamp, a: &FraudAssessment) -> Result<()> {
        let recommendation = serde_json::to_value(a.recommendation)?;
        self.conn.execute(
            "INSERT INTO fraud_assessment
               (assessment_id, run_id, assessed_at, risk_score, is_fraudulent, recommendation, risk_factors)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::new_v4().to_string(),
                run_id,
                at.to_rfc3339(),
                a.risk_score,
                a.is_fraudulent,
                recommendation.as_str().unwrap_or_default(),
                serde_json::to_string(&a.risk_factors)?,
            ],
        )?;
        Ok(())
    }

    pub fn insert_stock_alert(&self, run_id: &str, a: &StockAlert) -> Result<()> {
        self.conn.execute(
            "INSERT INTO stock_alert
               (alert_id, run_id, product_id, product_name, current_stock, threshold,
                severity, alert_needed, alerted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                Uuid::new_v4().to_string(),
                run_id,
                a.product_id,
                a.product_name,
                a.current_stock,
                a.threshold,
                severity_label(a.severity),
                a.alert_needed,
                a.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_order_event(&self, run_id: &str, e: &OrderStatusEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO order_event
               (event_id, run_id, order_id, previous_status, new_status, customer_id,
                total_amount, changed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                run_id,
                e.order_id,
                e.previous_status,
                e.new_status,
                e.customer_id,
                e.total_amount,
                e.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────

    /// Assessments per recommendation, e.g. [("ALLOW", 812), ("BLOCK", 9)].
    pub fn recommendation_counts(&self, run_id: &str) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT recommendation, COUNT(*) FROM fraud_assessment
             WHERE run_id = ?1 GROUP BY recommendation ORDER BY recommendation",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stock_alert_count(&self, run_id: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM stock_alert WHERE run_id = ?1 AND alert_needed = 1",
            params![run_id],
            |row| row.get(0),
        )?)
    }

    pub fn order_event_count(&self, run_id: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM order_event WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?)
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Normal   => "normal",
        Severity::Warning  => "warning",
        Severity::Critical => "critical",
    }
}
