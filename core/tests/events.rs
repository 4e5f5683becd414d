//! Event ingestion and snapshot round-trips through the engine.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pulse_core::{
    clock::ManualClock,
    config::AnalyticsConfig,
    engine::AnalyticsEngine,
    event::{BusinessEvent, EventOutcome},
    fraud_detection_subsystem::Recommendation,
    ledger::LedgerAxis,
    snapshot::AnalyticsSnapshot,
    stock_monitor_subsystem::Severity,
};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 20, 10, 0, 0).unwrap()
}

fn build_engine() -> (AnalyticsEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    (AnalyticsEngine::new(AnalyticsConfig::default(), clock.clone()), clock)
}

fn parse(json: &str) -> BusinessEvent {
    serde_json::from_str(json).expect("valid event json")
}

#[test]
fn ingest_routes_each_event_kind() {
    let (engine, _) = build_engine();

    let txn = parse(
        r#"{"type":"transaction","customer_id":"c1","amount":1500.0,
            "ip_address":"10.0.0.1","timestamp":"2024-08-20T10:00:00Z"}"#,
    );
    match engine.ingest(txn).unwrap() {
        EventOutcome::FraudAssessment(a) => {
            assert_eq!(a.recommendation, Recommendation::Block);
        }
        other => panic!("expected assessment, got {other:?}"),
    }

    let stock = parse(
        r#"{"type":"inventory_level","product_id":"p1","product_name":"Lamp","current_stock":3}"#,
    );
    let outcome = engine.ingest(stock).unwrap();
    assert!(outcome.needs_notification());
    match outcome {
        EventOutcome::StockAlert(a) => assert_eq!(a.severity, Severity::Critical),
        other => panic!("expected stock alert, got {other:?}"),
    }

    let order = parse(
        r#"{"type":"order_status","order_id":"o1","new_status":"confirmed",
            "customer_id":"c1","total_amount":42.0}"#,
    );
    let outcome = engine.ingest(order).unwrap();
    assert!(!outcome.needs_notification());
    assert_eq!(engine.get_order_tracking("o1").unwrap().current_status, "confirmed");
}

#[test]
fn ingest_rejects_invalid_transaction_without_mutation() {
    let (engine, _) = build_engine();
    let event = parse(r#"{"type":"transaction","customer_id":"c1","amount":10.0}"#);
    let err = engine.ingest(event).unwrap_err();
    assert!(err.is_validation(), "unexpected error: {err}");
    assert_eq!(engine.fraud_summary().customers_monitored, 0);
}

#[test]
fn outcomes_serialize_with_uppercase_recommendation() {
    let (engine, _) = build_engine();
    let event = parse(
        r#"{"type":"transaction","amount":25.0,"timestamp":"2024-08-20T10:00:00"}"#,
    );
    let outcome = engine.ingest(event).unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["type"], "fraud_assessment");
    assert_eq!(json["recommendation"], "ALLOW");
    assert_eq!(json["is_fraudulent"], false);
}

#[test]
fn snapshot_restores_all_state() {
    let (engine, _) = build_engine();
    for i in 0..6 {
        let event = parse(&format!(
            r#"{{"type":"transaction","customer_id":"c1","amount":50.0,
                "device_id":"d1","timestamp":"2024-08-20T10:0{i}:00Z"}}"#
        ));
        engine.ingest(event).unwrap();
    }
    engine.monitor_stock("p1", "Lamp", 30, Some(40)).unwrap();
    engine.record_order_status("o1", "pending", "c1", 300.0).unwrap();
    engine.record_order_status("o1", "shipped", "c1", 300.0).unwrap();

    let json = engine.snapshot().to_json().unwrap();
    let snapshot = AnalyticsSnapshot::from_json(&json).unwrap();

    let clock = Arc::new(ManualClock::new(t0() + Duration::minutes(10)));
    let restored = AnalyticsEngine::restore(AnalyticsConfig::default(), clock, snapshot).unwrap();

    assert_eq!(restored.fraud().ledger(LedgerAxis::Customer).len_for("c1"), 6);
    assert_eq!(restored.fraud().ledger(LedgerAxis::Device).len_for("d1"), 6);
    assert_eq!(restored.stock().threshold_for("p1"), Some(40));
    let tracking = restored.get_order_tracking("o1").unwrap();
    assert_eq!(tracking.current_status, "shipped");
    assert_eq!(tracking.total_status_changes, 2);

    // The restored ledger keeps scoring where the first engine left off.
    let next = parse(
        r#"{"type":"transaction","customer_id":"c1","amount":50.0,"timestamp":"2024-08-20T10:07:00Z"}"#,
    );
    match restored.ingest(next).unwrap() {
        EventOutcome::FraudAssessment(a) => assert!(
            a.risk_factors.iter().any(|f| f.starts_with("High transaction frequency: 6")),
            "factors: {:?}",
            a.risk_factors
        ),
        other => panic!("expected assessment, got {other:?}"),
    }
}

#[test]
fn restore_drops_records_past_the_horizon() {
    let (engine, _) = build_engine();
    engine
        .ingest(parse(
            r#"{"type":"transaction","customer_id":"c1","amount":5.0,"timestamp":"2024-08-20T10:00:00Z"}"#,
        ))
        .unwrap();
    let snapshot = engine.snapshot();

    let clock = Arc::new(ManualClock::new(t0() + Duration::days(2)));
    let restored = AnalyticsEngine::restore(AnalyticsConfig::default(), clock, snapshot).unwrap();
    assert_eq!(restored.fraud_summary().customers_monitored, 0);
}

#[test]
fn restore_rebuilds_current_status_from_history() {
    let (engine, clock) = build_engine();
    engine.record_order_status("o1", "pending", "c1", 80.0).unwrap();
    engine.record_order_status("o1", "shipped", "c1", 80.0).unwrap();

    let mut snapshot = engine.snapshot();
    snapshot.orders[0].current_status = "pending".to_string();

    let restored = AnalyticsEngine::restore(AnalyticsConfig::default(), clock, snapshot).unwrap();
    assert_eq!(restored.orders().current_status("o1").as_deref(), Some("shipped"));
    assert_eq!(restored.get_order_tracking("o1").unwrap().current_status, "shipped");
}

#[test]
fn restore_rejects_unknown_snapshot_version() {
    let (engine, clock) = build_engine();
    let mut snapshot = engine.snapshot();
    snapshot.version = 99;
    let result = AnalyticsEngine::restore(AnalyticsConfig::default(), clock, snapshot);
    assert!(result.is_err());
}
