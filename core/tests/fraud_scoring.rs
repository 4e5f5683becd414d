//! Fraud scoring: factor rules, classification, validation and the
//! suspicious-activity summary.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pulse_core::{
    clock::ManualClock,
    config::AnalyticsConfig,
    engine::AnalyticsEngine,
    error::AnalyticsError,
    event::{Transaction, TransactionInput},
    fraud_detection_subsystem::Recommendation,
    ledger::LedgerAxis,
};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn build_engine() -> (AnalyticsEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = AnalyticsEngine::new(AnalyticsConfig::default(), clock.clone());
    (engine, clock)
}

fn txn(customer: &str, amount: f64, minutes: i64) -> Transaction {
    Transaction::new(amount, t0() + Duration::minutes(minutes)).customer(customer)
}

/// Below every amount limit with no history on any axis: nothing fires.
#[test]
fn small_first_transaction_scores_zero() {
    let (engine, _) = build_engine();
    let t = txn("c-new", 150.0, 0).network_address("10.1.1.1").device("dev-1");

    let a = engine.assess_transaction(&t).unwrap();
    assert_eq!(a.risk_score, 0.0);
    assert_eq!(a.recommendation, Recommendation::Allow);
    assert!(!a.is_fraudulent);
    assert!(a.risk_factors.is_empty(), "unexpected factors: {:?}", a.risk_factors);
}

/// Without a customer id only the standalone amount rule can fire.
#[test]
fn anonymous_transaction_up_to_suspicious_amount_scores_zero() {
    let (engine, _) = build_engine();
    for amount in [0.0, 199.99, 350.0, 500.0] {
        let a = engine.assess_transaction(&Transaction::new(amount, t0())).unwrap();
        assert_eq!(a.risk_score, 0.0, "amount {amount} should not score");
        assert_eq!(a.recommendation, Recommendation::Allow);
    }
}

#[test]
fn amount_over_1000_always_flags_suspicious_amount() {
    let (engine, _) = build_engine();

    // Known customer with history.
    engine.assess_transaction(&txn("c1", 20.0, 0)).unwrap();
    let with_history = engine.assess_transaction(&txn("c1", 1500.0, 5)).unwrap();
    assert!(
        with_history.risk_factors.iter().any(|f| f.starts_with("Suspicious amount")),
        "factors: {:?}",
        with_history.risk_factors
    );

    // No axes at all.
    let anonymous = engine.assess_transaction(&Transaction::new(1500.0, t0())).unwrap();
    assert_eq!(anonymous.risk_factors, vec!["Suspicious amount: $1500.00".to_string()]);
    assert!((anonymous.risk_score - 0.3).abs() < 1e-9);
    assert_eq!(anonymous.recommendation, Recommendation::Allow);
}

#[test]
fn new_customer_large_first_purchase_is_blocked() {
    let (engine, _) = build_engine();
    let a = engine.assess_transaction(&txn("c-big", 1500.0, 0)).unwrap();

    // 0.4 rolling amount + 0.5 new customer + 0.3 suspicious amount
    assert!((a.accumulated_score - 1.2).abs() < 1e-9, "raw score {}", a.accumulated_score);
    assert_eq!(a.risk_score, 1.0, "reported score must be clamped");
    assert!(a.is_fraudulent);
    assert_eq!(a.recommendation, Recommendation::Block);
    assert_eq!(
        a.risk_factors,
        vec![
            "High amount in 1 hour: $1500.00".to_string(),
            "New customer with high amount: $1500.00".to_string(),
            "Suspicious amount: $1500.00".to_string(),
        ]
    );
}

#[test]
fn new_customer_mid_amount_sits_on_review_boundary() {
    let (engine, _) = build_engine();
    let a = engine.assess_transaction(&txn("c-mid", 300.0, 0)).unwrap();
    assert!((a.risk_score - 0.5).abs() < 1e-9);
    assert!(!a.is_fraudulent);
    // 0.5 is not strictly above the review cut-off.
    assert_eq!(a.recommendation, Recommendation::Allow);

    let second = engine.assess_transaction(&txn("c-mid", 300.0, 1)).unwrap();
    assert!(
        !second.risk_factors.iter().any(|f| f.starts_with("New customer")),
        "second purchase is no longer from a new customer"
    );
}

#[test]
fn sixth_transaction_in_an_hour_triggers_frequency() {
    let (engine, _) = build_engine();
    let mut last = None;
    for i in 0..6 {
        last = Some(engine.assess_transaction(&txn("c1", 50.0, i * 5)).unwrap());
    }
    let sixth = last.unwrap();
    assert!(
        sixth.risk_factors.contains(&"High transaction frequency: 5 in 1 hour".to_string()),
        "factors: {:?}",
        sixth.risk_factors
    );
    assert!(sixth.risk_score >= 0.3);
}

#[test]
fn fifth_shared_device_transaction_scores_higher_than_first() {
    let (engine, _) = build_engine();
    let mut scores = Vec::new();
    for i in 0..5 {
        let t = txn("c1", 100.0, i).network_address("10.0.0.9").device("dev-9");
        scores.push(engine.assess_transaction(&t).unwrap().risk_score);
    }
    assert!(scores[4] > scores[0], "scores: {scores:?}");
}

#[test]
fn rolling_amount_includes_current_transaction() {
    let (engine, _) = build_engine();
    engine.assess_transaction(&txn("c1", 150.0, 0)).unwrap();
    engine.assess_transaction(&txn("c1", 400.0, 10)).unwrap();
    let third = engine.assess_transaction(&txn("c1", 460.0, 20)).unwrap();
    assert!(
        third.risk_factors.contains(&"High amount in 1 hour: $1010.00".to_string()),
        "factors: {:?}",
        third.risk_factors
    );
}

#[test]
fn shared_network_address_flags_fourth_customer() {
    let (engine, _) = build_engine();
    let mut last = None;
    for i in 0..4 {
        let t = txn(&format!("c{i}"), 40.0, i).network_address("192.168.1.200");
        last = Some(engine.assess_transaction(&t).unwrap());
    }
    let fourth = last.unwrap();
    assert_eq!(fourth.risk_factors, vec!["Multiple transactions from same IP: 3".to_string()]);
    assert!((fourth.risk_score - 0.2).abs() < 1e-9);
}

#[test]
fn records_outside_rate_window_do_not_count() {
    let (engine, _) = build_engine();
    for i in 0..5 {
        engine.assess_transaction(&txn("c1", 50.0, i)).unwrap();
    }
    let later = engine.assess_transaction(&txn("c1", 50.0, 65)).unwrap();
    assert!(
        later.risk_factors.is_empty(),
        "only records under an hour old should count: {:?}",
        later.risk_factors
    );
}

#[test]
fn identical_input_on_fresh_engines_scores_identically() {
    let inputs: Vec<Transaction> = (0..8)
        .map(|i| txn("c1", 90.0 + i as f64 * 30.0, i).network_address("10.0.0.1").device("d1"))
        .collect();

    let run = || {
        let (engine, _) = build_engine();
        inputs
            .iter()
            .map(|t| engine.assess_transaction(t).unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn score_does_not_record() {
    let (engine, _) = build_engine();
    let t = txn("c1", 50.0, 0);
    let first = engine.fraud().score(&t, engine.now());
    let second = engine.fraud().score(&t, engine.now());
    assert_eq!(first, second);
    assert_eq!(engine.fraud().ledger(LedgerAxis::Customer).len_for("c1"), 0);
}

#[test]
fn zero_and_negative_amounts_are_accepted() {
    let (engine, _) = build_engine();
    for amount in [0.0, -25.0] {
        let a = engine.assess_transaction(&txn("c1", amount, 0)).unwrap();
        assert_eq!(a.recommendation, Recommendation::Allow);
    }
    assert_eq!(engine.fraud().ledger(LedgerAxis::Customer).len_for("c1"), 2);
}

#[test]
fn non_finite_amount_is_rejected_without_mutation() {
    let (engine, _) = build_engine();
    let err = engine
        .assess_transaction(&txn("c1", f64::NAN, 0).network_address("10.0.0.1"))
        .unwrap_err();
    assert!(err.is_validation(), "expected validation error, got {err}");
    assert_eq!(engine.fraud_summary().customers_monitored, 0);
    assert_eq!(engine.fraud_summary().ips_monitored, 0);
}

#[test]
fn raw_input_requires_amount_and_timestamp() {
    let (engine, _) = build_engine();

    let missing_ts = TransactionInput {
        customer_id: Some("c1".into()),
        amount: Some(10.0),
        ..Default::default()
    };
    match engine.assess_input(missing_ts) {
        Err(AnalyticsError::Validation { field, .. }) => assert_eq!(field, "timestamp"),
        other => panic!("expected timestamp validation error, got {other:?}"),
    }

    let missing_amount = TransactionInput {
        timestamp: Some("2024-06-01T09:00:00".into()),
        ..Default::default()
    };
    match engine.assess_input(missing_amount) {
        Err(AnalyticsError::Validation { field, .. }) => assert_eq!(field, "amount"),
        other => panic!("expected amount validation error, got {other:?}"),
    }

    let bad_ts = TransactionInput {
        amount: Some(10.0),
        timestamp: Some("yesterday".into()),
        ..Default::default()
    };
    assert!(matches!(
        engine.assess_input(bad_ts),
        Err(AnalyticsError::InvalidTimestamp { .. })
    ));
    assert_eq!(engine.fraud_summary().customers_monitored, 0);
}

#[test]
fn raw_input_accepts_space_separated_timestamp() {
    let input = TransactionInput {
        amount: Some(12.0),
        timestamp: Some("2024-06-01 09:00:00".into()),
        ..Default::default()
    };
    let t = input.into_transaction().unwrap();
    assert_eq!(t.timestamp, t0());

    let with_fraction = TransactionInput {
        amount: Some(12.0),
        timestamp: Some("2024-06-01 09:00:00.250".into()),
        ..Default::default()
    };
    let t = with_fraction.into_transaction().unwrap();
    assert_eq!(t.timestamp, t0() + Duration::milliseconds(250));
}

#[test]
fn raw_input_accepts_ip_address_alias_and_blank_ids() {
    let json = r#"{
        "customer_id": "c7",
        "amount": 75.5,
        "ip_address": "172.16.0.4",
        "device_id": "",
        "timestamp": "2024-06-01T09:30:00+02:00"
    }"#;
    let input: TransactionInput = serde_json::from_str(json).unwrap();
    let t = input.into_transaction().unwrap();
    assert_eq!(t.network_address.as_deref(), Some("172.16.0.4"));
    assert_eq!(t.device_id, None, "blank device id should be treated as absent");
    assert_eq!(t.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 7, 30, 0).unwrap());
}

#[test]
fn summary_counts_recent_and_total_suspicious() {
    let (engine, clock) = build_engine();
    engine.assess_transaction(&txn("c1", 1500.0, 0).network_address("10.0.0.1")).unwrap();
    engine.assess_transaction(&txn("c2", 20.0, 0).device("d2")).unwrap();

    let summary = engine.fraud_summary();
    assert_eq!(summary.total_suspicious, 1);
    assert_eq!(summary.recent_suspicious, 1);
    assert_eq!(summary.customers_monitored, 2);
    assert_eq!(summary.ips_monitored, 1);
    assert_eq!(summary.devices_monitored, 1);
    assert_eq!(summary.thresholds.max_failed_payments, 3);

    clock.advance(Duration::hours(2));
    let later = engine.fraud_summary();
    assert_eq!(later.total_suspicious, 1);
    assert_eq!(later.recent_suspicious, 0);
}

#[test]
fn suspicious_log_is_bounded() {
    let clock = Arc::new(ManualClock::new(t0()));
    let mut config = AnalyticsConfig::default();
    config.retention.suspicious_log_capacity = 3;
    let engine = AnalyticsEngine::new(config, clock);

    for i in 0..5 {
        engine.assess_transaction(&txn(&format!("c{i}"), 2000.0, 0)).unwrap();
    }
    let log = engine.fraud().suspicious_activity();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].customer_id.as_deref(), Some("c2"), "oldest entries are dropped first");
}

#[test]
fn custom_weights_change_classification() {
    let clock = Arc::new(ManualClock::new(t0()));
    let mut config = AnalyticsConfig::default();
    config.weights.suspicious_amount = 0.9;
    let engine = AnalyticsEngine::new(config, clock);

    let a = engine.assess_transaction(&Transaction::new(600.0, t0())).unwrap();
    assert_eq!(a.recommendation, Recommendation::Block);
    assert!(a.is_fraudulent);
}
