//! pulse-core: in-process real-time analytics for fraud scoring,
//! stock alerting and order tracking.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fraud_detection_subsystem;
pub mod ledger;
pub mod order_tracking_subsystem;
pub mod retention;
pub mod snapshot;
pub mod stock_monitor_subsystem;
pub mod types;
