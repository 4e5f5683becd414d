//! Windowed ledger: per-key, time-ordered transaction history with
//! bounded retention.
//!
//! One ledger exists per axis (customer, network address, device).
//! Keys are sharded across DashMap's internal locks, so appends and
//! reads on different keys never contend, and pruning locks one shard
//! at a time.
//!
//! RULE: Retention is decided by timestamp age, never by position.
//! Callers may backfill out-of-order timestamps.

use crate::types::{EntityId, Timestamp};
use chrono::Duration;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// A scored transaction as retained by the ledgers. Immutable once
/// stored; shared between the axes it was appended to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub customer_id:     Option<EntityId>,
    pub amount:          f64,
    pub network_address: Option<String>,
    pub device_id:       Option<EntityId>,
    pub timestamp:       Timestamp,
    pub risk_score:      f64,
    pub risk_factors:    Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAxis {
    Customer,
    NetworkAddress,
    Device,
}

impl LedgerAxis {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Customer       => "customer",
            Self::NetworkAddress => "network_address",
            Self::Device         => "device",
        }
    }
}

pub struct WindowedLedger {
    axis:        LedgerAxis,
    entries:     DashMap<EntityId, VecDeque<Arc<TransactionRecord>>>,
    max_per_key: usize,
}

impl WindowedLedger {
    pub fn new(axis: LedgerAxis, max_per_key: usize) -> Self {
        Self {
            axis,
            entries: DashMap::new(),
            max_per_key: max_per_key.max(1),
        }
    }

    pub fn axis(&self) -> LedgerAxis {
        self.axis
    }

    /// Append a record under `key`, creating the key if absent.
    /// Drops the oldest record when the key is at capacity.
    pub fn append(&self, key: &str, record: Arc<TransactionRecord>) {
        let mut seq = self.entries.entry(key.to_string()).or_default();
        if seq.len() >= self.max_per_key {
            seq.pop_front();
            log::debug!(
                "{} ledger: key {key} at capacity {}, dropped oldest record",
                self.axis.name(),
                self.max_per_key
            );
        }
        seq.push_back(record);
    }

    /// Records for `key` whose age at `now` is strictly less than
    /// `window`, in append order. Unknown keys yield an empty vec.
    pub fn records_within(
        &self,
        key: &str,
        now: Timestamp,
        window: Duration,
    ) -> Vec<Arc<TransactionRecord>> {
        match self.entries.get(key) {
            Some(seq) => seq
                .iter()
                .filter(|r| now - r.timestamp < window)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// True if `key` holds at least one record younger than `window` at `now`.
    pub fn any_within(&self, key: &str, now: Timestamp, window: Duration) -> bool {
        self.entries
            .get(key)
            .map(|seq| seq.iter().any(|r| now - r.timestamp < window))
            .unwrap_or(false)
    }

    /// Number of retained records for `key` (0 if unknown).
    pub fn len_for(&self, key: &str) -> usize {
        self.entries.get(key).map(|seq| seq.len()).unwrap_or(0)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    pub fn record_count(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    /// Remove every record whose age at `now` is `horizon` or more,
    /// across all keys. Keys left empty are removed.
    /// Returns the number of records evicted.
    pub fn prune(&self, now: Timestamp, horizon: Duration) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, seq| {
            removed += retain_fresh(seq, now, horizon);
            !seq.is_empty()
        });
        if removed > 0 {
            log::debug!("{} ledger: pruned {removed} records", self.axis.name());
        }
        removed
    }

    /// Prune a single key. Used inline after each append.
    pub fn prune_key(&self, key: &str, now: Timestamp, horizon: Duration) -> usize {
        let removed = match self.entries.get_mut(key) {
            Some(mut seq) => retain_fresh(&mut seq, now, horizon),
            None => return 0,
        };
        // Re-checked under the shard lock: a concurrent append may have
        // refilled the key since the guard above was released.
        self.entries.remove_if(key, |_, seq| seq.is_empty());
        removed
    }

    pub(crate) fn export(&self) -> BTreeMap<EntityId, Vec<TransactionRecord>> {
        self.entries
            .iter()
            .map(|e| {
                let records = e.value().iter().map(|r| (**r).clone()).collect();
                (e.key().clone(), records)
            })
            .collect()
    }

    pub(crate) fn import(&self, data: BTreeMap<EntityId, Vec<TransactionRecord>>) {
        for (key, records) in data {
            for record in records {
                self.append(&key, Arc::new(record));
            }
        }
    }
}

fn retain_fresh(
    seq: &mut VecDeque<Arc<TransactionRecord>>,
    now: Timestamp,
    horizon: Duration,
) -> usize {
    let before = seq.len();
    seq.retain(|r| now - r.timestamp < horizon);
    before - seq.len()
}
