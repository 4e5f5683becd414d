//! Seeded synthetic traffic.
//!
//! RULE: the runner never calls a platform RNG. Every stream is derived
//! from the single `--seed`, so a run is reproducible event for event.
//!
//! Each event kind draws from its own stream, seeded from
//! (seed XOR stream index). Changing the mix of one kind never shifts
//! the values drawn for another.

use chrono::Duration;
use pulse_core::{
    event::{BusinessEvent, TransactionInput},
    types::Timestamp,
};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

const CUSTOMERS: u64 = 250;
const DEVICES: u64 = 180;
const PRODUCTS: u64 = 40;
const PRODUCT_NAMES: [&str; 8] = [
    "Kettle", "Desk Lamp", "Headphones", "Backpack", "Water Bottle", "Notebook", "Charger", "Mug",
];
const ORDER_FLOW: [&str; 4] = ["pending", "confirmed", "shipped", "delivered"];

/// A deterministic RNG for one event stream.
pub struct TrafficRng {
    inner: Pcg64Mcg,
}

impl TrafficRng {
    pub fn new(seed: u64, stream: Stream) -> Self {
        let derived = seed ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self { inner: Pcg64Mcg::seed_from_u64(derived) }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n). `n` must be non-zero.
    pub fn below(&mut self, n: u64) -> u64 {
        self.inner.next_u64() % n
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Heavy-tailed draw: most values near `x_min`, a few far above it.
    pub fn pareto(&mut self, x_min: f64, alpha: f64) -> f64 {
        let u = self.next_f64().max(1e-10);
        x_min * u.powf(-1.0 / alpha)
    }
}

/// Stable stream slots. Append only: reordering reseeds every stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    Schedule = 0,
    Transactions = 1,
    Inventory = 2,
    Orders = 3,
}

struct OpenOrder {
    order_id:    String,
    customer_id: String,
    amount:      f64,
    step:        usize,
}

/// Produces a timestamped stream of business events.
pub struct TrafficGenerator {
    schedule:     TrafficRng,
    transactions: TrafficRng,
    inventory:    TrafficRng,
    orders:       TrafficRng,
    open_orders:  Vec<OpenOrder>,
    next_order:   u64,
    at:           Timestamp,
}

impl TrafficGenerator {
    pub fn new(seed: u64, start: Timestamp) -> Self {
        Self {
            schedule:     TrafficRng::new(seed, Stream::Schedule),
            transactions: TrafficRng::new(seed, Stream::Transactions),
            inventory:    TrafficRng::new(seed, Stream::Inventory),
            orders:       TrafficRng::new(seed, Stream::Orders),
            open_orders:  Vec::new(),
            next_order:   1,
            at:           start,
        }
    }

    /// Next event and the instant it happens. Times never go backwards.
    pub fn next_event(&mut self) -> (Timestamp, BusinessEvent) {
        let gap_ms = (self.schedule.pareto(200.0, 1.2).min(600_000.0)) as i64;
        self.at += Duration::milliseconds(gap_ms);

        let roll = self.schedule.next_f64();
        let event = if roll < 0.70 {
            self.transaction()
        } else if roll < 0.85 {
            self.inventory_level()
        } else {
            self.order_status()
        };
        (self.at, event)
    }

    fn transaction(&mut self) -> BusinessEvent {
        let rng = &mut self.transactions;
        // A small hot set of customers generates bursts worth flagging.
        let customer = if rng.chance(0.1) { rng.below(5) } else { rng.below(CUSTOMERS) };
        let customer_id = (!rng.chance(0.05)).then(|| format!("c-{customer:04}"));
        let amount = (rng.pareto(15.0, 1.3).min(5_000.0) * 100.0).round() / 100.0;
        let network_address = rng
            .chance(0.8)
            .then(|| format!("10.{}.{}.{}", rng.below(4), rng.below(8), rng.below(16)));
        let device_id = rng.chance(0.6).then(|| format!("d-{:04}", rng.below(DEVICES)));

        BusinessEvent::Transaction(TransactionInput {
            customer_id,
            amount: Some(amount),
            network_address,
            device_id,
            timestamp: Some(self.at.to_rfc3339()),
        })
    }

    fn inventory_level(&mut self) -> BusinessEvent {
        let rng = &mut self.inventory;
        let product = rng.below(PRODUCTS);
        let name = PRODUCT_NAMES[(product % PRODUCT_NAMES.len() as u64) as usize];
        let threshold = rng.chance(0.2).then(|| 5 + rng.below(20) as i64);
        BusinessEvent::InventoryLevel {
            product_id:    format!("p-{product:03}"),
            product_name:  name.to_string(),
            current_stock: rng.below(60) as i64,
            threshold,
        }
    }

    fn order_status(&mut self) -> BusinessEvent {
        let rng = &mut self.orders;
        if self.open_orders.is_empty() || rng.chance(0.35) {
            let order = OpenOrder {
                order_id:    format!("o-{:06}", self.next_order),
                customer_id: format!("c-{:04}", rng.below(CUSTOMERS)),
                amount:      (rng.pareto(20.0, 1.5).min(3_000.0) * 100.0).round() / 100.0,
                step:        0,
            };
            self.next_order += 1;
            let event = order_event(&order, ORDER_FLOW[0]);
            self.open_orders.push(order);
            return event;
        }

        let idx = rng.below(self.open_orders.len() as u64) as usize;
        let cancel = rng.chance(0.05);
        let order = &mut self.open_orders[idx];
        order.step += 1;
        let status = if cancel { "cancelled" } else { ORDER_FLOW[order.step.min(ORDER_FLOW.len() - 1)] };
        let event = order_event(order, status);
        if cancel || order.step + 1 >= ORDER_FLOW.len() {
            self.open_orders.swap_remove(idx);
        }
        event
    }
}

fn order_event(order: &OpenOrder, status: &str) -> BusinessEvent {
    BusinessEvent::OrderStatus {
        order_id:     order.order_id.clone(),
        new_status:   status.to_string(),
        customer_id:  order.customer_id.clone(),
        total_amount: order.amount,
    }
}
