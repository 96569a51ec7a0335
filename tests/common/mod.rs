//! Common test utilities

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use uuid::Uuid;

use dropship_settlement::domain::{Order, Plan, Subscription, Supplier, SupplierType};
use dropship_settlement::{MemoryStore, SettlementConfig, SettlementEngine};

/// In-memory store seeded with one external supplier on a 10% rate and a
/// paid-up subscription to a 7-day release plan.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<SettlementEngine<MemoryStore>>,
    pub account_id: Uuid,
    pub supplier_id: Uuid,
    pub plan: Plan,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let account_id = Uuid::new_v4();

        let mut supplier = Supplier::new(Uuid::new_v4(), account_id, SupplierType::External);
        supplier.commission_percent = Some(dec!(10));
        let supplier_id = supplier.id;
        store.insert_supplier(supplier).await;

        let plan = plan("Growth", 2, dec!(79.90), 7);
        store.insert_plan(plan.clone()).await;
        store
            .insert_subscription(Subscription::new(
                supplier_id,
                plan.id,
                Utc::now() + Duration::days(25),
            ))
            .await;

        let engine = Arc::new(SettlementEngine::new(
            store.clone(),
            SettlementConfig::default(),
        ));

        Self {
            store,
            engine,
            account_id,
            supplier_id,
            plan,
        }
    }

    pub async fn place_order(&self, total: Decimal) -> Uuid {
        self.place_order_with_fee(total, Decimal::ZERO).await
    }

    pub async fn place_order_with_fee(&self, total: Decimal, fee: Decimal) -> Uuid {
        let order = Order::placed(Uuid::new_v4(), self.account_id, self.supplier_id, total, fee);
        let order_id = order.id;
        self.store.insert_order(order).await;
        order_id
    }
}

pub fn plan(name: &str, priority: i32, price: Decimal, release_days: i64) -> Plan {
    Plan {
        id: Uuid::new_v4(),
        name: name.to_string(),
        price,
        commission_percent: dec!(12),
        release_days,
        cycle_days: 30,
        priority,
    }
}

/// Read a decimal serialized as a JSON string
pub fn decimal(value: &Value) -> Decimal {
    let raw = value
        .as_str()
        .unwrap_or_else(|| panic!("expected decimal string, got {value}"));
    Decimal::from_str(raw).unwrap()
}
