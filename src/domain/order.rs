//! Order aggregate (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ControlPlaneError, Result};

/// Monetary amount in the order's currency, stored as integer cents to avoid
/// floating point drift; `Serialize`/`Deserialize` present it as a decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Money(i64);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_dollars(dollars: f64) -> Self {
        Self((dollars * 100.0).round() as i64)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl std::ops::Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money(0), |a, b| a + b)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_f64(self.as_dollars())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let dollars = f64::deserialize(deserializer)?;
        Ok(Money::from_dollars(dollars))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

impl LineItem {
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            quantity,
            unit_price,
            total: Money::from_cents(unit_price.cents() * quantity as i64),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLocation {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    ReadyForPickup,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

impl OrderStatus {
    /// Validates a transition per the order status graph (spec §4.4).
    ///
    /// `Pending -> Confirmed -> Preparing -> ReadyForPickup -> PickedUp ->
    /// InTransit -> Delivered`; any non-terminal state may move to `Cancelled`;
    /// any step failure may move to `Failed`. `Cancel` is rejected from
    /// `Delivered` or `Cancelled`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if next == Failed {
            return !matches!(self, Delivered | Cancelled | Failed);
        }
        if next == Cancelled {
            return !matches!(self, Delivered | Cancelled);
        }
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Preparing)
                | (Preparing, ReadyForPickup)
                | (ReadyForPickup, PickedUp)
                | (PickedUp, InTransit)
                | (InTransit, Delivered)
                // Compensation path: a confirmed order can be reverted to Pending.
                | (Confirmed, Pending)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OrderPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for OrderPriority {
    fn default() -> Self {
        OrderPriority::Normal
    }
}

/// Order aggregate root (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub restaurant_id: String,
    pub items: Vec<LineItem>,
    pub delivery_location: DeliveryLocation,
    pub subtotal: Money,
    pub tax: Money,
    pub delivery_fee: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub priority: OrderPriority,
    #[serde(default)]
    pub tracking_code: Option<String>,
    #[serde(default)]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_driver_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fixed delivery fee and tax rate used when constructing a new order.
/// A real deployment would source these from a pricing service; this control
/// plane only owns orchestration, not pricing, so the constants mirror the
/// figures used throughout spec §8's worked scenarios.
pub const DELIVERY_FEE_CENTS: i64 = 599;
pub const TAX_RATE: f64 = 0.10;

impl Order {
    /// Construct a new order in `Pending` status, computing totals from line items.
    pub fn new(
        customer_id: impl Into<String>,
        restaurant_id: impl Into<String>,
        items: Vec<LineItem>,
        delivery_location: DeliveryLocation,
        priority: OrderPriority,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(ControlPlaneError::Validation(
                "order must contain at least one line item".to_string(),
            ));
        }

        let subtotal: Money = items.iter().map(|i| i.total).sum();
        let tax = Money::from_cents((subtotal.cents() as f64 * TAX_RATE).round() as i64);
        let delivery_fee = Money::from_cents(DELIVERY_FEE_CENTS);
        let total = subtotal + tax + delivery_fee;
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            customer_id: customer_id.into(),
            restaurant_id: restaurant_id.into(),
            items,
            delivery_location,
            subtotal,
            tax,
            delivery_fee,
            total,
            status: OrderStatus::Pending,
            priority,
            tracking_code: None,
            estimated_delivery_time: None,
            assigned_driver_id: None,
            failure_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Checks `total == subtotal + tax + deliveryFee` within one cent of rounding (spec §8).
    pub fn totals_are_consistent(&self) -> bool {
        (self.total.cents() - (self.subtotal + self.tax + self.delivery_fee).cents()).abs() <= 1
    }

    /// Apply a status transition, bumping the optimistic-concurrency version.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ControlPlaneError::Conflict(format!(
                "cannot transition order {} from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Cancel the order; rejected from `Delivered`/`Cancelled` (spec §8 idempotence test).
    pub fn cancel(&mut self) -> Result<()> {
        if matches!(self.status, OrderStatus::Delivered | OrderStatus::Cancelled) {
            return Err(ControlPlaneError::Conflict(format!(
                "order {} cannot be cancelled from status {:?}",
                self.id, self.status
            )));
        }
        self.status = OrderStatus::Cancelled;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply a gateway `PUT /orders/{id}` edit: delivery location and/or
    /// priority. Neither field participates in the status graph, so this
    /// bypasses `transition_to` but still bumps the optimistic-concurrency
    /// version like any other write.
    pub fn apply_update(&mut self, delivery_location: Option<DeliveryLocation>, priority: Option<OrderPriority>) {
        if let Some(location) = delivery_location {
            self.delivery_location = location;
        }
        if let Some(priority) = priority {
            self.priority = priority;
        }
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new(
            "C1",
            "R1",
            vec![LineItem::new("I1", "Burger", 2, Money::from_cents(1500))],
            DeliveryLocation {
                lat: 40.7128,
                lng: -74.0060,
                address: "1 Main St".to_string(),
                city: None,
                postal_code: None,
            },
            OrderPriority::Normal,
        )
        .unwrap()
    }

    #[test]
    fn totals_match_spec_scenario_1() {
        let order = sample_order();
        assert_eq!(order.subtotal.cents(), 3000);
        assert_eq!(order.tax.cents(), 300);
        assert_eq!(order.delivery_fee.cents(), 599);
        assert_eq!(order.total.cents(), 3899);
        assert!(order.totals_are_consistent());
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn empty_items_rejected() {
        let result = Order::new(
            "C1",
            "R1",
            vec![],
            DeliveryLocation {
                lat: 0.0,
                lng: 0.0,
                address: "x".to_string(),
                city: None,
                postal_code: None,
            },
            OrderPriority::Normal,
        );
        assert!(matches!(result, Err(ControlPlaneError::Validation(_))));
    }

    #[test]
    fn cancel_twice_is_conflict() {
        let mut order = sample_order();
        order.cancel().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        let err = order.cancel().unwrap_err();
        assert!(matches!(err, ControlPlaneError::Conflict(_)));
    }

    #[test]
    fn cancel_rejected_from_delivered() {
        let mut order = sample_order();
        order.transition_to(OrderStatus::Confirmed).unwrap();
        order.transition_to(OrderStatus::Preparing).unwrap();
        order.transition_to(OrderStatus::ReadyForPickup).unwrap();
        order.transition_to(OrderStatus::PickedUp).unwrap();
        order.transition_to(OrderStatus::InTransit).unwrap();
        order.transition_to(OrderStatus::Delivered).unwrap();
        assert!(order.cancel().is_err());
    }

    #[test]
    fn version_strictly_increases() {
        let mut order = sample_order();
        let v0 = order.version;
        order.transition_to(OrderStatus::Confirmed).unwrap();
        assert_eq!(order.version, v0 + 1);
    }
}
