//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::cart::CartLineItem;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: String,
    order_number: String,
    email: String,
    status: OrderStatus,
    items: Vec<LineItem>,
    subtotal: Money,
    shipping: Money,
    discount: Money,
    total: Money,
    coupon: Option<OrderCoupon>,
    shipping_address: Option<Address>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem { pub product_id: String, pub name: String, pub quantity: u32, pub unit_price: Money, pub total: Money }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCoupon { pub coupon_id: Uuid, pub code: CouponCode }

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address { pub name: String, pub street1: String, pub street2: Option<String>, pub city: String, pub state: Option<String>, pub pincode: String, pub country: String, pub phone: Option<String> }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed }

impl LineItem {
    pub fn from_cart_line(line: &CartLineItem, currency: &str) -> Self {
        let unit_price = Money::new(line.unit_price, currency);
        Self { product_id: line.product_id.clone(), name: line.name.clone(), quantity: line.quantity.value(), total: unit_price.multiply(line.quantity.value()), unit_price }
    }
}

impl Order {
    pub fn create(email: impl Into<String>, currency: &str) -> Self {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let email = email.into();
        let mut order = Self {
            order_number: format!("ORD-{}", &id[id.len() - 8..].to_uppercase()),
            id: id.clone(), email: email.clone(), status: OrderStatus::Pending,
            items: vec![], subtotal: Money::zero(currency), shipping: Money::zero(currency),
            discount: Money::zero(currency), total: Money::zero(currency), coupon: None,
            shipping_address: None, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(OrderEvent::Created { order_id: id, email });
        order
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn email(&self) -> &str { &self.email }
    pub fn status(&self) -> &OrderStatus { &self.status }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn shipping(&self) -> &Money { &self.shipping }
    pub fn discount(&self) -> &Money { &self.discount }
    pub fn total(&self) -> &Money { &self.total }
    pub fn coupon(&self) -> Option<&OrderCoupon> { self.coupon.as_ref() }
    pub fn items(&self) -> &[LineItem] { &self.items }

    pub fn add_item(&mut self, item: LineItem) { self.items.push(item); self.recalculate(); }

    pub fn set_shipping(&mut self, amount: Decimal, address: Option<Address>) {
        self.shipping = Money::new(amount.max(Decimal::ZERO), self.subtotal.currency());
        self.shipping_address = address;
        self.recalculate();
    }

    pub fn apply_discount(&mut self, coupon: OrderCoupon, amount: Decimal) {
        self.discount = Money::new(amount.max(Decimal::ZERO), self.subtotal.currency());
        self.coupon = Some(coupon);
        self.recalculate();
    }

    pub fn confirm(&mut self) -> Result<(), OrderError> {
        if self.items.is_empty() { return Err(OrderError::NoItems); }
        if self.status != OrderStatus::Pending { return Err(OrderError::NotPending); }
        self.status = OrderStatus::Confirmed;
        self.touch();
        self.raise_event(OrderEvent::Confirmed { order_id: self.id.clone(), total: self.total.amount() });
        Ok(())
    }

    fn recalculate(&mut self) {
        self.subtotal = self.items.iter().fold(Money::zero(self.subtotal.currency()), |acc, i| acc.add(&i.total).unwrap_or(acc));
        let gross = self.subtotal.add(&self.shipping).unwrap_or_else(|_| self.subtotal.clone());
        self.total = gross.saturating_sub(&self.discount).unwrap_or(gross);
        self.touch();
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Order is not pending")]
    NotPending,
}
